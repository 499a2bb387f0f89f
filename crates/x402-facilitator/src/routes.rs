use actix_web::{web, HttpRequest, HttpResponse};
use x402::auth::{constant_time_eq, verify_hmac, FACILITATOR_AUTH_HEADER};
use x402::{
    ChainClient, ErrorReason, Facilitator, FacilitatorRequest, SettleResponse, X402_VERSION,
};

use crate::metrics;
use crate::state::AppState;

/// Mount every facilitator endpoint for a chain client type.
pub fn configure<C: ChainClient + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::<C>))
        .route("/metrics", web::get().to(metrics_endpoint::<C>))
        .route("/supported", web::get().to(supported::<C>))
        .service(
            web::resource("/verify")
                .route(web::get().to(verify_docs))
                .route(web::post().to(verify::<C>)),
        )
        .service(
            web::resource("/settle")
                .route(web::get().to(settle_docs))
                .route(web::post().to(settle::<C>)),
        );
}

/// Validate the HMAC header on an incoming request.
/// Returns an error response if the signature is missing or invalid.
fn validate_hmac<C>(
    req: &HttpRequest,
    body_bytes: &[u8],
    state: &AppState<C>,
) -> Result<(), HttpResponse> {
    let header_value = req
        .headers()
        .get(FACILITATOR_AUTH_HEADER)
        .and_then(|v| v.to_str().ok());

    match header_value {
        Some(sig) if verify_hmac(&state.hmac_secret, body_bytes, sig) => Ok(()),
        Some(_) => {
            tracing::warn!("HMAC verification failed: signature mismatch");
            metrics::HMAC_FAILURES.with_label_values(&["invalid"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication failed"
            })))
        }
        None => {
            tracing::warn!("HMAC header missing on authenticated endpoint");
            metrics::HMAC_FAILURES.with_label_values(&["missing"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication required"
            })))
        }
    }
}

/// Authenticate and parse a `/verify` or `/settle` body.
fn authenticated_request<C>(
    req: &HttpRequest,
    body: &[u8],
    state: &AppState<C>,
) -> Result<FacilitatorRequest, HttpResponse> {
    validate_hmac(req, body, state)?;
    serde_json::from_slice(body).map_err(|e| {
        tracing::info!(error = %e, "rejecting malformed facilitator request");
        HttpResponse::BadRequest().json(serde_json::json!({ "error": "invalid request" }))
    })
}

pub async fn health<C: ChainClient + 'static>(state: web::Data<AppState<C>>) -> HttpResponse {
    let heads = state.engine.chain_heads().await;
    let healthy = heads.iter().all(|(_, head)| head.is_ok());
    let networks: serde_json::Map<String, serde_json::Value> = heads
        .into_iter()
        .map(|(network, head)| {
            let value = match head {
                Ok(block) => serde_json::json!({ "latestBlock": block.to_string() }),
                Err(_) => serde_json::json!({ "error": "chain unavailable" }),
            };
            (network, value)
        })
        .collect();

    if healthy {
        HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "x402-facilitator",
            "networks": networks,
        }))
    } else {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "degraded",
            "service": "x402-facilitator",
            "networks": networks,
        }))
    }
}

pub async fn metrics_endpoint<C: 'static>(
    req: HttpRequest,
    state: web::Data<AppState<C>>,
) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            let public_metrics = std::env::var("X402_PUBLIC_METRICS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false);
            if !public_metrics {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or X402_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

pub async fn supported<C: ChainClient + 'static>(state: web::Data<AppState<C>>) -> HttpResponse {
    HttpResponse::Ok().json(state.engine.supported_response())
}

pub async fn verify_docs() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "endpoint": "/verify",
        "description": "POST to verify x402 payments",
        "body": {
            "x402Version": X402_VERSION,
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        },
        "auth": FACILITATOR_AUTH_HEADER,
    }))
}

pub async fn settle_docs() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "endpoint": "/settle",
        "description": "POST to settle x402 payments",
        "body": {
            "x402Version": X402_VERSION,
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        },
        "auth": FACILITATOR_AUTH_HEADER,
    }))
}

pub async fn verify<C: ChainClient + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<C>>,
    body: web::Bytes,
) -> HttpResponse {
    let parsed = match authenticated_request(&req, &body, &state) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match state
        .engine
        .verify(&parsed.payment_payload, &parsed.payment_requirements)
        .await
    {
        Ok(result) => {
            let label = if result.is_valid { "valid" } else { "invalid" };
            metrics::VERIFY_REQUESTS.with_label_values(&[label]).inc();
            tracing::info!(
                payer = ?result.payer_address,
                valid = result.is_valid,
                reason = result.invalid_reason.map(|r| r.as_str()).unwrap_or("none"),
                "verification completed"
            );
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            metrics::VERIFY_REQUESTS.with_label_values(&["error"]).inc();
            tracing::error!(error = %e, "verification internal error");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "verification failed"
            }))
        }
    }
}

pub async fn settle<C: ChainClient + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<C>>,
    body: web::Bytes,
) -> HttpResponse {
    let parsed = match authenticated_request(&req, &body, &state) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let start = std::time::Instant::now();

    match state
        .engine
        .settle(&parsed.payment_payload, &parsed.payment_requirements)
        .await
    {
        Ok(result) => {
            let elapsed = start.elapsed().as_secs_f64();
            if result.success {
                metrics::observe_settle("success", elapsed);
                tracing::info!(
                    payer = ?result.payer,
                    tx = %result.transaction,
                    network = %result.network,
                    "settlement completed"
                );
            } else {
                metrics::observe_settle("rejected", elapsed);
                tracing::warn!(
                    payer = ?result.payer,
                    tx = %result.transaction,
                    reason = result.error_reason.map(|r| r.as_str()).unwrap_or("unknown"),
                    "settlement rejected"
                );
            }
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            metrics::observe_settle("error", start.elapsed().as_secs_f64());
            tracing::error!(error = %e, "settlement internal error");
            HttpResponse::InternalServerError().json(SettleResponse::failed(
                ErrorReason::UnexpectedSettleError,
                String::new(),
                parsed.payment_requirements.network.clone(),
                Some(parsed.payment_payload.authorization().from),
            ))
        }
    }
}
