use actix_web::{web, HttpRequest, HttpResponse};
use x402::auth::constant_time_eq;
use x402::{Facilitator, FacilitatorClient};

use x402_server::{require_payment, PaymentConfig, PaymentGate};

pub struct ServerState {
    pub gate: PaymentGate<FacilitatorClient>,
    pub config: PaymentConfig,
    pub network: String,
}

/// Cached metrics token, read once at first access.
static METRICS_TOKEN: std::sync::LazyLock<Option<String>> = std::sync::LazyLock::new(|| {
    std::env::var("METRICS_TOKEN")
        .ok()
        .filter(|s| !s.is_empty())
});

/// Cached public metrics opt-in flag, read once at first access.
static PUBLIC_METRICS: std::sync::LazyLock<bool> = std::sync::LazyLock::new(|| {
    std::env::var("X402_PUBLIC_METRICS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
});

pub async fn metrics_endpoint(req: HttpRequest) -> HttpResponse {
    match &*METRICS_TOKEN {
        Some(expected) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            if !*PUBLIC_METRICS {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or X402_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(x402_server::metrics::metrics_output())
}

/// Healthy when the facilitator answers and settles on our network.
pub async fn health(state: web::Data<ServerState>) -> HttpResponse {
    match state.gate.facilitator().supported().await {
        Ok(supported) if supported.supports(x402::SCHEME_EXACT, &state.network) => {
            HttpResponse::Ok().json(serde_json::json!({
                "status": "ok",
                "service": "x402-server",
                "network": state.network,
            }))
        }
        Ok(_) => {
            tracing::error!(network = %state.network, "facilitator does not support our network");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "x402-server",
                "error": "facilitator does not support network",
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "health check: facilitator unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "x402-server",
                "error": "facilitator unreachable",
            }))
        }
    }
}

pub async fn weather(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    require_payment(&req, &state.config, &state.gate, || async {
        HttpResponse::Ok().json(serde_json::json!({
            "report": {
                "weather": "sunny",
                "temperature": 70,
            }
        }))
    })
    .await
}
