//! actix-web adapter for [`PaymentGate`].

use std::future::Future;

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{HttpRequest, HttpResponse};
use x402::{
    Facilitator, PaymentRequirements, EXPOSE_HEADERS_HEADER, PAYMENT_HEADER,
    PAYMENT_RESPONSE_HEADER,
};

use crate::config::PaymentConfig;
use crate::gate::{GateOutcome, PaymentGate, Proceeded};
use crate::metrics::REQUESTS;

/// Check if a request is for a payment-gated route and extract the requirements.
pub fn check_payment_gate<'a>(
    req: &HttpRequest,
    config: &'a PaymentConfig,
) -> Option<&'a PaymentRequirements> {
    config
        .get_route(req.method().as_str(), req.path())
        .map(|r| &r.requirements)
}

/// Serve `handler` behind payment.
///
/// The handler's `HttpResponse` is held until settlement finishes, so a
/// failed settlement always turns into a 402 and the client never sees the
/// resource unpaid. Routes without a price are passed straight through.
pub async fn require_payment<F, H, Fut>(
    req: &HttpRequest,
    config: &PaymentConfig,
    gate: &PaymentGate<F>,
    handler: H,
) -> HttpResponse
where
    F: Facilitator,
    H: FnOnce() -> Fut,
    Fut: Future<Output = HttpResponse>,
{
    let Some(requirements) = check_payment_gate(req, config) else {
        return handler().await;
    };

    // A header with non-ASCII bytes is still a payment attempt; an empty
    // value makes the gate report it as malformed.
    let payment_header = req
        .headers()
        .get(PAYMENT_HEADER)
        .map(|v| v.to_str().unwrap_or_default());

    let outcome = gate
        .process(payment_header, std::slice::from_ref(requirements), move || async move {
            Proceeded::buffered(handler().await)
        })
        .await;

    // Use the matched route pattern (not raw path) to prevent cardinality bombs
    let endpoint_label = req.match_pattern().unwrap_or_else(|| "unknown".to_string());

    let response = match outcome {
        GateOutcome::PaymentRequired(body) | GateOutcome::SettlementFailed(body) => {
            HttpResponse::PaymentRequired().json(body)
        }
        GateOutcome::Paid {
            mut response,
            payment_response,
            ..
        } => {
            match HeaderValue::from_str(&payment_response) {
                Ok(value) => {
                    let headers = response.headers_mut();
                    headers.insert(HeaderName::from_static("x-payment-response"), value);
                    headers.insert(
                        HeaderName::from_static("access-control-expose-headers"),
                        HeaderValue::from_static(PAYMENT_RESPONSE_HEADER),
                    );
                }
                Err(e) => tracing::error!(error = %e, "settlement receipt is not a valid header"),
            }
            response
        }
        GateOutcome::Unsettled { response, .. } => response,
    };

    REQUESTS
        .with_label_values(&[endpoint_label.as_str(), response.status().as_str()])
        .inc();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use alloy::primitives::Address;
    use url::Url;
    use x402::ExactEvmSchemeServer;

    use crate::config::PaymentConfigBuilder;

    #[test]
    fn test_check_payment_gate_matches_method_and_path() {
        let config = PaymentConfigBuilder::new(
            ExactEvmSchemeServer::default(),
            Address::ZERO,
            "base-sepolia",
            Url::parse("http://localhost:4021").unwrap(),
        )
        .route("GET", "/weather", "$0.001", None)
        .build()
        .unwrap();

        let get = TestRequest::get().uri("/weather").to_http_request();
        assert!(check_payment_gate(&get, &config).is_some());

        let post = TestRequest::post().uri("/weather").to_http_request();
        assert!(check_payment_gate(&post, &config).is_none());

        let other = TestRequest::get().uri("/health").to_http_request();
        assert!(check_payment_gate(&other, &config).is_none());
    }

    #[test]
    fn test_header_constants_are_lowercase_forms() {
        assert_eq!(PAYMENT_RESPONSE_HEADER.to_ascii_lowercase(), "x-payment-response");
        assert_eq!(
            EXPOSE_HEADERS_HEADER.to_ascii_lowercase(),
            "access-control-expose-headers"
        );
    }
}
