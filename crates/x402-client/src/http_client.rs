use std::time::Duration;

use alloy::primitives::U256;
use x402::{
    decode_settle_response, encode_payment, PaymentRequiredBody, PaymentRequirements,
    SchemeClient, SettleResponse, X402Error, DEFAULT_MAX_PAYMENT, EXPOSE_HEADERS_HEADER,
    PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER,
};

/// HTTP client that automatically pays 402 responses.
///
/// Wraps `reqwest::Client`. On a 402 it selects one of the offered payment
/// requirements, refuses anything above the configured ceiling, signs an
/// authorization through the [`SchemeClient`] and resends the request once
/// with an `X-PAYMENT` header. A second 402 is returned to the caller as is.
pub struct X402Client<S: SchemeClient> {
    http: reqwest::Client,
    scheme: S,
    max_value: U256,
    preference: Option<(String, String)>,
}

impl<S: SchemeClient> X402Client<S> {
    pub fn new(scheme: S) -> Result<Self, X402Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| X402Error::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(scheme, http))
    }

    /// Create a client with a custom reqwest::Client.
    pub fn with_http_client(scheme: S, http: reqwest::Client) -> Self {
        Self {
            http,
            scheme,
            max_value: U256::from(DEFAULT_MAX_PAYMENT),
            preference: None,
        }
    }

    /// Largest `maxAmountRequired`, in atomic units, this client will pay.
    pub fn with_max_value(mut self, max_value: U256) -> Self {
        self.max_value = max_value;
        self
    }

    /// Prefer this `(scheme, network)` when a server offers several.
    pub fn with_preference(mut self, scheme: impl Into<String>, network: impl Into<String>) -> Self {
        self.preference = Some((scheme.into(), network.into()));
        self
    }

    /// Make a request, automatically handling 402 payment responses.
    /// Returns the final response and the decoded settlement, if any.
    pub async fn fetch(
        &self,
        url: &str,
        method: reqwest::Method,
    ) -> Result<(reqwest::Response, Option<SettleResponse>), X402Error> {
        self.fetch_with_body(url, method, None).await
    }

    /// Make a request with an optional body, automatically handling 402 payment responses.
    pub async fn fetch_with_body(
        &self,
        url: &str,
        method: reqwest::Method,
        body: Option<Vec<u8>>,
    ) -> Result<(reqwest::Response, Option<SettleResponse>), X402Error> {
        // Present only on the retry; its presence is what stops a second payment.
        let mut payment_header: Option<String> = None;

        loop {
            let mut req = self.http.request(method.clone(), url);
            if let Some(b) = &body {
                req = req.body(b.clone());
            }
            if let Some(header) = &payment_header {
                req = req
                    .header(PAYMENT_HEADER, header)
                    .header(EXPOSE_HEADERS_HEADER, PAYMENT_RESPONSE_HEADER);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| X402Error::HttpError(format!("request failed: {e}")))?;

            let retried = payment_header.is_some();
            if resp.status() != reqwest::StatusCode::PAYMENT_REQUIRED || retried {
                if retried && resp.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
                    tracing::warn!(url, "payment rejected on retry");
                }
                let settlement = if retried { settlement_of(&resp) } else { None };
                return Ok((resp, settlement));
            }

            let body_402: PaymentRequiredBody = resp
                .json()
                .await
                .map_err(|e| X402Error::MalformedPayload(format!("failed to parse 402 body: {e}")))?;

            let requirements = self.select(&body_402.accepts)?;
            self.check_ceiling(requirements)?;

            tracing::info!(
                url,
                network = %requirements.network,
                amount = %requirements.max_amount_required,
                pay_to = %requirements.pay_to,
                "paying for resource"
            );
            let payload = self.scheme.create_payment_payload(requirements).await?;
            payment_header = Some(encode_payment(&payload)?);
        }
    }

    /// Preferred `(scheme, network)` if offered, else the first entry this
    /// client can pay.
    fn select<'a>(
        &self,
        accepts: &'a [PaymentRequirements],
    ) -> Result<&'a PaymentRequirements, X402Error> {
        let preferred = self.preference.as_ref().and_then(|(scheme, network)| {
            accepts.iter().find(|r| {
                &r.scheme == scheme && &r.network == network && self.scheme.supports(r)
            })
        });

        preferred
            .or_else(|| accepts.iter().find(|r| self.scheme.supports(r)))
            .ok_or_else(|| {
                X402Error::UnsupportedScheme(format!(
                    "no supported payment option in {:?}",
                    accepts
                        .iter()
                        .map(|r| format!("{}/{}", r.scheme, r.network))
                        .collect::<Vec<_>>()
                ))
            })
    }

    fn check_ceiling(&self, requirements: &PaymentRequirements) -> Result<(), X402Error> {
        if requirements.max_amount_required > self.max_value {
            return Err(X402Error::InvalidPayment(format!(
                "payment of {} exceeds maximum allowed {}",
                requirements.max_amount_required, self.max_value
            )));
        }
        Ok(())
    }
}

/// Decode the `X-PAYMENT-RESPONSE` header, if present and well-formed.
fn settlement_of(resp: &reqwest::Response) -> Option<SettleResponse> {
    let raw = resp.headers().get(PAYMENT_RESPONSE_HEADER)?.to_str().ok()?;
    match decode_settle_response(raw) {
        Ok(settlement) => Some(settlement),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed payment response header");
            None
        }
    }
}
