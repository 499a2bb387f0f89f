//! HTTP client for a facilitator running as a separate service.
//!
//! Implements [`Facilitator`] so a resource server can use it exactly like
//! the in-process [`FacilitatorEngine`](crate::facilitator::FacilitatorEngine).

use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::{compute_hmac, FACILITATOR_AUTH_HEADER};
use crate::constants::X402_VERSION;
use crate::{
    Facilitator, FacilitatorRequest, PaymentPayload, PaymentRequirements, SettleResponse,
    SupportedResponse, VerifyResponse, X402Error,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote facilitator reached over `POST /verify`, `POST /settle` and
/// `GET /supported`.
#[derive(Debug, Clone)]
pub struct FacilitatorClient {
    http: reqwest::Client,
    base_url: Url,
    hmac_secret: Option<Vec<u8>>,
}

impl FacilitatorClient {
    pub fn new(base_url: Url) -> Result<Self, X402Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| X402Error::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(base_url, http))
    }

    pub fn with_http_client(base_url: Url, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url,
            hmac_secret: None,
        }
    }

    /// Sign request bodies with the facilitator's shared secret.
    pub fn with_hmac_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.hmac_secret = Some(secret.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, X402Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| X402Error::ConfigError(format!("invalid facilitator URL: {e}")))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<T, X402Error> {
        let body = FacilitatorRequest {
            x402_version: X402_VERSION,
            payment_payload: payload.clone(),
            payment_requirements: requirements.clone(),
        };
        let body_bytes = serde_json::to_vec(&body)?;

        let mut request = self
            .http
            .post(self.endpoint(path)?)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.hmac_secret {
            request = request.header(FACILITATOR_AUTH_HEADER, compute_hmac(secret, &body_bytes)?);
        }

        let resp = request
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator request failed: {e}")))?;
        Self::parse(path, resp).await
    }

    async fn parse<T: DeserializeOwned>(path: &str, resp: reqwest::Response) -> Result<T, X402Error> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(X402Error::HttpError(
                "facilitator authentication failed".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(X402Error::HttpError(format!(
                "facilitator /{path} returned {status}"
            )));
        }
        resp.json::<T>().await.map_err(|e| {
            X402Error::HttpError(format!("facilitator /{path} response parse failed: {e}"))
        })
    }
}

impl Facilitator for FacilitatorClient {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        self.post("verify", payload, requirements).await
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        self.post("settle", payload, requirements).await
    }

    async fn supported(&self) -> Result<SupportedResponse, X402Error> {
        let resp = self
            .http
            .get(self.endpoint("supported")?)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator request failed: {e}")))?;
        Self::parse("supported", resp).await
    }
}
