//! In-process facilitator: dispatches verify/settle on `(scheme, network)`.

use std::collections::HashMap;
use std::future::Future;

use crate::chain::ChainClient;
use crate::constants::{SCHEME_EXACT, X402_VERSION};
use crate::scheme_facilitator::ExactEvmFacilitator;
use crate::{
    ErrorReason, Facilitator, PaymentPayload, PaymentRequirements, SchemeFacilitator,
    SettleResponse, SupportedKind, SupportedResponse, VerifyResponse, X402Error,
};

/// Payment schemes the engine knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Exact,
}

impl Scheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            SCHEME_EXACT => Some(Scheme::Exact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Exact => SCHEME_EXACT,
        }
    }
}

/// A registered implementation for one `(scheme, network)` pair.
pub enum SchemeHandler<C> {
    Exact(ExactEvmFacilitator<C>),
}

impl<C: ChainClient> SchemeHandler<C> {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        match self {
            SchemeHandler::Exact(f) => f.verify(payload, requirements).await,
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        match self {
            SchemeHandler::Exact(f) => f.settle(payload, requirements).await,
        }
    }
}

/// Explicit registry `(scheme, network) -> handler`.
///
/// Unregistered combinations are reported as `invalid_scheme`, never as
/// an error.
pub struct FacilitatorEngine<C> {
    handlers: HashMap<(Scheme, String), SchemeHandler<C>>,
}

impl<C> Default for FacilitatorEngine<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C> FacilitatorEngine<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the `exact` scheme for the facilitator's network.
    pub fn with_exact(mut self, facilitator: ExactEvmFacilitator<C>) -> Self {
        let key = (Scheme::Exact, facilitator.network().to_string());
        self.handlers.insert(key, SchemeHandler::Exact(facilitator));
        self
    }

    pub fn handler(&self, scheme: &str, network: &str) -> Option<&SchemeHandler<C>> {
        let scheme = Scheme::parse(scheme)?;
        self.handlers.get(&(scheme, network.to_string()))
    }

    /// The registered combinations, sorted for stable output.
    pub fn kinds(&self) -> Vec<SupportedKind> {
        let mut kinds: Vec<SupportedKind> = self
            .handlers
            .keys()
            .map(|(scheme, network)| SupportedKind {
                scheme: scheme.as_str().to_string(),
                network: network.clone(),
            })
            .collect();
        kinds.sort_by(|a, b| (&a.scheme, &a.network).cmp(&(&b.scheme, &b.network)));
        kinds
    }

    pub fn supported_response(&self) -> SupportedResponse {
        SupportedResponse {
            x402_version: X402_VERSION,
            kinds: self.kinds(),
        }
    }

    /// Start nonce purging for every registered handler.
    pub fn start_nonce_cleanup(&self) {
        for handler in self.handlers.values() {
            match handler {
                SchemeHandler::Exact(f) => f.start_nonce_cleanup(),
            }
        }
    }
}

impl<C: ChainClient> FacilitatorEngine<C> {
    /// Latest block per registered network, sorted by network name.
    pub async fn chain_heads(&self) -> Vec<(String, Result<u64, X402Error>)> {
        let mut heads = Vec::with_capacity(self.handlers.len());
        for ((_, network), handler) in &self.handlers {
            let head = match handler {
                SchemeHandler::Exact(f) => f.chain().block_number().await,
            };
            heads.push((network.clone(), head));
        }
        heads.sort_by(|a, b| a.0.cmp(&b.0));
        heads
    }

    /// Verify, abandoning the in-flight chain calls if `cancel` resolves first.
    pub async fn verify_with_cancel<F>(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        cancel: F,
    ) -> Result<VerifyResponse, X402Error>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!("verification cancelled by caller");
                Err(X402Error::Cancelled)
            }
            result = Facilitator::verify(self, payload, requirements) => result,
        }
    }
}

impl<C: ChainClient> Facilitator for FacilitatorEngine<C> {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        match self.handler(&requirements.scheme, &requirements.network) {
            Some(handler) => handler.verify(payload, requirements).await,
            None => {
                tracing::info!(
                    scheme = %requirements.scheme,
                    network = %requirements.network,
                    "verify: no handler registered"
                );
                Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, None))
            }
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        match self.handler(&requirements.scheme, &requirements.network) {
            Some(handler) => handler.settle(payload, requirements).await,
            None => {
                tracing::info!(
                    scheme = %requirements.scheme,
                    network = %requirements.network,
                    "settle: no handler registered"
                );
                Ok(SettleResponse::failed(
                    ErrorReason::InvalidScheme,
                    String::new(),
                    requirements.network.clone(),
                    None,
                ))
            }
        }
    }

    async fn supported(&self) -> Result<SupportedResponse, X402Error> {
        Ok(self.supported_response())
    }
}
