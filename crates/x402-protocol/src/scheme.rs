//! Core trait definitions for the three-party payment model.
//!
//! - [`SchemeClient`]: client-side, creates signed payment payloads
//! - [`SchemeFacilitator`]: one scheme on one network, verifies and settles
//! - [`Facilitator`]: what a resource server talks to, in-process or remote
//! - [`SchemeServer`]: server-side, parses prices into on-chain amounts
//!
//! See [`crate::scheme_facilitator::ExactEvmFacilitator`],
//! [`crate::facilitator::FacilitatorEngine`] and
//! [`crate::facilitator_client::FacilitatorClient`] for the implementations.

use alloy::primitives::U256;

use crate::error::X402Error;
use crate::network::AssetInfo;
use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::{SettleResponse, SupportedResponse, VerifyResponse};

/// Client-side scheme: creates signed payment payloads.
pub trait SchemeClient: Send + Sync {
    /// Whether this client can pay `requirements` at all.
    fn supports(&self, requirements: &PaymentRequirements) -> bool;

    /// Create a signed payment payload for the given requirements.
    fn create_payment_payload(
        &self,
        requirements: &PaymentRequirements,
    ) -> impl std::future::Future<Output = Result<PaymentPayload, X402Error>> + Send;
}

/// Verification and settlement for one scheme on one network.
///
/// Business-rule failures come back as `Ok` responses with a reason;
/// `Err` is reserved for chain or configuration faults.
pub trait SchemeFacilitator: Send + Sync {
    /// Verify a payment payload against the requirements.
    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl std::future::Future<Output = Result<VerifyResponse, X402Error>> + Send;

    /// Settle a payment on-chain (re-verifies first).
    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl std::future::Future<Output = Result<SettleResponse, X402Error>> + Send;
}

/// A facilitator as seen by a resource server.
pub trait Facilitator: Send + Sync {
    fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl std::future::Future<Output = Result<VerifyResponse, X402Error>> + Send;

    fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> impl std::future::Future<Output = Result<SettleResponse, X402Error>> + Send;

    /// The `(scheme, network)` combinations this facilitator accepts.
    fn supported(
        &self,
    ) -> impl std::future::Future<Output = Result<SupportedResponse, X402Error>> + Send;
}

impl<T: Facilitator> Facilitator for std::sync::Arc<T> {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        (**self).verify(payload, requirements).await
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        (**self).settle(payload, requirements).await
    }

    async fn supported(&self) -> Result<SupportedResponse, X402Error> {
        (**self).supported().await
    }
}

/// Server-side scheme: parses prices into on-chain amounts.
pub trait SchemeServer: Send + Sync {
    /// Parse a money string (e.g. `"$0.001"`) into atomic units of the
    /// network's payment asset.
    fn parse_price(&self, price: &str, network: &str) -> Result<(U256, AssetInfo), X402Error>;
}
