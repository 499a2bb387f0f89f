//! Builds unsigned `exact` payment payloads from payment requirements.

use alloy::primitives::Address;

use crate::constants::{MAX_AUTHORIZATION_WINDOW_SECS, VALID_AFTER_SKEW_SECS, X402_VERSION};
use crate::eip712::random_nonce;
use crate::payment::{ExactEvmAuthorization, PaymentRequirements, UnsignedPaymentPayload};
use crate::X402Error;

/// Payer-side limits applied while building an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    /// Cap on the validity window, whatever the server advertises.
    pub max_window_secs: u64,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self {
            max_window_secs: MAX_AUTHORIZATION_WINDOW_SECS,
        }
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> Result<u64, X402Error> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| X402Error::ConfigError(format!("system time error: {e}")))
}

/// Prepare an unsigned payload paying exactly `maxAmountRequired` to `payTo`.
pub fn prepare_payment(
    from: Address,
    requirements: &PaymentRequirements,
    policy: &AuthorizationPolicy,
) -> Result<UnsignedPaymentPayload, X402Error> {
    Ok(prepare_payment_at(from, requirements, policy, unix_now()?))
}

/// [`prepare_payment`] against a fixed clock.
pub fn prepare_payment_at(
    from: Address,
    requirements: &PaymentRequirements,
    policy: &AuthorizationPolicy,
    now: u64,
) -> UnsignedPaymentPayload {
    let window = requirements.max_timeout_seconds.min(policy.max_window_secs);
    UnsignedPaymentPayload {
        x402_version: X402_VERSION,
        scheme: requirements.scheme.clone(),
        network: requirements.network.clone(),
        authorization: ExactEvmAuthorization {
            from,
            to: requirements.pay_to,
            value: requirements.max_amount_required,
            valid_after: now.saturating_sub(VALID_AFTER_SKEW_SECS),
            valid_before: now.saturating_add(window),
            nonce: random_nonce(),
        },
    }
}
