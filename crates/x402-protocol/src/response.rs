use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::payment::{PaymentPayload, PaymentRequirements};

/// Machine-readable failure reasons reported by verify and settle.
///
/// The taxonomy is deliberately coarse: `InvalidScheme` covers every
/// scheme, signature, timing, asset and amount mismatch. The specific cause
/// is written to the facilitator's logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    InvalidScheme,
    InvalidNetwork,
    InsufficientFunds,
    MalformedPayload,
    UnsupportedScheme,
    UnexpectedSettleError,
    /// Any reason string this engine does not know (e.g. from a newer facilitator).
    #[serde(other)]
    Other,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::InvalidScheme => "invalid_scheme",
            ErrorReason::InvalidNetwork => "invalid_network",
            ErrorReason::InsufficientFunds => "insufficient_funds",
            ErrorReason::MalformedPayload => "malformed_payload",
            ErrorReason::UnsupportedScheme => "unsupported_scheme",
            ErrorReason::UnexpectedSettleError => "unexpected_settle_error",
            ErrorReason::Other => "other",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response from the facilitator's `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_address: Option<Address>,
}

impl VerifyResponse {
    pub fn valid(payer: Address) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer_address: Some(payer),
        }
    }

    pub fn invalid(reason: ErrorReason, payer: Option<Address>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer_address: payer,
        }
    }
}

/// Response from the facilitator's `/settle` endpoint.
///
/// `transaction` is empty when nothing was submitted; on a reverted
/// transaction it carries the hash even though `success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    #[serde(default)]
    pub transaction: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

impl SettleResponse {
    pub fn settled(transaction: String, network: String, payer: Address) -> Self {
        Self {
            success: true,
            error_reason: None,
            transaction,
            network,
            payer: Some(payer),
        }
    }

    pub fn failed(
        reason: ErrorReason,
        transaction: String,
        network: String,
        payer: Option<Address>,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            transaction,
            network,
            payer,
        }
    }
}

/// One `(scheme, network)` combination a facilitator accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub scheme: String,
    pub network: String,
}

/// Body of the facilitator's `/supported` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub x402_version: u32,
    #[serde(alias = "kind")]
    pub kinds: Vec<SupportedKind>,
}

impl SupportedResponse {
    pub fn supports(&self, scheme: &str, network: &str) -> bool {
        self.kinds
            .iter()
            .any(|k| k.scheme == scheme && k.network == network)
    }
}

/// Request body for the facilitator's `/verify` and `/settle` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    pub x402_version: u32,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}
