//! Wire records exchanged between client, resource server and facilitator.
//!
//! Every record is validated at the boundary: unknown fields, missing
//! required fields, non-decimal amounts and malformed addresses are rejected
//! during deserialization, and the `from_value`/`validate` helpers add the
//! semantic checks serde cannot express.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::X402_VERSION;
use crate::error::ValidationError;

/// EIP-712 domain metadata for the asset, carried in `PaymentRequirements.extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetExtra {
    pub name: String,
    pub version: String,
}

/// A single entry in the `accepts` array of a 402 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    #[serde(with = "decimal_u256")]
    pub max_amount_required: U256,
    pub resource: Url,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    pub asset: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<AssetExtra>,
}

impl PaymentRequirements {
    /// Build requirements from an untyped JSON object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        let requirements: Self = serde_json::from_value(value)?;
        requirements.validate()?;
        Ok(requirements)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.scheme.is_empty() {
            return Err(ValidationError::field("scheme", "must not be empty"));
        }
        if self.network.is_empty() {
            return Err(ValidationError::field("network", "must not be empty"));
        }
        if self.max_timeout_seconds == 0 {
            return Err(ValidationError::field(
                "maxTimeoutSeconds",
                "must be greater than zero",
            ));
        }
        if self.resource.cannot_be_a_base() {
            return Err(ValidationError::field(
                "resource",
                "must be an absolute hierarchical URL",
            ));
        }
        Ok(())
    }
}

/// EIP-3009 `TransferWithAuthorization` fields as they travel on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExactEvmAuthorization {
    pub from: Address,
    pub to: Address,
    #[serde(with = "decimal_u256")]
    pub value: U256,
    #[serde(with = "decimal_u64")]
    pub valid_after: u64,
    #[serde(with = "decimal_u64")]
    pub valid_before: u64,
    pub nonce: B256,
}

/// Scheme payload for `exact` on EVM networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExactEvmPayload {
    pub signature: Bytes,
    pub authorization: ExactEvmAuthorization,
}

/// Wire-format payment payload (sent in the `X-PAYMENT` header, base64-encoded JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: ExactEvmPayload,
}

impl PaymentPayload {
    /// Build a payload from an untyped JSON object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        let payload: Self = serde_json::from_value(value)?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.x402_version == 0 {
            return Err(ValidationError::field("x402Version", "must be positive"));
        }
        if self.scheme.is_empty() {
            return Err(ValidationError::field("scheme", "must not be empty"));
        }
        if self.network.is_empty() {
            return Err(ValidationError::field("network", "must not be empty"));
        }
        if self.payload.signature.is_empty() {
            return Err(ValidationError::field("payload.signature", "must not be empty"));
        }
        Ok(())
    }

    pub fn authorization(&self) -> &ExactEvmAuthorization {
        &self.payload.authorization
    }

    /// Whether this payload names the same scheme and network as `requirements`.
    pub fn targets(&self, requirements: &PaymentRequirements) -> bool {
        self.scheme == requirements.scheme && self.network == requirements.network
    }
}

/// A payload that has been prepared but not yet signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedPaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub authorization: ExactEvmAuthorization,
}

impl UnsignedPaymentPayload {
    pub fn into_signed(self, signature: Bytes) -> PaymentPayload {
        PaymentPayload {
            x402_version: self.x402_version,
            scheme: self.scheme,
            network: self.network,
            payload: ExactEvmPayload {
                signature,
                authorization: self.authorization,
            },
        }
    }
}

/// The 402 response body returned by the resource server.
///
/// Older servers send the list under `paymentRequirements`; both spellings
/// are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    #[serde(default = "default_version")]
    pub x402_version: u32,
    #[serde(default)]
    pub error: String,
    #[serde(alias = "paymentRequirements")]
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer_address: Option<Address>,
}

impl PaymentRequiredBody {
    pub fn new(error: impl Into<String>, accepts: Vec<PaymentRequirements>) -> Self {
        Self {
            x402_version: X402_VERSION,
            error: error.into(),
            accepts,
            payer_address: None,
        }
    }

    pub fn with_payer(mut self, payer: Option<Address>) -> Self {
        self.payer_address = payer;
        self
    }
}

fn default_version() -> u32 {
    X402_VERSION
}

/// Token amounts travel as decimal strings, never as JSON numbers or hex.
pub(crate) mod decimal_u256 {
    use alloy::primitives::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(D::Error::custom(format!(
                "expected a decimal integer string, got {s:?}"
            )));
        }
        U256::from_str_radix(&s, 10).map_err(D::Error::custom)
    }
}

/// Unix timestamps: emitted as decimal strings, accepted as strings or integers.
pub(crate) mod decimal_u64 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse().map_err(D::Error::custom)
            }
            Raw::Text(s) => Err(D::Error::custom(format!(
                "expected a decimal timestamp, got {s:?}"
            ))),
        }
    }
}
