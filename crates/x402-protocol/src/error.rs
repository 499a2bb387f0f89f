use thiserror::Error;

/// Errors returned by x402 operations.
///
/// Business-rule failures (bad signature, expired authorization, low balance)
/// are never reported through this type; they come back as
/// [`VerifyResponse`](crate::VerifyResponse) / [`SettleResponse`](crate::SettleResponse)
/// values. `X402Error` is reserved for faults the caller has to handle.
#[derive(Debug, Error)]
pub enum X402Error {
    #[error("signature error: {0}")]
    SignatureError(String),

    #[error("chain error: {0}")]
    ChainError(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("http error: {0}")]
    HttpError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// A wire record failed boundary validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for X402Error {
    fn from(e: ValidationError) -> Self {
        X402Error::MalformedPayload(e.to_string())
    }
}
