//! x402 client SDK for making paid API requests.
//!
//! Handles the HTTP 402 flow automatically: request, 402, sign, retry once.
//!
//! # Quick Example
//!
//! ```no_run
//! use alloy::signers::local::PrivateKeySigner;
//! use x402_client::{ExactEvmSchemeClient, X402Client};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), x402::X402Error> {
//! let signer: PrivateKeySigner = "0xYOUR_KEY".parse().unwrap();
//! let client = X402Client::new(ExactEvmSchemeClient::new(signer))?;
//!
//! let (resp, settlement) = client
//!     .fetch("https://api.example.com/weather", reqwest::Method::GET)
//!     .await?;
//!
//! if let Some(s) = settlement {
//!     println!("Paid via tx: {}", s.transaction);
//! }
//! # Ok(())
//! # }
//! ```

mod http_client;
mod scheme_client;

pub use http_client::X402Client;
pub use scheme_client::ExactEvmSchemeClient;

// Re-export commonly needed types from core
pub use x402::{
    decode_payment, decode_settle_response, encode_payment, PaymentPayload, PaymentRequiredBody,
    PaymentRequirements, SchemeClient, SettleResponse, X402Error, SCHEME_EXACT,
};
