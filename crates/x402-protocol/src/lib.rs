//! x402 payment protocol engine for USDC on Base.
//!
//! Implements HTTP 402 pay-per-request with the `exact` scheme: the payer
//! signs an EIP-3009 `TransferWithAuthorization` as EIP-712 typed data and a
//! facilitator verifies it off-chain, then settles it with
//! `transferWithAuthorization`.
//!
//! # Three-party model
//!
//! - **Client** ([`SchemeClient`]): builds and signs payment payloads
//! - **Resource server** ([`SchemeServer`]): prices endpoints, returns 402 with requirements
//! - **Facilitator** ([`Facilitator`]): verifies and settles, either in-process
//!   ([`FacilitatorEngine`]) or remote ([`FacilitatorClient`])
//!
//! # Example (in-process verification)
//!
//! ```no_run
//! use std::sync::Arc;
//! use alloy::providers::ProviderBuilder;
//! use x402::{EvmChain, ExactEvmFacilitator, Facilitator, FacilitatorEngine, NetworkRegistry};
//!
//! # async fn run(payload: x402::PaymentPayload, req: x402::PaymentRequirements) -> Result<(), x402::X402Error> {
//! let provider = ProviderBuilder::new().connect_http("https://sepolia.base.org".parse().unwrap());
//! let registry = Arc::new(NetworkRegistry::default());
//! let engine = FacilitatorEngine::new().with_exact(ExactEvmFacilitator::new(
//!     "base-sepolia",
//!     registry,
//!     EvmChain::new(provider),
//! ));
//!
//! let verdict = engine.verify(&payload, &req).await?;
//! println!("valid: {}", verdict.is_valid);
//! # Ok(())
//! # }
//! ```

// Core types and traits
pub mod constants;
pub mod error;
pub mod payment;
pub mod response;
pub mod scheme;

// Exact scheme on EVM networks
pub mod authorization;
pub mod chain;
pub mod codec;
pub mod eip712;
pub mod network;
pub mod nonce_store;
pub mod scheme_facilitator;
pub mod scheme_server;

// Facilitator dispatch and transport
pub mod auth;
pub mod facilitator;
pub mod facilitator_client;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use constants::*;
pub use error::{ValidationError, X402Error};
pub use payment::*;
pub use response::*;
pub use scheme::*;

pub use authorization::{prepare_payment, prepare_payment_at, unix_now, AuthorizationPolicy};
pub use chain::{ChainClient, EvmChain, TransferReceipt};
pub use codec::{decode_payment, decode_settle_response, encode_payment, encode_settle_response};
pub use eip712::AssetDomain;
pub use facilitator::{FacilitatorEngine, Scheme};
pub use facilitator_client::FacilitatorClient;
pub use network::{AssetInfo, NetworkInfo, NetworkRegistry};
pub use scheme_facilitator::ExactEvmFacilitator;
pub use scheme_server::ExactEvmSchemeServer;
