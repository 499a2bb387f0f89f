//! x402 facilitator: verifies EIP-3009 payment authorizations and settles them on-chain.
//!
//! The facilitator receives HMAC-authenticated requests from resource servers,
//! verifies the payer's EIP-712 signature, balance and validity window, and
//! submits `transferWithAuthorization` to the USDC contract. Verification and
//! settlement live in the core [`x402`] crate; this crate provides the HTTP
//! server, state and bootstrap.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (health, metrics, supported, verify, settle)
//! - [`state`]: shared [`AppState`](state::AppState)
//! - [`bootstrap`]: builds a wallet-backed engine from configuration
//! - [`metrics`]: Prometheus metrics for verification and settlement

pub mod bootstrap;
pub mod metrics;
pub mod routes;
pub mod state;
