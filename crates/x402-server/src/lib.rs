//! x402 resource server: gates HTTP endpoints behind 402 payments.
//!
//! The payment decision lives in the framework-agnostic [`gate`]; the
//! actix-web adapter in [`middleware`] only translates requests and
//! responses. Prices are configured per route with [`PaymentConfigBuilder`].
//!
//! # Modules
//!
//! - [`gate`]: payment state machine ([`PaymentGate`](gate::PaymentGate))
//! - [`config`]: payment configuration and route registration
//! - [`middleware`]: actix-web adapter ([`require_payment`](middleware::require_payment))
//! - [`metrics`]: Prometheus metrics for request and payment tracking

pub mod config;
pub mod gate;
pub mod metrics;
pub mod middleware;

pub use config::{PaymentConfig, PaymentConfigBuilder, PaymentGateConfig, RoutePaymentConfig};
pub use gate::{GateOutcome, PaymentGate, Proceeded};
pub use middleware::{check_payment_gate, require_payment};
