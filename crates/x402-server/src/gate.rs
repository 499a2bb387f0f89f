//! Framework-agnostic payment gate.
//!
//! [`PaymentGate::process`] takes the raw `X-PAYMENT` header, the offered
//! requirements and the protected handler, and decides what the client
//! gets back: a 402, the handler's response with a settlement receipt, or
//! a 402 replacing the handler's response when settlement fails before it
//! was sent. HTTP adapters only translate [`GateOutcome`] into their own
//! response type.

use std::future::Future;

use x402::{
    decode_payment, encode_settle_response, ErrorReason, Facilitator, PaymentPayload,
    PaymentRequiredBody, PaymentRequirements, SettleResponse,
};

use crate::metrics;

pub const MISSING_HEADER: &str = "X-PAYMENT header is required";
pub const NO_MATCHING_REQUIREMENTS: &str = "Unable to find matching payment requirements";
/// Reported when the facilitator could not be asked to verify.
pub const VERIFY_UNAVAILABLE: &str = "unexpected_verify_error";

/// What the protected handler produced.
pub struct Proceeded<R> {
    pub response: R,
    /// `true` once any response bytes have reached the client. Settlement
    /// failures after that point can no longer change the response.
    pub committed: bool,
}

impl<R> Proceeded<R> {
    /// A response still fully held by the server.
    pub fn buffered(response: R) -> Self {
        Self {
            response,
            committed: false,
        }
    }
}

/// Result of running a request through the gate.
#[derive(Debug)]
pub enum GateOutcome<R> {
    /// Rejected before the handler ran; respond 402 with this body.
    PaymentRequired(PaymentRequiredBody),
    /// Handler ran and payment settled; attach `payment_response` as the
    /// `X-PAYMENT-RESPONSE` header without touching the response itself.
    Paid {
        response: R,
        settlement: SettleResponse,
        payment_response: String,
    },
    /// Settlement failed while the response was still buffered; the
    /// handler's response is discarded in favour of this 402.
    SettlementFailed(PaymentRequiredBody),
    /// Settlement failed after the response was committed. The failure has
    /// been logged and counted; nothing else can be done.
    Unsettled { response: R, error: String },
}

/// Payment gate over any [`Facilitator`], in-process or remote.
pub struct PaymentGate<F> {
    facilitator: F,
}

impl<F: Facilitator> PaymentGate<F> {
    pub fn new(facilitator: F) -> Self {
        Self { facilitator }
    }

    pub fn facilitator(&self) -> &F {
        &self.facilitator
    }

    /// Run one request through the gate.
    ///
    /// Every failure before the handler runs, including an unreachable
    /// facilitator, becomes a 402 carrying `accepts`.
    pub async fn process<R, H, Fut>(
        &self,
        payment_header: Option<&str>,
        accepts: &[PaymentRequirements],
        handler: H,
    ) -> GateOutcome<R>
    where
        H: FnOnce() -> Fut,
        Fut: Future<Output = Proceeded<R>>,
    {
        let Some(header) = payment_header else {
            return GateOutcome::PaymentRequired(PaymentRequiredBody::new(
                MISSING_HEADER,
                accepts.to_vec(),
            ));
        };

        let payload = match decode_payment(header) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "invalid payment header");
                metrics::PAYMENT_ATTEMPTS
                    .with_label_values(&["malformed"])
                    .inc();
                return GateOutcome::PaymentRequired(PaymentRequiredBody::new(
                    e.to_string(),
                    accepts.to_vec(),
                ));
            }
        };

        let Some(requirements) = accepts.iter().find(|r| payload.targets(r)) else {
            tracing::info!(
                scheme = %payload.scheme,
                network = %payload.network,
                "payment targets no offered requirement"
            );
            metrics::PAYMENT_ATTEMPTS
                .with_label_values(&["unmatched"])
                .inc();
            return GateOutcome::PaymentRequired(PaymentRequiredBody::new(
                NO_MATCHING_REQUIREMENTS,
                accepts.to_vec(),
            ));
        };

        let payer = payload.authorization().from;
        tracing::info!(
            payer = %payer,
            nonce = %format!("{:.8}", payload.authorization().nonce),
            network = %payload.network,
            "payment attempt"
        );

        let verdict = match self.facilitator.verify(&payload, requirements).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(payer = %payer, error = %e, "facilitator verify call failed");
                metrics::PAYMENT_ATTEMPTS
                    .with_label_values(&["verify_error"])
                    .inc();
                return GateOutcome::PaymentRequired(PaymentRequiredBody::new(
                    VERIFY_UNAVAILABLE,
                    accepts.to_vec(),
                ));
            }
        };
        if !verdict.is_valid {
            let reason = verdict.invalid_reason.unwrap_or(ErrorReason::InvalidScheme);
            tracing::warn!(payer = %payer, reason = %reason, "payment rejected at verify");
            metrics::PAYMENT_ATTEMPTS
                .with_label_values(&["rejected"])
                .inc();
            return GateOutcome::PaymentRequired(
                PaymentRequiredBody::new(reason.as_str(), accepts.to_vec())
                    .with_payer(verdict.payer_address),
            );
        }

        let proceeded = handler().await;
        let settled = self.settle(&payload, requirements).await;

        match settled {
            Ok((settlement, payment_response)) => {
                metrics::PAYMENT_ATTEMPTS
                    .with_label_values(&["success"])
                    .inc();
                tracing::info!(
                    payer = %payer,
                    tx = %settlement.transaction,
                    network = %settlement.network,
                    "payment settled"
                );
                GateOutcome::Paid {
                    response: proceeded.response,
                    settlement,
                    payment_response,
                }
            }
            Err(error) if proceeded.committed => {
                metrics::PAYMENT_ATTEMPTS
                    .with_label_values(&["settle_failed"])
                    .inc();
                metrics::SETTLEMENT_AFTER_COMMIT_FAILURES.inc();
                tracing::error!(
                    payer = %payer,
                    error = %error,
                    "settlement failed after response was sent; resource served unpaid"
                );
                GateOutcome::Unsettled {
                    response: proceeded.response,
                    error,
                }
            }
            Err(error) => {
                metrics::PAYMENT_ATTEMPTS
                    .with_label_values(&["settle_failed"])
                    .inc();
                tracing::warn!(payer = %payer, error = %error, "settlement failed");
                GateOutcome::SettlementFailed(
                    PaymentRequiredBody::new(error, accepts.to_vec()).with_payer(Some(payer)),
                )
            }
        }
    }

    /// Settle and encode the receipt header; any failure is reduced to the
    /// error string reported to the client.
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<(SettleResponse, String), String> {
        let settlement = match self.facilitator.settle(payload, requirements).await {
            Ok(s) if s.success => s,
            Ok(s) => {
                if !s.transaction.is_empty() {
                    tracing::warn!(tx = %s.transaction, "settlement transaction reverted");
                }
                return Err(s
                    .error_reason
                    .unwrap_or(ErrorReason::UnexpectedSettleError)
                    .to_string());
            }
            Err(e) => {
                tracing::error!(error = %e, "facilitator settle call failed");
                return Err(ErrorReason::UnexpectedSettleError.to_string());
            }
        };

        match encode_settle_response(&settlement) {
            Ok(header) => Ok((settlement, header)),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode settlement receipt");
                Err(ErrorReason::UnexpectedSettleError.to_string())
            }
        }
    }
}
