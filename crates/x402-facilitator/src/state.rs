use x402::FacilitatorEngine;

/// Shared application state for the facilitator server.
///
/// Generic over the chain client so tests can run the real routes against an
/// in-memory chain.
pub struct AppState<C> {
    pub engine: FacilitatorEngine<C>,
    /// HMAC shared secret for authenticating `/verify` and `/settle`.
    /// Mandatory: the facilitator will not start without it.
    pub hmac_secret: Vec<u8>,
    /// Separate bearer token for `/metrics` (not the HMAC secret).
    pub metrics_token: Option<Vec<u8>>,
}

impl<C> AppState<C> {
    pub fn new(engine: FacilitatorEngine<C>, hmac_secret: Vec<u8>) -> Self {
        Self {
            engine,
            hmac_secret,
            metrics_token: None,
        }
    }

    pub fn with_metrics_token(mut self, token: Option<Vec<u8>>) -> Self {
        self.metrics_token = token;
        self
    }
}
