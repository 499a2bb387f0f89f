//! Build a wallet-backed facilitator engine from configuration.

use std::sync::Arc;

use alloy::network::EthereumWallet;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use x402::{
    EvmChain, ExactEvmFacilitator, FacilitatorEngine, NetworkRegistry, X402Error,
    BASE_RPC_URL, BASE_SEPOLIA_RPC_URL, NETWORK_BASE, NETWORK_BASE_SEPOLIA,
};

use crate::state::AppState;

/// Chain client used by the production facilitator.
pub type FacilitatorChain = EvmChain<DynProvider>;

/// Configuration for bootstrapping a facilitator.
pub struct BootstrapConfig<'a> {
    /// The facilitator's private key (hex-encoded). Pays gas for settlement.
    pub private_key: &'a str,
    /// `(network, rpc_url)` pairs to serve.
    pub networks: Vec<(String, String)>,
    /// HMAC shared secret (required).
    pub hmac_secret: Vec<u8>,
    /// Metrics bearer token (as raw bytes).
    pub metrics_token: Option<Vec<u8>>,
}

/// RPC URL for a known network, honouring `BASE_RPC_URL` and
/// `BASE_SEPOLIA_RPC_URL` overrides.
pub fn rpc_url_for(network: &str) -> Option<String> {
    let (var, default) = match network {
        NETWORK_BASE => ("BASE_RPC_URL", BASE_RPC_URL),
        NETWORK_BASE_SEPOLIA => ("BASE_SEPOLIA_RPC_URL", BASE_SEPOLIA_RPC_URL),
        _ => return None,
    };
    Some(std::env::var(var).unwrap_or_else(|_| default.to_string()))
}

/// Parse the signer, connect one wallet provider per network and register
/// the `exact` scheme for each. Starts background nonce purging, so it must
/// be called inside a Tokio runtime.
pub fn bootstrap_facilitator(
    config: BootstrapConfig<'_>,
) -> Result<AppState<FacilitatorChain>, X402Error> {
    let signer: PrivateKeySigner = config
        .private_key
        .parse()
        .map_err(|e| X402Error::ConfigError(format!("invalid FACILITATOR_PRIVATE_KEY: {e}")))?;
    let facilitator_address = signer.address();
    let wallet = EthereumWallet::from(signer);

    if config.networks.is_empty() {
        return Err(X402Error::ConfigError(
            "at least one network must be configured".to_string(),
        ));
    }

    let registry = Arc::new(NetworkRegistry::default());
    let mut engine = FacilitatorEngine::new();

    for (network, rpc_url) in &config.networks {
        registry.resolve(network).map_err(|_| {
            X402Error::ConfigError(format!("network {network} is not in the registry"))
        })?;
        let url = rpc_url
            .parse()
            .map_err(|e| X402Error::ConfigError(format!("invalid RPC URL for {network}: {e}")))?;

        let provider = ProviderBuilder::new()
            .wallet(wallet.clone())
            .connect_http(url)
            .erased();

        engine = engine.with_exact(ExactEvmFacilitator::new(
            network.clone(),
            registry.clone(),
            EvmChain::new(provider),
        ));
        tracing::info!(network = %network, rpc = %rpc_url, "registered exact scheme");
    }

    engine.start_nonce_cleanup();
    tracing::info!("Facilitator address: {facilitator_address}");

    Ok(AppState::new(engine, config.hmac_secret).with_metrics_token(config.metrics_token))
}
