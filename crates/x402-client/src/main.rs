use std::sync::Arc;

use alloy::primitives::U256;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use x402::{EvmChain, NetworkRegistry};
use x402_client::{ExactEvmSchemeClient, X402Client};

/// Fetch a URL, paying for it if the server answers 402.
///
/// Usage: `x402-fetch <url> [METHOD]`
///
/// Environment:
/// - `PRIVATE_KEY` (required): payer key, hex
/// - `X402_MAX_VALUE`: ceiling in atomic USDC units (default 100000 = $0.10)
/// - `X402_NETWORK`: preferred network when several are offered
/// - `RPC_URL`: read the EIP-712 domain version from the token contract
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "fetch failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let url = args.next().ok_or("usage: x402-fetch <url> [METHOD]")?;
    let method: reqwest::Method = args
        .next()
        .unwrap_or_else(|| "GET".to_string())
        .to_uppercase()
        .parse()?;

    let signer: PrivateKeySigner = std::env::var("PRIVATE_KEY")
        .map_err(|_| "PRIVATE_KEY must be set")?
        .parse()?;
    tracing::info!(payer = %signer.address(), "loaded payer key");

    let registry = Arc::new(NetworkRegistry::default());
    let scheme = ExactEvmSchemeClient::new(signer).with_registry(registry);

    let outcome = match std::env::var("RPC_URL") {
        Ok(rpc) => {
            let provider = ProviderBuilder::new().connect_http(rpc.parse()?).erased();
            let client = build_client(scheme.with_chain(EvmChain::new(provider)))?;
            client.fetch(&url, method).await?
        }
        Err(_) => build_client(scheme)?.fetch(&url, method).await?,
    };

    let (resp, settlement) = outcome;
    if let Some(s) = &settlement {
        tracing::info!(
            success = s.success,
            transaction = %s.transaction,
            network = %s.network,
            "payment settled"
        );
    }

    let status = resp.status();
    let text = resp.text().await?;
    println!("{text}");
    if !status.is_success() {
        return Err(format!("server responded {status}").into());
    }
    Ok(())
}

fn build_client<S: x402::SchemeClient>(
    scheme: S,
) -> Result<X402Client<S>, Box<dyn std::error::Error>> {
    let mut client = X402Client::new(scheme)?;
    if let Ok(max) = std::env::var("X402_MAX_VALUE") {
        client = client.with_max_value(U256::from_str_radix(&max, 10)?);
    }
    if let Ok(network) = std::env::var("X402_NETWORK") {
        client = client.with_preference(x402::SCHEME_EXACT, network);
    }
    Ok(client)
}
