//! Network registry: maps x402 network identifiers to chain and asset metadata.
//!
//! The registry also owns the cache of on-chain asset `version()` strings used
//! in the EIP-712 domain. The cache is populated lazily and never invalidated;
//! two concurrent first lookups may both hit the chain and will store the same
//! value.

use std::collections::HashMap;

use alloy::primitives::Address;
use dashmap::DashMap;

use crate::chain::ChainClient;
use crate::constants::{
    BASE_CHAIN_ID, BASE_SEPOLIA_CHAIN_ID, BASE_SEPOLIA_USDC, BASE_SEPOLIA_USDC_NAME, BASE_USDC,
    BASE_USDC_NAME, NETWORK_BASE, NETWORK_BASE_SEPOLIA, USDC_DECIMALS, USDC_EIP712_VERSION,
};
use crate::eip712::AssetDomain;
use crate::X402Error;

/// The canonical payment asset of a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub address: Address,
    /// EIP-712 domain name of the token contract.
    pub name: String,
    /// EIP-712 domain version advertised to payers in `extra`.
    pub eip712_version: String,
    pub decimals: u32,
}

/// Static description of one supported network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub network: String,
    pub chain_id: u64,
    pub asset: AssetInfo,
}

impl NetworkInfo {
    /// EIP-712 domain of this network's asset at the given contract version.
    pub fn asset_domain(&self, version: impl Into<String>) -> AssetDomain {
        AssetDomain {
            name: self.asset.name.clone(),
            version: version.into(),
            chain_id: self.chain_id,
            verifying_contract: self.asset.address,
        }
    }
}

/// Registry of supported networks plus the asset-version cache.
#[derive(Debug)]
pub struct NetworkRegistry {
    networks: HashMap<String, NetworkInfo>,
    versions: DashMap<String, String>,
}

impl NetworkRegistry {
    /// An empty registry. Most callers want [`NetworkRegistry::default`].
    pub fn empty() -> Self {
        Self {
            networks: HashMap::new(),
            versions: DashMap::new(),
        }
    }

    /// Register (or replace) a network, e.g. a local devnet.
    pub fn with_network(mut self, info: NetworkInfo) -> Self {
        self.versions.remove(&info.network);
        self.networks.insert(info.network.clone(), info);
        self
    }

    /// Look up a network by identifier.
    pub fn resolve(&self, network: &str) -> Result<&NetworkInfo, X402Error> {
        self.networks
            .get(network)
            .ok_or_else(|| X402Error::UnsupportedNetwork(network.to_string()))
    }

    pub fn contains(&self, network: &str) -> bool {
        self.networks.contains_key(network)
    }

    /// Registered network identifiers, sorted.
    pub fn networks(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.networks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The asset contract's `version()` for `network`, fetched once through
    /// `chain` and memoized for the life of the registry.
    pub async fn asset_version<C: ChainClient>(
        &self,
        network: &str,
        chain: &C,
    ) -> Result<String, X402Error> {
        let info = self.resolve(network)?;
        if let Some(version) = self.cached_version(network) {
            return Ok(version);
        }

        let version = chain.asset_version(info.asset.address).await?;
        tracing::debug!(network, asset = %info.asset.address, %version, "cached asset version");
        self.versions.insert(network.to_string(), version.clone());
        Ok(version)
    }

    /// The cached version for `network`, if one has been fetched.
    pub fn cached_version(&self, network: &str) -> Option<String> {
        self.versions.get(network).map(|v| v.value().clone())
    }
}

impl Default for NetworkRegistry {
    /// Base mainnet and Base Sepolia with their native USDC deployments.
    fn default() -> Self {
        Self::empty()
            .with_network(NetworkInfo {
                network: NETWORK_BASE.to_string(),
                chain_id: BASE_CHAIN_ID,
                asset: AssetInfo {
                    address: BASE_USDC,
                    name: BASE_USDC_NAME.to_string(),
                    eip712_version: USDC_EIP712_VERSION.to_string(),
                    decimals: USDC_DECIMALS,
                },
            })
            .with_network(NetworkInfo {
                network: NETWORK_BASE_SEPOLIA.to_string(),
                chain_id: BASE_SEPOLIA_CHAIN_ID,
                asset: AssetInfo {
                    address: BASE_SEPOLIA_USDC,
                    name: BASE_SEPOLIA_USDC_NAME.to_string(),
                    eip712_version: USDC_EIP712_VERSION.to_string(),
                    decimals: USDC_DECIMALS,
                },
            })
    }
}
