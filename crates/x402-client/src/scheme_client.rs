use std::sync::Arc;

use alloy::primitives::Address;
use alloy::providers::DynProvider;
use alloy::signers::local::PrivateKeySigner;

use x402::eip712::sign_authorization;
use x402::{
    prepare_payment, AuthorizationPolicy, ChainClient, EvmChain, NetworkRegistry, PaymentPayload,
    PaymentRequirements, SchemeClient, X402Error, SCHEME_EXACT,
};

/// Client-side `exact` scheme: builds and signs EIP-3009 authorizations.
///
/// The EIP-712 domain name comes from the network registry. The domain
/// version is read from the token contract when a chain client is attached,
/// otherwise taken from `extra.version` in the requirements, otherwise from
/// the registry's default for the asset.
pub struct ExactEvmSchemeClient<C = EvmChain<DynProvider>> {
    signer: PrivateKeySigner,
    registry: Arc<NetworkRegistry>,
    chain: Option<C>,
    policy: AuthorizationPolicy,
}

impl ExactEvmSchemeClient {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            registry: Arc::new(NetworkRegistry::default()),
            chain: None,
            policy: AuthorizationPolicy::default(),
        }
    }
}

impl<C> ExactEvmSchemeClient<C> {
    /// Look up asset versions on-chain through `chain`.
    pub fn with_chain<C2: ChainClient>(self, chain: C2) -> ExactEvmSchemeClient<C2> {
        ExactEvmSchemeClient {
            signer: self.signer,
            registry: self.registry,
            chain: Some(chain),
            policy: self.policy,
        }
    }

    pub fn with_registry(mut self, registry: Arc<NetworkRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_policy(mut self, policy: AuthorizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Get the address of the signer.
    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

impl<C: ChainClient> ExactEvmSchemeClient<C> {
    async fn domain_version(&self, requirements: &PaymentRequirements) -> Result<String, X402Error> {
        if let Some(chain) = &self.chain {
            return self.registry.asset_version(&requirements.network, chain).await;
        }
        if let Some(extra) = &requirements.extra {
            return Ok(extra.version.clone());
        }
        Ok(self
            .registry
            .resolve(&requirements.network)?
            .asset
            .eip712_version
            .clone())
    }
}

impl<C: ChainClient> SchemeClient for ExactEvmSchemeClient<C> {
    fn supports(&self, requirements: &PaymentRequirements) -> bool {
        requirements.scheme == SCHEME_EXACT && self.registry.contains(&requirements.network)
    }

    async fn create_payment_payload(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, X402Error> {
        if requirements.scheme != SCHEME_EXACT {
            return Err(X402Error::UnsupportedScheme(requirements.scheme.clone()));
        }
        let info = self.registry.resolve(&requirements.network)?;
        let version = self.domain_version(requirements).await?;

        let mut domain = info.asset_domain(version);
        domain.verifying_contract = requirements.asset;

        let unsigned = prepare_payment(self.signer.address(), requirements, &self.policy)?;
        let signature = sign_authorization(&self.signer, &unsigned.authorization, &domain).await?;

        tracing::debug!(
            payer = %self.signer.address(),
            network = %requirements.network,
            amount = %requirements.max_amount_required,
            "signed payment authorization"
        );
        Ok(unsigned.into_signed(signature))
    }
}
