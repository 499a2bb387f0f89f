use std::sync::Arc;
use std::time::Duration;

use crate::chain::ChainClient;
use crate::constants::{
    MAX_AUTHORIZATION_WINDOW_SECS, SCHEME_EXACT, VALID_BEFORE_MARGIN_SECS, X402_VERSION,
};
use crate::eip712::{recover_signer, AssetDomain};
use crate::network::NetworkRegistry;
use crate::nonce_store::{InMemoryNonceStore, NonceStore};
use crate::{
    authorization::unix_now, ErrorReason, PaymentPayload, PaymentRequirements, SchemeFacilitator,
    SettleResponse, VerifyResponse, X402Error,
};

/// `exact` scheme on one EVM network: verifies EIP-3009 authorizations and
/// settles them with `transferWithAuthorization`.
///
/// The chain client submits with the facilitator's own key; the facilitator
/// pays gas, the payer's authorization is what gets spent.
pub struct ExactEvmFacilitator<C> {
    network: String,
    registry: Arc<NetworkRegistry>,
    chain: C,
    nonce_store: Arc<dyn NonceStore>,
}

impl<C> ExactEvmFacilitator<C> {
    pub fn new(network: impl Into<String>, registry: Arc<NetworkRegistry>, chain: C) -> Self {
        Self {
            network: network.into(),
            registry,
            chain,
            nonce_store: Arc::new(InMemoryNonceStore::new()),
        }
    }

    /// Share a nonce store between several facilitators.
    pub fn with_nonce_store(mut self, store: Arc<dyn NonceStore>) -> Self {
        self.nonce_store = store;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Start a background task that purges claimed nonces every 60 seconds.
    ///
    /// Entries outlive the longest authorization window a payer will sign,
    /// after which the contract rejects the authorization on its own.
    pub fn start_nonce_cleanup(&self) {
        let store = Arc::clone(&self.nonce_store);
        let expiry_secs = MAX_AUTHORIZATION_WINDOW_SECS + 60;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let purged = store.purge_expired(expiry_secs);
                if purged > 0 {
                    tracing::info!(purged, "purged expired nonces");
                }
            }
        });
    }
}

impl<C: ChainClient> ExactEvmFacilitator<C> {
    /// Verify against a fixed clock. The checks run in a fixed order and
    /// stop at the first failure; the balance read is the only chain call
    /// after the (cached) asset version.
    pub async fn verify_at(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: u64,
    ) -> Result<VerifyResponse, X402Error> {
        let auth = payload.authorization();

        // 1. Scheme
        if payload.x402_version != X402_VERSION
            || payload.scheme != SCHEME_EXACT
            || requirements.scheme != SCHEME_EXACT
        {
            tracing::info!(
                version = payload.x402_version,
                payload_scheme = %payload.scheme,
                required_scheme = %requirements.scheme,
                "payment rejected: incompatible scheme"
            );
            return Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, None));
        }

        // 2. Network, asset metadata and on-chain version
        if payload.network != requirements.network || requirements.network != self.network {
            tracing::info!(
                payload_network = %payload.network,
                required_network = %requirements.network,
                facilitator_network = %self.network,
                "payment rejected: network mismatch"
            );
            return Ok(VerifyResponse::invalid(ErrorReason::InvalidNetwork, None));
        }
        let info = match self.registry.resolve(&requirements.network) {
            Ok(info) => info,
            Err(e) => {
                tracing::info!(error = %e, "payment rejected: unknown network");
                return Ok(VerifyResponse::invalid(ErrorReason::InvalidNetwork, None));
            }
        };
        let version = match self
            .registry
            .asset_version(&requirements.network, &self.chain)
            .await
        {
            Ok(version) => version,
            Err(e) => {
                tracing::info!(
                    network = %requirements.network,
                    error = %e,
                    "payment rejected: asset version unavailable"
                );
                return Ok(VerifyResponse::invalid(ErrorReason::InvalidNetwork, None));
            }
        };

        // 3. Signature
        let domain = AssetDomain {
            name: info.asset.name.clone(),
            version,
            chain_id: info.chain_id,
            verifying_contract: requirements.asset,
        };
        match recover_signer(auth, &payload.payload.signature, &domain) {
            Ok(signer) if signer == auth.from => {}
            Ok(signer) => {
                tracing::info!(
                    claimed = %auth.from,
                    recovered = %signer,
                    "payment rejected: signature does not match payer"
                );
                return Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, None));
            }
            Err(e) => {
                tracing::info!(payer = %auth.from, error = %e, "payment rejected: bad signature");
                return Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, None));
            }
        }
        let payer = Some(auth.from);

        // 4. Asset
        if requirements.asset != info.asset.address {
            tracing::info!(
                asset = %requirements.asset,
                expected = %info.asset.address,
                "payment rejected: asset is not the network's USDC"
            );
            return Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, payer));
        }

        // 5. Deadline far enough ahead to survive the round trip
        if auth.valid_before < now.saturating_add(VALID_BEFORE_MARGIN_SECS) {
            tracing::info!(
                payer = %auth.from,
                valid_before = auth.valid_before,
                now,
                "payment rejected: authorization expired or expiring"
            );
            return Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, payer));
        }

        // 6. Already valid
        if auth.valid_after > now {
            tracing::info!(
                payer = %auth.from,
                valid_after = auth.valid_after,
                now,
                "payment rejected: authorization not yet valid"
            );
            return Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, payer));
        }

        // 7. Balance
        let balance = self.chain.balance_of(requirements.asset, auth.from).await?;
        if balance < requirements.max_amount_required {
            tracing::info!(
                payer = %auth.from,
                balance = %balance,
                required = %requirements.max_amount_required,
                "payment rejected: insufficient balance"
            );
            return Ok(VerifyResponse::invalid(ErrorReason::InsufficientFunds, payer));
        }

        // 8. Amount and recipient
        if auth.value < requirements.max_amount_required {
            tracing::info!(
                payer = %auth.from,
                value = %auth.value,
                required = %requirements.max_amount_required,
                "payment rejected: authorized value below required amount"
            );
            return Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, payer));
        }
        if auth.to != requirements.pay_to {
            tracing::info!(
                payer = %auth.from,
                to = %auth.to,
                pay_to = %requirements.pay_to,
                "payment rejected: recipient mismatch"
            );
            return Ok(VerifyResponse::invalid(ErrorReason::InvalidScheme, payer));
        }

        tracing::info!(
            payer = %auth.from,
            amount = %auth.value,
            network = %self.network,
            nonce = %format!("{:.8}", auth.nonce),
            "payment verification succeeded"
        );
        Ok(VerifyResponse::valid(auth.from))
    }
}

impl<C: ChainClient> SchemeFacilitator for ExactEvmFacilitator<C> {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, X402Error> {
        self.verify_at(payload, requirements, unix_now()?).await
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, X402Error> {
        let auth = payload.authorization();

        // Time may have passed and the balance may have moved since the
        // caller's own verify.
        let check = self.verify(payload, requirements).await?;
        if !check.is_valid {
            let reason = check.invalid_reason.unwrap_or(ErrorReason::InvalidScheme);
            tracing::warn!(
                payer = %auth.from,
                reason = %reason,
                "settlement rejected after re-verification"
            );
            return Ok(SettleResponse::failed(
                reason,
                String::new(),
                payload.network.clone(),
                check.payer_address,
            ));
        }

        // Claimed before submission and never released afterwards: a submit
        // that errors may still have reached the mempool.
        if !self.nonce_store.try_use((auth.from, auth.nonce)) {
            tracing::warn!(
                payer = %auth.from,
                nonce = %format!("{:.8}", auth.nonce),
                "authorization already submitted by this facilitator"
            );
            return Ok(SettleResponse::failed(
                ErrorReason::InvalidScheme,
                String::new(),
                payload.network.clone(),
                Some(auth.from),
            ));
        }

        let receipt = match self
            .chain
            .transfer_with_authorization(requirements.asset, auth, &payload.payload.signature)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!(
                    payer = %auth.from,
                    nonce = %format!("{:.8}", auth.nonce),
                    error = %e,
                    "transferWithAuthorization failed; nonce stays claimed"
                );
                return Err(e);
            }
        };

        let transaction = format!("{}", receipt.transaction);
        if !receipt.success {
            tracing::error!(payer = %auth.from, tx = %transaction, "settlement transaction reverted");
            return Ok(SettleResponse::failed(
                ErrorReason::InvalidScheme,
                transaction,
                payload.network.clone(),
                Some(auth.from),
            ));
        }

        tracing::info!(
            payer = %auth.from,
            amount = %auth.value,
            network = %payload.network,
            tx = %transaction,
            "payment settled successfully"
        );
        Ok(SettleResponse::settled(
            transaction,
            payload.network.clone(),
            auth.from,
        ))
    }
}
