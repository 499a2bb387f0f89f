//! On-chain access needed by the engine: asset metadata and balance reads,
//! and submission of EIP-3009 `transferWithAuthorization` transactions.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::sol;
use tokio::sync::Mutex;

use crate::payment::ExactEvmAuthorization;
use crate::X402Error;

sol! {
    /// The subset of a USDC-style token (ERC-20 + ERC-3009) the engine calls.
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEIP3009 {
        function version() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external;
    }
}

/// Outcome of a mined `transferWithAuthorization` transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transaction: TxHash,
    /// `false` when the transaction was mined but reverted.
    pub success: bool,
}

/// Chain operations used by verification and settlement.
pub trait ChainClient: Send + Sync {
    /// Latest block number; used as an RPC liveness probe.
    fn block_number(&self) -> impl std::future::Future<Output = Result<u64, X402Error>> + Send;

    /// The token contract's EIP-712 domain `version()`.
    fn asset_version(
        &self,
        asset: Address,
    ) -> impl std::future::Future<Output = Result<String, X402Error>> + Send;

    /// Token balance of `owner`.
    fn balance_of(
        &self,
        asset: Address,
        owner: Address,
    ) -> impl std::future::Future<Output = Result<U256, X402Error>> + Send;

    /// Submit `transferWithAuthorization` and wait for its receipt.
    ///
    /// Waiting has no timeout here; callers impose their own deadline.
    fn transfer_with_authorization(
        &self,
        asset: Address,
        authorization: &ExactEvmAuthorization,
        signature: &Bytes,
    ) -> impl std::future::Future<Output = Result<TransferReceipt, X402Error>> + Send;
}

impl<T: ChainClient> ChainClient for std::sync::Arc<T> {
    async fn block_number(&self) -> Result<u64, X402Error> {
        (**self).block_number().await
    }

    async fn asset_version(&self, asset: Address) -> Result<String, X402Error> {
        (**self).asset_version(asset).await
    }

    async fn balance_of(&self, asset: Address, owner: Address) -> Result<U256, X402Error> {
        (**self).balance_of(asset, owner).await
    }

    async fn transfer_with_authorization(
        &self,
        asset: Address,
        authorization: &ExactEvmAuthorization,
        signature: &Bytes,
    ) -> Result<TransferReceipt, X402Error> {
        (**self)
            .transfer_with_authorization(asset, authorization, signature)
            .await
    }
}

/// [`ChainClient`] over an alloy provider.
///
/// The provider should carry the facilitator's wallet when used for
/// settlement. Submissions go through an async mutex held only across
/// `send()`, so concurrent settles are assigned sequential account nonces
/// while their receipts are awaited in parallel.
pub struct EvmChain<P> {
    provider: P,
    submit_lock: Mutex<()>,
}

impl<P> EvmChain<P> {
    /// Bound on how long one submission may hold the submit lock.
    const SEND_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(provider: P) -> Self {
        Self {
            provider,
            submit_lock: Mutex::new(()),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> ChainClient for EvmChain<P>
where
    P: Provider + Send + Sync,
{
    async fn block_number(&self) -> Result<u64, X402Error> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| X402Error::ChainError(format!("health check failed: {e}")))
    }

    async fn asset_version(&self, asset: Address) -> Result<String, X402Error> {
        IEIP3009::new(asset, &self.provider)
            .version()
            .call()
            .await
            .map_err(|e| X402Error::ChainError(format!("version() failed: {e}")))
    }

    async fn balance_of(&self, asset: Address, owner: Address) -> Result<U256, X402Error> {
        IEIP3009::new(asset, &self.provider)
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| X402Error::ChainError(format!("balanceOf failed: {e}")))
    }

    async fn transfer_with_authorization(
        &self,
        asset: Address,
        authorization: &ExactEvmAuthorization,
        signature: &Bytes,
    ) -> Result<TransferReceipt, X402Error> {
        let contract = IEIP3009::new(asset, &self.provider);
        let call = contract.transferWithAuthorization(
            authorization.from,
            authorization.to,
            authorization.value,
            U256::from(authorization.valid_after),
            U256::from(authorization.valid_before),
            authorization.nonce,
            signature.clone(),
        );

        let pending = {
            let _guard = self.submit_lock.lock().await;
            tokio::time::timeout(Self::SEND_TIMEOUT, call.send())
                .await
                .map_err(|_| {
                    X402Error::ChainError(
                        "transferWithAuthorization send timed out after 30s".to_string(),
                    )
                })?
                .map_err(|e| {
                    X402Error::ChainError(format!("transferWithAuthorization send failed: {e}"))
                })?
        };

        let transaction = *pending.tx_hash();
        tracing::debug!(tx = %transaction, "transferWithAuthorization submitted");

        let receipt = pending.get_receipt().await.map_err(|e| {
            X402Error::ChainError(format!(
                "transferWithAuthorization receipt failed for {transaction}: {e}"
            ))
        })?;

        Ok(TransferReceipt {
            transaction: receipt.transaction_hash,
            success: receipt.status(),
        })
    }
}
