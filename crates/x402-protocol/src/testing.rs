//! In-memory [`ChainClient`] for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use dashmap::DashMap;

use crate::chain::{ChainClient, TransferReceipt};
use crate::payment::ExactEvmAuthorization;
use crate::X402Error;

/// A transfer the mock was asked to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransfer {
    pub asset: Address,
    pub authorization: ExactEvmAuthorization,
    pub signature: Bytes,
    pub transaction: TxHash,
}

/// Scriptable chain: per-owner balances, a fixed asset version, and a switch
/// deciding whether submitted transfers succeed, revert or fail to send.
#[derive(Debug)]
pub struct MockChain {
    version: String,
    balances: DashMap<Address, U256>,
    receipt_success: AtomicBool,
    fail_submit: AtomicBool,
    fail_version: AtomicBool,
    submitted: Mutex<Vec<SubmittedTransfer>>,
    version_calls: AtomicUsize,
    balance_calls: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            version: "2".to_string(),
            balances: DashMap::new(),
            receipt_success: AtomicBool::new(true),
            fail_submit: AtomicBool::new(false),
            fail_version: AtomicBool::new(false),
            submitted: Mutex::new(Vec::new()),
            version_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
        }
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_balance(self, owner: Address, balance: impl Into<U256>) -> Self {
        self.set_balance(owner, balance);
        self
    }

    pub fn set_balance(&self, owner: Address, balance: impl Into<U256>) {
        self.balances.insert(owner, balance.into());
    }

    /// Make subsequent transfers mine with a failed status.
    pub fn revert_transfers(&self, revert: bool) {
        self.receipt_success.store(!revert, Ordering::SeqCst);
    }

    /// Simulate an unreachable RPC: submissions and block queries fail.
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    /// Make the token's `version()` call fail.
    pub fn fail_version_reads(&self, fail: bool) {
        self.fail_version.store(fail, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<SubmittedTransfer> {
        self.submitted
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, X402Error> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(X402Error::ChainError("mock RPC unavailable".to_string()));
        }
        Ok(self.submitted().len() as u64 + 1)
    }

    async fn asset_version(&self, _asset: Address) -> Result<String, X402Error> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_version.load(Ordering::SeqCst) {
            return Err(X402Error::ChainError("version() reverted".to_string()));
        }
        Ok(self.version.clone())
    }

    async fn balance_of(&self, _asset: Address, owner: Address) -> Result<U256, X402Error> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.balances.get(&owner).map(|b| *b).unwrap_or(U256::ZERO))
    }

    async fn transfer_with_authorization(
        &self,
        asset: Address,
        authorization: &ExactEvmAuthorization,
        signature: &Bytes,
    ) -> Result<TransferReceipt, X402Error> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(X402Error::ChainError("mock RPC unavailable".to_string()));
        }

        let transaction = keccak256(authorization.nonce);
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(SubmittedTransfer {
                asset,
                authorization: *authorization,
                signature: signature.clone(),
                transaction,
            });
        }

        let success = self.receipt_success.load(Ordering::SeqCst);
        if success {
            if let Some(mut from) = self.balances.get_mut(&authorization.from) {
                *from = from.saturating_sub(authorization.value);
            }
            *self.balances.entry(authorization.to).or_insert(U256::ZERO) += authorization.value;
        }
        Ok(TransferReceipt {
            transaction,
            success,
        })
    }
}
