use std::time::Instant;

use alloy::primitives::{Address, B256};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Authorization nonces are scoped to the payer, as in EIP-3009.
pub type NonceKey = (Address, B256);

/// Records authorizations this process has already tried to settle.
///
/// Implementations must be thread-safe. The token contract stays the
/// authoritative replay guard; this store only keeps a second submission of
/// the same authorization from ever reaching the chain.
pub trait NonceStore: Send + Sync {
    fn is_used(&self, key: &NonceKey) -> bool;

    /// Atomically claim `key`. Returns `false` if it was already claimed.
    fn try_use(&self, key: NonceKey) -> bool;

    /// Drop entries older than `max_age_secs`. Returns the number removed.
    fn purge_expired(&self, max_age_secs: u64) -> usize;
}

/// In-memory nonce store backed by DashMap. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    nonces: DashMap<NonceKey, Instant>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn is_used(&self, key: &NonceKey) -> bool {
        self.nonces.contains_key(key)
    }

    fn try_use(&self, key: NonceKey) -> bool {
        match self.nonces.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(Instant::now());
                true
            }
        }
    }

    fn purge_expired(&self, max_age_secs: u64) -> usize {
        let before = self.nonces.len();
        self.nonces
            .retain(|_, claimed| claimed.elapsed().as_secs() < max_age_secs);
        // Concurrent claims can make the map grow during retain.
        before.saturating_sub(self.nonces.len())
    }
}
