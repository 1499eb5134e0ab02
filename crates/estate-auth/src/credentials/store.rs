//! Credential store abstraction.
//!
//! The store is the only owner of the current [`CredentialPair`]; the rest of
//! the pipeline reads snapshots and replaces the pair as a whole.

use parking_lot::RwLock;

use super::types::CredentialPair;

pub trait CredentialStore: Send + Sync {
    /// Snapshot of the current pair, if any.
    fn get(&self) -> Option<CredentialPair>;

    /// Replace both tokens at once.
    fn set(&self, pair: CredentialPair);

    /// Remove both tokens. Calling it on an empty store is a no-op.
    fn clear(&self);

    /// Remove the pair only if it still carries `refresh_token`.
    ///
    /// Returns whether the pair was removed.
    fn clear_matching(&self, refresh_token: &str) -> bool;

    /// Current access token, if any.
    fn access_token(&self) -> Option<String> {
        self.get().map(|pair| pair.access_token)
    }

    /// Current refresh token, if any.
    fn refresh_token(&self) -> Option<String> {
        self.get().map(|pair| pair.refresh_token)
    }
}

/// Store that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    pair: RwLock<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding a pair.
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<CredentialPair> {
        self.pair.read().clone()
    }

    fn set(&self, pair: CredentialPair) {
        *self.pair.write() = Some(pair);
    }

    fn clear(&self) {
        self.pair.write().take();
    }

    fn clear_matching(&self, refresh_token: &str) -> bool {
        let mut pair = self.pair.write();
        if pair
            .as_ref()
            .is_some_and(|current| current.refresh_token == refresh_token)
        {
            *pair = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_set_get_clear() {
        let store = MemoryCredentialStore::new();
        assert!(store.get().is_none());

        store.set(CredentialPair::new("T1", "R1"));
        assert_eq!(store.get(), Some(CredentialPair::new("T1", "R1")));
        assert_eq!(store.access_token().as_deref(), Some("T1"));
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));

        store.clear();
        assert!(store.get().is_none());

        // Idempotent
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_clear_matching_keeps_replaced_pair() {
        let store = MemoryCredentialStore::with_pair(CredentialPair::new("T2", "R2"));

        assert!(!store.clear_matching("R1"));
        assert_eq!(store.get(), Some(CredentialPair::new("T2", "R2")));

        assert!(store.clear_matching("R2"));
        assert!(store.get().is_none());
        assert!(!store.clear_matching("R2"));
    }

    #[test]
    fn test_concurrent_readers_never_see_mixed_pair() {
        let store = MemoryCredentialStore::with_pair(CredentialPair::new("T1", "R1"));
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while !done.load(Ordering::Relaxed) {
                        let pair = store.get().expect("pair is never cleared here");
                        let consistent = (pair.access_token == "T1" && pair.refresh_token == "R1")
                            || (pair.access_token == "T2" && pair.refresh_token == "R2");
                        assert!(consistent, "observed mixed pair");
                    }
                });
            }

            for i in 0..10_000 {
                if i % 2 == 0 {
                    store.set(CredentialPair::new("T2", "R2"));
                } else {
                    store.set(CredentialPair::new("T1", "R1"));
                }
            }
            done.store(true, Ordering::Relaxed);
        });
    }
}
