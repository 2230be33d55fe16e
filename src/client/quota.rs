// src/client/quota.rs
use log::{error, warn};

use super::kv_store::KeyValueStore;

pub const GUEST_ATTEMPT_LIMIT: u32 = 3;

const ATTEMPTS_KEY: &str = "driveDiagramGuestAttempts";

/// Counts successful generations made without a session.
///
/// Storage failures never block the user: an unreadable counter reads as 0
/// and a failed write is only logged.
pub struct GuestQuota<S> {
    store: S,
    limit: u32,
}

impl<S: KeyValueStore> GuestQuota<S> {
    pub fn new(store: S) -> Self {
        Self::with_limit(store, GUEST_ATTEMPT_LIMIT)
    }

    pub fn with_limit(store: S, limit: u32) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn attempts(&self) -> u32 {
        match self.store.get(ATTEMPTS_KEY) {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring malformed guest attempt counter {:?}", raw);
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!("Could not read guest attempt counter: {}", e);
                0
            }
        }
    }

    /// Bumps the counter and returns the new value.
    pub fn increment(&self) -> u32 {
        let next = self.attempts().saturating_add(1);
        if let Err(e) = self.store.set(ATTEMPTS_KEY, &next.to_string()) {
            error!("Could not persist guest attempt counter: {}", e);
        }
        next
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.attempts())
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts() >= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::client::kv_store::MemoryStore;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, ClientError> {
            Err(ClientError::Store("unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), ClientError> {
            Err(ClientError::Store("unavailable".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<(), ClientError> {
            Err(ClientError::Store("unavailable".to_string()))
        }
    }

    #[test]
    fn test_fresh_quota() {
        let quota = GuestQuota::new(MemoryStore::new());
        assert_eq!(quota.attempts(), 0);
        assert_eq!(quota.remaining(), 3);
        assert!(!quota.is_exhausted());
    }

    #[test]
    fn test_exhausts_after_limit() {
        let quota = GuestQuota::new(MemoryStore::new());
        assert_eq!(quota.increment(), 1);
        assert_eq!(quota.increment(), 2);
        assert!(!quota.is_exhausted());
        assert_eq!(quota.increment(), 3);
        assert!(quota.is_exhausted());
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_malformed_counter_reads_as_zero() {
        let store = MemoryStore::new();
        store.set(ATTEMPTS_KEY, "lots").unwrap();
        let quota = GuestQuota::new(store);
        assert_eq!(quota.attempts(), 0);

        let store = MemoryStore::new();
        store.set(ATTEMPTS_KEY, "-2").unwrap();
        assert_eq!(GuestQuota::new(store).attempts(), 0);
    }

    #[test]
    fn test_counter_above_limit_stays_exhausted() {
        let store = MemoryStore::new();
        store.set(ATTEMPTS_KEY, "7").unwrap();
        let quota = GuestQuota::new(store);
        assert!(quota.is_exhausted());
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_unavailable_storage_does_not_block() {
        let quota = GuestQuota::new(BrokenStore);
        assert_eq!(quota.attempts(), 0);
        assert!(!quota.is_exhausted());
        assert_eq!(quota.increment(), 1);
    }
}
