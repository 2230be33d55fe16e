// src/services/credit_store.rs
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::DriveDiagramError;

/// Remaining generation credits per signed-in user.
///
/// A user with no balance on record has zero credits.
#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn credits_remaining(&self, user_id: &str) -> Result<i64, DriveDiagramError>;
}

#[derive(Debug, Default)]
pub struct MemoryCreditStore {
    balances: RwLock<HashMap<String, i64>>,
}

impl MemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credits(mut self, user_id: impl Into<String>, credits: i64) -> Self {
        self.balances.get_mut().insert(user_id.into(), credits);
        self
    }

    pub async fn set_credits(&self, user_id: &str, credits: i64) {
        self.balances.write().await.insert(user_id.to_string(), credits);
    }
}

#[async_trait]
impl CreditStore for MemoryCreditStore {
    async fn credits_remaining(&self, user_id: &str) -> Result<i64, DriveDiagramError> {
        Ok(self.balances.read().await.get(user_id).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_user_has_no_credits() {
        let store = MemoryCreditStore::new();
        assert_eq!(store.credits_remaining("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_balances_are_per_user() {
        let store = MemoryCreditStore::new();
        store.set_credits("user-1", 12).await;
        store.set_credits("user-2", 3).await;
        store.set_credits("user-1", 11).await;

        assert_eq!(store.credits_remaining("user-1").await.unwrap(), 11);
        assert_eq!(store.credits_remaining("user-2").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_seeded_balance() {
        let store = MemoryCreditStore::new().with_credits("user-1", 5);
        assert_eq!(store.credits_remaining("user-1").await.unwrap(), 5);
    }
}
