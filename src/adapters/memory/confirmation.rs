//! In-memory confirmation store.
//!
//! Process-scoped state with explicit construction and reset; injected
//! where needed rather than referenced as a global. Suitable for tests
//! and single-process deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::foundation::{ConfirmationId, Timestamp};
use crate::domain::tools::PendingConfirmation;
use crate::ports::{ConfirmationStore, ConfirmationStoreError};

/// In-memory implementation of [`ConfirmationStore`].
///
/// A single async mutex guards the map, so `take` is atomic: concurrent
/// resolve attempts on the same id serialize and at most one observes the
/// entry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfirmationStore {
    entries: Arc<Mutex<HashMap<ConfirmationId, PendingConfirmation>>>,
}

impl InMemoryConfirmationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every entry. Test isolation helper.
    pub async fn reset(&self) {
        self.entries.lock().await.clear();
    }

    /// Number of pending entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns true if no entries are pending.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl ConfirmationStore for InMemoryConfirmationStore {
    async fn put(&self, confirmation: PendingConfirmation) -> Result<(), ConfirmationStoreError> {
        self.entries
            .lock()
            .await
            .insert(confirmation.confirmation_id(), confirmation);
        Ok(())
    }

    async fn take(
        &self,
        id: ConfirmationId,
    ) -> Result<Option<PendingConfirmation>, ConfirmationStoreError> {
        Ok(self.entries.lock().await.remove(&id))
    }

    async fn get(
        &self,
        id: ConfirmationId,
    ) -> Result<Option<PendingConfirmation>, ConfirmationStoreError> {
        Ok(self.entries.lock().await.get(&id).cloned())
    }

    async fn expire_due(
        &self,
        now: Timestamp,
    ) -> Result<Vec<PendingConfirmation>, ConfirmationStoreError> {
        let mut entries = self.entries.lock().await;
        let due: Vec<ConfirmationId> = entries
            .iter()
            .filter(|(_, c)| c.is_expired_at(now))
            .map(|(id, _)| *id)
            .collect();

        Ok(due.into_iter().filter_map(|id| entries.remove(&id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use serde_json::json;

    fn sample(ttl_secs: u64) -> PendingConfirmation {
        PendingConfirmation::new(
            "send_invoice_reminder",
            json!({"invoice_id": "F-1"}),
            "Send a reminder",
            vec![],
            UserId::new("user-1").unwrap(),
            ttl_secs,
        )
    }

    #[tokio::test]
    async fn put_then_take_returns_entry() {
        let store = InMemoryConfirmationStore::new();
        let confirmation = sample(300);
        let id = confirmation.confirmation_id();

        store.put(confirmation).await.unwrap();
        assert!(store.take(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn take_is_exactly_once() {
        let store = InMemoryConfirmationStore::new();
        let confirmation = sample(300);
        let id = confirmation.confirmation_id();
        store.put(confirmation).await.unwrap();

        assert!(store.take(id).await.unwrap().is_some());
        assert!(store.take(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_takes_yield_one_winner() {
        let store = InMemoryConfirmationStore::new();
        let confirmation = sample(300);
        let id = confirmation.confirmation_id();
        store.put(confirmation).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.take(id).await.unwrap() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn get_does_not_remove() {
        let store = InMemoryConfirmationStore::new();
        let confirmation = sample(300);
        let id = confirmation.confirmation_id();
        store.put(confirmation).await.unwrap();

        assert!(store.get(id).await.unwrap().is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn expire_due_removes_only_expired() {
        let store = InMemoryConfirmationStore::new();
        let fresh = sample(600);
        let stale = sample(60);
        let stale_id = stale.confirmation_id();
        store.put(fresh).await.unwrap();
        store.put(stale).await.unwrap();

        let later = Timestamp::now().plus_secs(120);
        let expired = store.expire_due(later).await.unwrap();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].confirmation_id(), stale_id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn reset_clears_entries() {
        let store = InMemoryConfirmationStore::new();
        store.put(sample(300)).await.unwrap();
        store.reset().await;
        assert!(store.is_empty().await);
    }
}
