//! In-memory audit log.
//!
//! Append-only vector behind an async mutex; injected, never global.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::foundation::UserId;
use crate::ports::{AuditLog, AuditLogError, AuditRecord};

/// In-memory implementation of [`AuditLog`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every record. Test isolation helper.
    pub async fn reset(&self) {
        self.records.lock().await.clear();
    }

    /// Returns a snapshot of all records in append order.
    pub async fn all(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Number of records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Returns true if the log holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditLogError> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn records_for_user(&self, user_id: &UserId) -> Result<Vec<AuditRecord>, AuditLogError> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect())
    }
}
