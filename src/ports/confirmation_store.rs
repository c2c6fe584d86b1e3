//! Confirmation Store Port - holds mutating tool calls awaiting approval.
//!
//! The store is shared by many concurrent requests. Each confirmation id
//! has a single legitimate writer: the resolve caller. `take` removes the
//! entry atomically, so concurrent resolve attempts on the same id are
//! serialized and at most one observes the entry.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{ConfirmationId, Timestamp};
use crate::domain::tools::PendingConfirmation;

/// Port for the pending-confirmation store.
#[async_trait]
pub trait ConfirmationStore: Send + Sync {
    /// Stores a new pending confirmation.
    async fn put(&self, confirmation: PendingConfirmation) -> Result<(), ConfirmationStoreError>;

    /// Atomically removes and returns the confirmation, if present.
    ///
    /// At most one caller can observe a given id; later callers get
    /// `None`. This is the serialization point for concurrent resolves.
    async fn take(
        &self,
        id: ConfirmationId,
    ) -> Result<Option<PendingConfirmation>, ConfirmationStoreError>;

    /// Reads a confirmation without removing it.
    async fn get(
        &self,
        id: ConfirmationId,
    ) -> Result<Option<PendingConfirmation>, ConfirmationStoreError>;

    /// Removes and returns every confirmation past its TTL at `now`.
    async fn expire_due(
        &self,
        now: Timestamp,
    ) -> Result<Vec<PendingConfirmation>, ConfirmationStoreError>;
}

/// Confirmation store failures.
#[derive(Debug, Clone, Error)]
pub enum ConfirmationStoreError {
    /// The backing store is unreachable.
    #[error("confirmation store unavailable: {0}")]
    Unavailable(String),
}
