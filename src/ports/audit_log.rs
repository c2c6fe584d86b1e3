//! Audit Log Port - append-only record of every tool invocation attempt.
//!
//! One record is written per attempt: immediate executions get Success or
//! Error, parked mutating calls get Pending, and a declined confirmation
//! gets Rejected. Records are immutable and outlive the request; the
//! storage collaborator owns them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{Timestamp, UserId};

/// Outcome category of one tool invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The tool ran and succeeded.
    Success,
    /// The tool ran and failed, or its arguments were rejected.
    Error,
    /// A mutating tool was parked behind a confirmation.
    Pending,
    /// The user declined a pending confirmation.
    Rejected,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Tool that was invoked.
    pub tool_name: String,

    /// Arguments the tool was invoked with.
    pub parameters: serde_json::Value,

    /// Result payload, when the tool produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Outcome category.
    pub status: AuditStatus,

    /// Wall-clock execution time; zero for pending/rejected records.
    pub execution_time_ms: u64,

    /// Error detail for Error records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// User the attempt is attributed to.
    pub user_id: UserId,

    /// When the record was written.
    pub timestamp: Timestamp,
}

impl AuditRecord {
    /// Creates a record with the given status and no payload.
    pub fn new(
        tool_name: impl Into<String>,
        parameters: serde_json::Value,
        status: AuditStatus,
        user_id: UserId,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            result: None,
            status,
            execution_time_ms: 0,
            error_message: None,
            user_id,
            timestamp: Timestamp::now(),
        }
    }

    /// Attaches a result payload.
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Records the execution time.
    pub fn with_execution_time_ms(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }
}

/// Port for the append-only audit log.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends one record.
    async fn append(&self, record: AuditRecord) -> Result<(), AuditLogError>;

    /// Lists records for a user, oldest first.
    async fn records_for_user(&self, user_id: &UserId) -> Result<Vec<AuditRecord>, AuditLogError>;
}

/// Audit log failures.
#[derive(Debug, Clone, Error)]
pub enum AuditLogError {
    /// The backing store is unreachable.
    #[error("audit log unavailable: {0}")]
    Unavailable(String),
}
