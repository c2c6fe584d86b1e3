//! Error types for tool registration, execution, and confirmation.

use thiserror::Error;

use crate::domain::foundation::ConfirmationId;

use super::validation::SchemaValidationError;

/// Errors raised at the tool registry boundary.
///
/// `UnknownTool` and `Validation` never escape the registry as `Err` when
/// raised on behalf of the model; they are folded into a failed
/// `AgentToolResult` so the model can see and react to the failure.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool registered under this name.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Arguments did not match the tool's parameter schema.
    #[error("invalid arguments for '{tool}': {source}")]
    Validation {
        /// Tool whose schema was violated.
        tool: String,
        /// Field-level failure detail.
        #[source]
        source: SchemaValidationError,
    },

    /// No pending confirmation exists under this id.
    ///
    /// Also raised when an id was already resolved; a resolve never
    /// silently re-runs or no-ops.
    #[error("confirmation '{0}' not found or already resolved")]
    ConfirmationNotFound(ConfirmationId),

    /// The pending confirmation passed its TTL before being resolved.
    #[error("confirmation '{0}' expired")]
    ConfirmationExpired(ConfirmationId),

    /// The confirmation store or audit log failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<crate::ports::ConfirmationStoreError> for ToolError {
    fn from(err: crate::ports::ConfirmationStoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<crate::ports::AuditLogError> for ToolError {
    fn from(err: crate::ports::AuditLogError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Failure inside a tool handler.
#[derive(Debug, Clone, Error)]
pub enum ToolExecutionError {
    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation would violate a business rule.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected failure in the handler or a collaborator.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolExecutionError {
    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a conflict error.
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    /// Creates an internal error.
    pub fn internal(what: impl Into<String>) -> Self {
        Self::Internal(what.into())
    }
}
