//! Pending confirmation entity - a mutating tool call awaiting approval.
//!
//! When the model requests a mutating tool, the registry does not run the
//! effect. It parks the call as a `PendingConfirmation` and returns it to
//! the caller; an external presentation layer surfaces it to a human and
//! invokes `resolve(confirmation_id, approve)` on the registry.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConfirmationId, Timestamp, UserId};

/// A mutating tool call parked until an explicit external approval.
///
/// # Lifecycle
///
/// 1. Registry creates the confirmation instead of running the effect
/// 2. The boundary layer shows summary + warnings to a human
/// 3. `resolve(id, true)` runs the original call exactly once
/// 4. `resolve(id, false)` discards it
/// 5. Unresolved entries past their TTL are discarded on sweep or on the
///    next resolve attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// Unique identifier; exactly one resolve may succeed per id.
    confirmation_id: ConfirmationId,

    /// Tool whose execution is parked.
    tool_name: String,

    /// Validated arguments the tool will run with on approval.
    args: serde_json::Value,

    /// One-line human summary of the pending effect.
    summary: String,

    /// Warnings the user should see before approving.
    warnings: Vec<String>,

    /// User the effect will be attributed to.
    requested_by: UserId,

    /// When the confirmation was created.
    created_at: Timestamp,

    /// Seconds after `created_at` when the confirmation expires.
    ttl_secs: u64,
}

impl PendingConfirmation {
    /// Creates a new pending confirmation with a fresh id.
    pub fn new(
        tool_name: impl Into<String>,
        args: serde_json::Value,
        summary: impl Into<String>,
        warnings: Vec<String>,
        requested_by: UserId,
        ttl_secs: u64,
    ) -> Self {
        Self {
            confirmation_id: ConfirmationId::new(),
            tool_name: tool_name.into(),
            args,
            summary: summary.into(),
            warnings,
            requested_by,
            created_at: Timestamp::now(),
            ttl_secs,
        }
    }

    /// Returns the confirmation id.
    pub fn confirmation_id(&self) -> ConfirmationId {
        self.confirmation_id
    }

    /// Returns the parked tool name.
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the parked arguments.
    pub fn args(&self) -> &serde_json::Value {
        &self.args
    }

    /// Returns the human summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Returns the warnings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the requesting user.
    pub fn requested_by(&self) -> &UserId {
        &self.requested_by
    }

    /// Returns when the confirmation was created.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns when the confirmation expires.
    pub fn expires_at(&self) -> Timestamp {
        self.created_at.plus_secs(self.ttl_secs)
    }

    /// Checks whether the confirmation has passed its TTL at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now.is_after(&self.expires_at())
    }
}
