//! Tool invocation outcome value objects.

use serde::{Deserialize, Serialize};

use super::confirmation::PendingConfirmation;

/// Result of a tool invocation as seen by the agent loop.
///
/// Validation and unknown-tool failures are folded into
/// `success == false` so the model can observe and react to them; they
/// never crash the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentToolResult {
    /// Tool that was invoked.
    pub tool_name: String,

    /// Whether the invocation succeeded.
    pub success: bool,

    /// Data returned by the tool (if successful).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentToolResult {
    /// Creates a successful result.
    pub fn ok(tool_name: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failed result.
    pub fn err(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// What `ToolRegistry::execute` hands back to the agent loop.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// The tool ran (or failed) immediately.
    Completed(AgentToolResult),

    /// A mutating tool was parked behind a confirmation.
    Pending(PendingConfirmation),
}

impl ToolOutcome {
    /// Returns the completed result, if any.
    pub fn as_completed(&self) -> Option<&AgentToolResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Pending(_) => None,
        }
    }

    /// Returns the pending confirmation, if any.
    pub fn as_pending(&self) -> Option<&PendingConfirmation> {
        match self {
            Self::Completed(_) => None,
            Self::Pending(confirmation) => Some(confirmation),
        }
    }
}
