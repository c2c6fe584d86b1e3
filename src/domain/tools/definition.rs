//! Tool definition - schema and metadata for a registered tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::agent::AgentContext;
use crate::ports::LlmToolDefinition;

use super::errors::ToolExecutionError;

/// Definition of a tool the model may request.
///
/// Contains everything needed to expose the tool to a provider, validate
/// arguments before execution, and decide whether execution requires an
/// explicit confirmation step.
///
/// # Examples
///
/// ```ignore
/// let definition = ToolDefinition::new(
///     "send_invoice_reminder",
///     "Send a payment reminder for an overdue invoice",
///     serde_json::json!({
///         "type": "object",
///         "required": ["invoice_id"],
///         "properties": {
///             "invoice_id": { "type": "string" },
///             "message": { "type": "string" }
///         }
///     }),
/// )
/// .mutating();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name of the tool (e.g. "send_invoice_reminder")
    name: String,

    /// Human-readable description for the model and docs
    description: String,

    /// JSON Schema for the parameters
    parameters_schema: serde_json::Value,

    /// Whether execution changes external state and needs confirmation
    mutating: bool,

    /// Warnings surfaced alongside a confirmation request
    warnings: Vec<String>,
}

impl ToolDefinition {
    /// Creates a new read-only tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            mutating: false,
            warnings: Vec::new(),
        }
    }

    /// Marks the tool as mutating; execution will be gated behind a
    /// confirmation step.
    pub fn mutating(mut self) -> Self {
        self.mutating = true;
        self
    }

    /// Adds a warning shown to the user when confirmation is requested.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Returns the tool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the parameters schema.
    pub fn parameters_schema(&self) -> &serde_json::Value {
        &self.parameters_schema
    }

    /// Returns true if execution requires confirmation.
    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    /// Returns the confirmation warnings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Converts to the neutral definition shape sent to providers.
    pub fn to_llm_definition(&self) -> LlmToolDefinition {
        LlmToolDefinition::new(
            self.name.clone(),
            self.description.clone(),
            self.parameters_schema.clone(),
        )
    }
}

/// Executable behavior behind a tool definition.
///
/// Handlers receive validated arguments and the request context. Mutating
/// handlers are only invoked after an approved confirmation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool and returns its result payload.
    async fn run(
        &self,
        args: serde_json::Value,
        context: &AgentContext,
    ) -> Result<serde_json::Value, ToolExecutionError>;

    /// One-line human summary of what executing with these args would do.
    ///
    /// Shown to the user when a mutating tool requests confirmation.
    fn summarize(&self, args: &serde_json::Value) -> String;
}

/// Shared handle to a tool handler.
pub type SharedToolHandler = Arc<dyn ToolHandler>;
