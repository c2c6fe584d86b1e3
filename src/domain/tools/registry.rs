//! Tool Registry - catalog and execution gate for all registered tools.
//!
//! The registry validates arguments, executes read-only tools immediately,
//! and parks mutating tools behind a confirmation step. Every attempt
//! leaves an audit record.
//!
//! State machine per invocation:
//! `Requested → (mutating) Pending → {Approved→Executed | Rejected→Discarded
//! | Expired→Discarded}`; `Requested → (non-mutating) Executed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::domain::agent::AgentContext;
use crate::domain::foundation::{ConfirmationId, Timestamp};
use crate::ports::{
    AuditLog, AuditRecord, AuditStatus, ConfirmationStore, LlmToolDefinition,
};

use super::confirmation::PendingConfirmation;
use super::definition::{SharedToolHandler, ToolDefinition, ToolHandler};
use super::errors::ToolError;
use super::outcome::{AgentToolResult, ToolOutcome};
use super::validation::validate_args;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: SharedToolHandler,
}

/// Catalog of named, schema-validated tools with a confirmation gate for
/// mutating operations.
///
/// Shared state (confirmation store, audit log) is constructor-injected;
/// the registry itself is immutable after registration and safe to share
/// behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    confirmations: Arc<dyn ConfirmationStore>,
    audit: Arc<dyn AuditLog>,
    confirmation_ttl_secs: u64,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new(
        confirmations: Arc<dyn ConfirmationStore>,
        audit: Arc<dyn AuditLog>,
        confirmation_ttl_secs: u64,
    ) -> Self {
        Self {
            tools: HashMap::new(),
            confirmations,
            audit,
            confirmation_ttl_secs,
        }
    }

    /// Registers a tool. Definitions are immutable and registered once;
    /// re-registering a name replaces the previous entry.
    pub fn register(&mut self, definition: ToolDefinition, handler: impl ToolHandler + 'static) {
        debug_assert!(
            !self.tools.contains_key(definition.name()),
            "tool registered twice"
        );
        self.tools.insert(
            definition.name().to_string(),
            RegisteredTool {
                definition,
                handler: Arc::new(handler),
            },
        );
    }

    /// Checks if a tool is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Gets a tool definition by name.
    pub fn get_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    /// Returns all registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Neutral definitions for the named subset, in the order given.
    ///
    /// Unknown names are skipped; domain profiles list only tools they
    /// registered.
    pub fn llm_definitions_for(&self, names: &[String]) -> Vec<LlmToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition.to_llm_definition())
            .collect()
    }

    /// Executes a tool on behalf of the model.
    ///
    /// Unknown-tool and validation failures come back as a failed
    /// [`AgentToolResult`], never as `Err`; the model sees the failure
    /// and can react. `Err` is reserved for storage failures.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
        context: &AgentContext,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model requested unknown tool");
            let record = AuditRecord::new(
                name,
                args,
                AuditStatus::Error,
                context.user_id.clone(),
            )
            .with_error(ToolError::UnknownTool(name.to_string()).to_string());
            self.audit.append(record).await?;
            return Ok(ToolOutcome::Completed(AgentToolResult::err(
                name,
                format!("unknown tool '{}'", name),
            )));
        };

        if let Err(violation) = validate_args(tool.definition.parameters_schema(), &args) {
            debug!(tool = name, %violation, "tool arguments failed validation");
            let record = AuditRecord::new(
                name,
                args,
                AuditStatus::Error,
                context.user_id.clone(),
            )
            .with_error(violation.to_string());
            self.audit.append(record).await?;
            return Ok(ToolOutcome::Completed(AgentToolResult::err(
                name,
                violation.to_string(),
            )));
        }

        if tool.definition.is_mutating() {
            let confirmation = PendingConfirmation::new(
                name,
                args.clone(),
                tool.handler.summarize(&args),
                tool.definition.warnings().to_vec(),
                context.user_id.clone(),
                self.confirmation_ttl_secs,
            );
            debug!(
                tool = name,
                confirmation_id = %confirmation.confirmation_id(),
                "mutating tool parked for confirmation"
            );

            self.confirmations.put(confirmation.clone()).await?;
            let record = AuditRecord::new(
                name,
                args,
                AuditStatus::Pending,
                context.user_id.clone(),
            );
            self.audit.append(record).await?;

            return Ok(ToolOutcome::Pending(confirmation));
        }

        Ok(ToolOutcome::Completed(
            self.run_handler(name, &tool.handler, args, context).await?,
        ))
    }

    /// Resolves a pending confirmation.
    ///
    /// Exactly one resolve can succeed per id: the store removes the
    /// entry atomically, so a second resolve fails with
    /// [`ToolError::ConfirmationNotFound`] and the effect never re-runs.
    pub async fn resolve(
        &self,
        id: ConfirmationId,
        approve: bool,
        context: &AgentContext,
    ) -> Result<AgentToolResult, ToolError> {
        let Some(confirmation) = self.confirmations.take(id).await? else {
            return Err(ToolError::ConfirmationNotFound(id));
        };

        if confirmation.is_expired_at(Timestamp::now()) {
            debug!(confirmation_id = %id, "confirmation expired before resolve");
            return Err(ToolError::ConfirmationExpired(id));
        }

        let tool_name = confirmation.tool_name().to_string();
        let args = confirmation.args().clone();

        if !approve {
            debug!(confirmation_id = %id, tool = %tool_name, "confirmation rejected");
            let record = AuditRecord::new(
                tool_name.clone(),
                args,
                AuditStatus::Rejected,
                context.user_id.clone(),
            );
            self.audit.append(record).await?;
            return Ok(AgentToolResult::err(tool_name, "rejected by user"));
        }

        let tool = self
            .tools
            .get(&tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.clone()))?;

        self.run_handler(&tool_name, &tool.handler, args, context)
            .await
    }

    /// Runs a handler and appends the Success/Error audit record.
    async fn run_handler(
        &self,
        name: &str,
        handler: &SharedToolHandler,
        args: serde_json::Value,
        context: &AgentContext,
    ) -> Result<AgentToolResult, ToolError> {
        let started = Instant::now();
        let outcome = handler.run(args.clone(), context).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                debug!(tool = name, elapsed_ms, "tool executed");
                let record = AuditRecord::new(
                    name,
                    args,
                    AuditStatus::Success,
                    context.user_id.clone(),
                )
                .with_result(result.clone())
                .with_execution_time_ms(elapsed_ms);
                self.audit.append(record).await?;
                Ok(AgentToolResult::ok(name, result))
            }
            Err(failure) => {
                warn!(tool = name, %failure, "tool execution failed");
                let record = AuditRecord::new(
                    name,
                    args,
                    AuditStatus::Error,
                    context.user_id.clone(),
                )
                .with_error(failure.to_string())
                .with_execution_time_ms(elapsed_ms);
                self.audit.append(record).await?;
                Ok(AgentToolResult::err(name, failure.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryAuditLog, InMemoryConfirmationStore};
    use crate::domain::foundation::{CompanyId, ConversationId, UserId};
    use crate::domain::tools::errors::ToolExecutionError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for CountingHandler {
        async fn run(
            &self,
            _args: serde_json::Value,
            _context: &AgentContext,
        ) -> Result<serde_json::Value, ToolExecutionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"sent": true}))
        }

        fn summarize(&self, args: &serde_json::Value) -> String {
            format!("Send a reminder for {}", args["invoice_id"])
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ToolHandler for FailingHandler {
        async fn run(
            &self,
            _args: serde_json::Value,
            _context: &AgentContext,
        ) -> Result<serde_json::Value, ToolExecutionError> {
            Err(ToolExecutionError::not_found("invoice F-9999"))
        }

        fn summarize(&self, _args: &serde_json::Value) -> String {
            "Look up an invoice".to_string()
        }
    }

    fn reminder_definition() -> ToolDefinition {
        ToolDefinition::new(
            "send_invoice_reminder",
            "Send a payment reminder",
            json!({
                "type": "object",
                "required": ["invoice_id"],
                "properties": { "invoice_id": { "type": "string" } }
            }),
        )
        .mutating()
        .with_warning("The customer will receive an email")
    }

    fn lookup_definition() -> ToolDefinition {
        ToolDefinition::new(
            "get_invoice_status",
            "Look up an invoice",
            json!({
                "type": "object",
                "required": ["invoice_id"],
                "properties": { "invoice_id": { "type": "string" } }
            }),
        )
    }

    fn test_context() -> AgentContext {
        AgentContext::new(
            UserId::new("user-1").unwrap(),
            CompanyId::new("acme-ab").unwrap(),
            ConversationId::new(),
        )
    }

    struct Fixture {
        registry: ToolRegistry,
        audit: InMemoryAuditLog,
        store: InMemoryConfirmationStore,
        runs: Arc<AtomicUsize>,
    }

    fn fixture(ttl_secs: u64) -> Fixture {
        let audit = InMemoryAuditLog::new();
        let store = InMemoryConfirmationStore::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let mut registry = ToolRegistry::new(
            Arc::new(store.clone()),
            Arc::new(audit.clone()),
            ttl_secs,
        );
        registry.register(reminder_definition(), CountingHandler { runs: runs.clone() });
        registry.register(
            lookup_definition(),
            CountingHandler { runs: Arc::new(AtomicUsize::new(0)) },
        );

        Fixture {
            registry,
            audit,
            store,
            runs,
        }
    }

    #[tokio::test]
    async fn unknown_tool_returns_failed_result_not_err() {
        let f = fixture(300);
        let outcome = f
            .registry
            .execute("frobnicate", json!({}), &test_context())
            .await
            .unwrap();

        let result = outcome.as_completed().unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("unknown tool"));

        let records = f.audit.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Error);
    }

    #[tokio::test]
    async fn invalid_args_return_failed_result_not_err() {
        let f = fixture(300);
        let outcome = f
            .registry
            .execute("get_invoice_status", json!({"wrong": 1}), &test_context())
            .await
            .unwrap();

        let result = outcome.as_completed().unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("invoice_id"));
    }

    #[tokio::test]
    async fn non_mutating_tool_runs_immediately() {
        let f = fixture(300);
        let outcome = f
            .registry
            .execute("get_invoice_status", json!({"invoice_id": "F-1"}), &test_context())
            .await
            .unwrap();

        assert!(outcome.as_completed().unwrap().success);
        assert!(f.store.is_empty().await);

        let records = f.audit.all().await;
        assert_eq!(records[0].status, AuditStatus::Success);
    }

    #[tokio::test]
    async fn mutating_tool_parks_without_side_effect() {
        let f = fixture(300);
        let outcome = f
            .registry
            .execute(
                "send_invoice_reminder",
                json!({"invoice_id": "F-1001"}),
                &test_context(),
            )
            .await
            .unwrap();

        let confirmation = outcome.as_pending().unwrap();
        assert_eq!(confirmation.tool_name(), "send_invoice_reminder");
        assert!(confirmation.summary().contains("F-1001"));
        assert_eq!(confirmation.warnings().len(), 1);

        // Effect must not have run.
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.len().await, 1);

        let records = f.audit.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Pending);
    }

    #[tokio::test]
    async fn approve_runs_effect_exactly_once() {
        let f = fixture(300);
        let context = test_context();
        let outcome = f
            .registry
            .execute(
                "send_invoice_reminder",
                json!({"invoice_id": "F-1001"}),
                &context,
            )
            .await
            .unwrap();
        let id = outcome.as_pending().unwrap().confirmation_id();

        let result = f.registry.resolve(id, true, &context).await.unwrap();
        assert!(result.success);
        assert_eq!(f.runs.load(Ordering::SeqCst), 1);

        // Second resolve fails loudly and never re-executes.
        let second = f.registry.resolve(id, true, &context).await;
        assert!(matches!(second, Err(ToolError::ConfirmationNotFound(_))));
        assert_eq!(f.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reject_discards_with_rejected_audit() {
        let f = fixture(300);
        let context = test_context();
        let outcome = f
            .registry
            .execute(
                "send_invoice_reminder",
                json!({"invoice_id": "F-1001"}),
                &context,
            )
            .await
            .unwrap();
        let id = outcome.as_pending().unwrap().confirmation_id();

        let result = f.registry.resolve(id, false, &context).await.unwrap();
        assert!(!result.success);
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
        assert!(f.store.is_empty().await);

        let records = f.audit.all().await;
        assert_eq!(records.last().unwrap().status, AuditStatus::Rejected);
    }

    #[tokio::test]
    async fn expired_confirmation_fails_and_discards() {
        let f = fixture(0);
        let context = test_context();
        let outcome = f
            .registry
            .execute(
                "send_invoice_reminder",
                json!({"invoice_id": "F-1001"}),
                &context,
            )
            .await
            .unwrap();
        let id = outcome.as_pending().unwrap().confirmation_id();

        // TTL of zero: anything later than creation is expired.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let result = f.registry.resolve(id, true, &context).await;
        assert!(matches!(result, Err(ToolError::ConfirmationExpired(_))));
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn failing_handler_audits_error() {
        let audit = InMemoryAuditLog::new();
        let store = InMemoryConfirmationStore::new();
        let mut registry = ToolRegistry::new(
            Arc::new(store),
            Arc::new(audit.clone()),
            300,
        );
        registry.register(lookup_definition(), FailingHandler);

        let outcome = registry
            .execute("get_invoice_status", json!({"invoice_id": "F-9999"}), &test_context())
            .await
            .unwrap();

        let result = outcome.as_completed().unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("not found"));

        let records = audit.all().await;
        assert_eq!(records[0].status, AuditStatus::Error);
    }

    #[tokio::test]
    async fn llm_definitions_for_returns_subset_in_order() {
        let f = fixture(300);
        let defs = f.registry.llm_definitions_for(&[
            "get_invoice_status".to_string(),
            "send_invoice_reminder".to_string(),
            "missing_tool".to_string(),
        ]);

        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "get_invoice_status");
        assert_eq!(defs[1].name, "send_invoice_reminder");
    }
}
