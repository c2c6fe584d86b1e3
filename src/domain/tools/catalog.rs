//! Accounting tool catalog.
//!
//! Registers the tools the domain agents may request. Handlers here return
//! canned payloads shaped like the real accounting collaborators; actual
//! accounting correctness is out of scope for this core.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::agent::AgentContext;

use super::definition::{ToolDefinition, ToolHandler};
use super::errors::ToolExecutionError;
use super::registry::ToolRegistry;

/// Registers the full accounting tool set into `registry`.
pub fn register_accounting_tools(registry: &mut ToolRegistry) {
    registry.register(
        ToolDefinition::new(
            "get_invoice_status",
            "Look up the status of one invoice by id",
            json!({
                "type": "object",
                "required": ["invoice_id"],
                "properties": {
                    "invoice_id": { "type": "string", "description": "Invoice number, e.g. F-1001" }
                }
            }),
        ),
        GetInvoiceStatus,
    );

    registry.register(
        ToolDefinition::new(
            "list_unpaid_invoices",
            "List unpaid invoices, optionally only those past due",
            json!({
                "type": "object",
                "properties": {
                    "overdue_only": { "type": "boolean" }
                }
            }),
        ),
        ListUnpaidInvoices,
    );

    registry.register(
        ToolDefinition::new(
            "send_invoice_reminder",
            "Send a payment reminder for an overdue invoice",
            json!({
                "type": "object",
                "required": ["invoice_id"],
                "properties": {
                    "invoice_id": { "type": "string" },
                    "tone": { "type": "string", "enum": ["neutral", "firm"] }
                }
            }),
        )
        .mutating()
        .with_warning("The customer will receive an email"),
        SendInvoiceReminder,
    );

    registry.register(
        ToolDefinition::new(
            "create_invoice",
            "Create a draft invoice for a customer",
            json!({
                "type": "object",
                "required": ["customer_id", "amount"],
                "properties": {
                    "customer_id": { "type": "string" },
                    "amount": { "type": "number", "minimum": 0 },
                    "description": { "type": "string" }
                }
            }),
        )
        .mutating(),
        CreateInvoice,
    );

    registry.register(
        ToolDefinition::new(
            "get_account_balance",
            "Read the balance of one ledger account",
            json!({
                "type": "object",
                "required": ["account"],
                "properties": {
                    "account": { "type": "string", "description": "BAS account number, e.g. 1930" }
                }
            }),
        ),
        GetAccountBalance,
    );

    registry.register(
        ToolDefinition::new(
            "record_journal_entry",
            "Record a manual journal entry in the ledger",
            json!({
                "type": "object",
                "required": ["debit_account", "credit_account", "amount"],
                "properties": {
                    "debit_account": { "type": "string" },
                    "credit_account": { "type": "string" },
                    "amount": { "type": "number", "minimum": 0 },
                    "note": { "type": "string" }
                }
            }),
        )
        .mutating()
        .with_warning("Journal entries affect the closing of the period"),
        RecordJournalEntry,
    );

    registry.register(
        ToolDefinition::new(
            "get_vat_summary",
            "Summarize VAT for a reporting period",
            json!({
                "type": "object",
                "required": ["period"],
                "properties": {
                    "period": { "type": "string", "description": "Period like 2026-Q2" }
                }
            }),
        ),
        GetVatSummary,
    );

    registry.register(
        ToolDefinition::new(
            "get_customer",
            "Look up a customer record",
            json!({
                "type": "object",
                "required": ["customer_id"],
                "properties": {
                    "customer_id": { "type": "string" }
                }
            }),
        ),
        GetCustomer,
    );
}

struct GetInvoiceStatus;

#[async_trait]
impl ToolHandler for GetInvoiceStatus {
    async fn run(
        &self,
        args: Value,
        _context: &AgentContext,
    ) -> Result<Value, ToolExecutionError> {
        let invoice_id = required_str(&args, "invoice_id")?;
        Ok(json!({
            "invoice_id": invoice_id,
            "status": "overdue",
            "days_overdue": 14,
            "amount_sek": 12_500
        }))
    }

    fn summarize(&self, args: &Value) -> String {
        format!("Look up invoice {}", display_str(args, "invoice_id"))
    }
}

struct ListUnpaidInvoices;

#[async_trait]
impl ToolHandler for ListUnpaidInvoices {
    async fn run(
        &self,
        args: Value,
        _context: &AgentContext,
    ) -> Result<Value, ToolExecutionError> {
        let overdue_only = args["overdue_only"].as_bool().unwrap_or(false);
        let mut invoices = vec![json!({"invoice_id": "F-1001", "days_overdue": 14})];
        if !overdue_only {
            invoices.push(json!({"invoice_id": "F-1002", "days_overdue": 0}));
        }
        Ok(json!({ "invoices": invoices }))
    }

    fn summarize(&self, _args: &Value) -> String {
        "List unpaid invoices".to_string()
    }
}

struct SendInvoiceReminder;

#[async_trait]
impl ToolHandler for SendInvoiceReminder {
    async fn run(
        &self,
        args: Value,
        _context: &AgentContext,
    ) -> Result<Value, ToolExecutionError> {
        let invoice_id = required_str(&args, "invoice_id")?;
        Ok(json!({ "invoice_id": invoice_id, "reminder_sent": true }))
    }

    fn summarize(&self, args: &Value) -> String {
        format!(
            "Send a payment reminder for invoice {}",
            display_str(args, "invoice_id")
        )
    }
}

struct CreateInvoice;

#[async_trait]
impl ToolHandler for CreateInvoice {
    async fn run(
        &self,
        args: Value,
        _context: &AgentContext,
    ) -> Result<Value, ToolExecutionError> {
        let customer_id = required_str(&args, "customer_id")?;
        Ok(json!({
            "invoice_id": "F-1099",
            "customer_id": customer_id,
            "state": "draft"
        }))
    }

    fn summarize(&self, args: &Value) -> String {
        format!(
            "Create an invoice of {} SEK for customer {}",
            args["amount"],
            display_str(args, "customer_id")
        )
    }
}

struct GetAccountBalance;

#[async_trait]
impl ToolHandler for GetAccountBalance {
    async fn run(
        &self,
        args: Value,
        _context: &AgentContext,
    ) -> Result<Value, ToolExecutionError> {
        let account = required_str(&args, "account")?;
        Ok(json!({ "account": account, "balance_sek": 84_200 }))
    }

    fn summarize(&self, args: &Value) -> String {
        format!("Read balance of account {}", display_str(args, "account"))
    }
}

struct RecordJournalEntry;

#[async_trait]
impl ToolHandler for RecordJournalEntry {
    async fn run(
        &self,
        args: Value,
        _context: &AgentContext,
    ) -> Result<Value, ToolExecutionError> {
        let debit = required_str(&args, "debit_account")?;
        let credit = required_str(&args, "credit_account")?;
        Ok(json!({
            "entry_id": "V-301",
            "debit_account": debit,
            "credit_account": credit
        }))
    }

    fn summarize(&self, args: &Value) -> String {
        format!(
            "Record {} SEK from {} to {}",
            args["amount"],
            display_str(args, "credit_account"),
            display_str(args, "debit_account")
        )
    }
}

struct GetVatSummary;

#[async_trait]
impl ToolHandler for GetVatSummary {
    async fn run(
        &self,
        args: Value,
        _context: &AgentContext,
    ) -> Result<Value, ToolExecutionError> {
        let period = required_str(&args, "period")?;
        Ok(json!({
            "period": period,
            "outgoing_vat_sek": 31_250,
            "incoming_vat_sek": 11_800
        }))
    }

    fn summarize(&self, args: &Value) -> String {
        format!("Summarize VAT for {}", display_str(args, "period"))
    }
}

struct GetCustomer;

#[async_trait]
impl ToolHandler for GetCustomer {
    async fn run(
        &self,
        args: Value,
        _context: &AgentContext,
    ) -> Result<Value, ToolExecutionError> {
        let customer_id = required_str(&args, "customer_id")?;
        Ok(json!({
            "customer_id": customer_id,
            "name": "Nordiska Verktyg AB",
            "open_invoices": 2
        }))
    }

    fn summarize(&self, args: &Value) -> String {
        format!("Look up customer {}", display_str(args, "customer_id"))
    }
}

fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolExecutionError> {
    args[field]
        .as_str()
        .ok_or_else(|| ToolExecutionError::internal(format!("missing field '{}'", field)))
}

fn display_str(args: &Value, field: &str) -> String {
    args[field].as_str().unwrap_or("?").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryAuditLog, InMemoryConfirmationStore};
    use crate::domain::foundation::{CompanyId, ConversationId, UserId};
    use std::sync::Arc;

    fn catalog_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new(
            Arc::new(InMemoryConfirmationStore::new()),
            Arc::new(InMemoryAuditLog::new()),
            300,
        );
        register_accounting_tools(&mut registry);
        registry
    }

    fn test_context() -> AgentContext {
        AgentContext::new(
            UserId::new("user-1").unwrap(),
            CompanyId::new("acme-ab").unwrap(),
            ConversationId::new(),
        )
    }

    #[test]
    fn catalog_registers_expected_tools() {
        let registry = catalog_registry();
        for name in [
            "get_invoice_status",
            "list_unpaid_invoices",
            "send_invoice_reminder",
            "create_invoice",
            "get_account_balance",
            "record_journal_entry",
            "get_vat_summary",
            "get_customer",
        ] {
            assert!(registry.has_tool(name), "missing tool {}", name);
        }
    }

    #[test]
    fn mutating_tools_are_flagged() {
        let registry = catalog_registry();
        assert!(registry
            .get_definition("send_invoice_reminder")
            .unwrap()
            .is_mutating());
        assert!(registry
            .get_definition("record_journal_entry")
            .unwrap()
            .is_mutating());
        assert!(!registry
            .get_definition("get_invoice_status")
            .unwrap()
            .is_mutating());
    }

    #[tokio::test]
    async fn lookup_returns_invoice_payload() {
        let registry = catalog_registry();
        let outcome = registry
            .execute(
                "get_invoice_status",
                serde_json::json!({"invoice_id": "F-1001"}),
                &test_context(),
            )
            .await
            .unwrap();

        let result = outcome.as_completed().unwrap();
        assert!(result.success);
        assert_eq!(result.result.as_ref().unwrap()["invoice_id"], "F-1001");
    }

    #[tokio::test]
    async fn reminder_is_confirmation_gated() {
        let registry = catalog_registry();
        let outcome = registry
            .execute(
                "send_invoice_reminder",
                serde_json::json!({"invoice_id": "F-1001"}),
                &test_context(),
            )
            .await
            .unwrap();

        assert!(outcome.as_pending().is_some());
    }
}
