//! Domain agent profiles.
//!
//! One profile per domain handler: the system prompt, the model, the tool
//! subset the handler may use, and its loop bound.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::AssistantDomain;

/// Behavior specification for one domain agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    /// Domain this profile serves.
    pub domain: AssistantDomain,
    /// System prompt for the domain handler.
    pub system_prompt: String,
    /// Model id routed through the LLM client.
    pub model: String,
    /// Names of the registry tools this agent may request.
    pub allowed_tools: Vec<String>,
    /// Maximum tool rounds per turn.
    pub max_rounds: usize,
}

impl AgentProfile {
    /// Creates a profile.
    pub fn new(
        domain: AssistantDomain,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
        allowed_tools: Vec<String>,
        max_rounds: usize,
    ) -> Self {
        Self {
            domain,
            system_prompt: system_prompt.into(),
            model: model.into(),
            allowed_tools,
            max_rounds,
        }
    }
}

/// Predefined profiles for the five accounting domains.
pub mod profiles {
    use super::*;

    fn tools(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Invoicing handler profile.
    pub fn invoicing(model: &str) -> AgentProfile {
        AgentProfile::new(
            AssistantDomain::Invoicing,
            "Du är en assistent för fakturahantering. Hjälp användaren med \
             fakturor, påminnelser och betalningar. Använd verktygen för all \
             fakta; gissa aldrig fakturauppgifter.",
            model,
            tools(&[
                "get_invoice_status",
                "list_unpaid_invoices",
                "send_invoice_reminder",
                "create_invoice",
                "get_customer",
            ]),
            5,
        )
    }

    /// Bookkeeping handler profile.
    pub fn bookkeeping(model: &str) -> AgentProfile {
        AgentProfile::new(
            AssistantDomain::Bookkeeping,
            "Du är en bokföringsassistent. Hjälp användaren med verifikationer, \
             konteringar och avstämningar enligt BAS-kontoplanen.",
            model,
            tools(&[
                "get_account_balance",
                "record_journal_entry",
                "get_vat_summary",
            ]),
            5,
        )
    }

    /// Tax handler profile.
    pub fn tax(model: &str) -> AgentProfile {
        AgentProfile::new(
            AssistantDomain::Tax,
            "Du är en assistent för skattefrågor. Hjälp användaren med moms, \
             deklarationer och arbetsgivaravgifter. Hänvisa till Skatteverket \
             för bindande besked.",
            model,
            tools(&["get_vat_summary", "get_account_balance"]),
            5,
        )
    }

    /// Customers handler profile.
    pub fn customers(model: &str) -> AgentProfile {
        AgentProfile::new(
            AssistantDomain::Customers,
            "Du är en assistent för kundregistret. Hjälp användaren att slå upp \
             och förstå kunduppgifter.",
            model,
            tools(&["get_customer", "list_unpaid_invoices"]),
            5,
        )
    }

    /// Reporting handler profile.
    pub fn reporting(model: &str) -> AgentProfile {
        AgentProfile::new(
            AssistantDomain::Reporting,
            "Du är en rapportassistent. Hjälp användaren med resultaträkning, \
             balansräkning och nyckeltal.",
            model,
            tools(&["get_account_balance", "get_vat_summary"]),
            5,
        )
    }

    /// All profiles, one per domain.
    pub fn all(model: &str) -> Vec<AgentProfile> {
        vec![
            invoicing(model),
            bookkeeping(model),
            tax(model),
            customers(model),
            reporting(model),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_domain_has_a_profile() {
        let all = profiles::all("gpt-4o");
        assert_eq!(all.len(), AssistantDomain::PRIORITY.len());
        for domain in AssistantDomain::PRIORITY {
            assert!(all.iter().any(|p| p.domain == domain));
        }
    }

    #[test]
    fn invoicing_profile_allows_reminder_tool() {
        let profile = profiles::invoicing("gpt-4o");
        assert!(profile
            .allowed_tools
            .contains(&"send_invoice_reminder".to_string()));
        assert!(profile.max_rounds > 0);
    }

    #[test]
    fn profiles_scope_tools_per_domain() {
        let tax = profiles::tax("gpt-4o");
        assert!(!tax
            .allowed_tools
            .contains(&"send_invoice_reminder".to_string()));
    }
}
