//! The assistant's domain handlers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of domain handlers a request can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantDomain {
    /// Invoices, reminders, payments in.
    Invoicing,
    /// Journal entries, receipts, reconciliation.
    Bookkeeping,
    /// VAT, declarations, employer contributions.
    Tax,
    /// Customer records.
    Customers,
    /// Result and balance reports.
    Reporting,
}

impl AssistantDomain {
    /// All domains, in classifier priority order.
    ///
    /// Several domains share keywords (VAT terms appear in both the
    /// bookkeeping and tax vocabularies); when two pattern matches carry
    /// equal confidence, the domain earlier in this list wins. The order
    /// is part of the classifier contract and covered by tests.
    pub const PRIORITY: [AssistantDomain; 5] = [
        AssistantDomain::Invoicing,
        AssistantDomain::Bookkeeping,
        AssistantDomain::Tax,
        AssistantDomain::Customers,
        AssistantDomain::Reporting,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantDomain::Invoicing => "invoicing",
            AssistantDomain::Bookkeeping => "bookkeeping",
            AssistantDomain::Tax => "tax",
            AssistantDomain::Customers => "customers",
            AssistantDomain::Reporting => "reporting",
        }
    }

    /// Parses the stable name back to a domain.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "invoicing" => Some(AssistantDomain::Invoicing),
            "bookkeeping" => Some(AssistantDomain::Bookkeeping),
            "tax" => Some(AssistantDomain::Tax),
            "customers" => Some(AssistantDomain::Customers),
            "reporting" => Some(AssistantDomain::Reporting),
            _ => None,
        }
    }
}

impl fmt::Display for AssistantDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_covers_every_domain_once() {
        let mut seen = std::collections::HashSet::new();
        for domain in AssistantDomain::PRIORITY {
            assert!(seen.insert(domain), "{} listed twice", domain);
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn parse_roundtrips_names() {
        for domain in AssistantDomain::PRIORITY {
            assert_eq!(AssistantDomain::parse(domain.as_str()), Some(domain));
        }
        assert_eq!(AssistantDomain::parse("payroll"), None);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&AssistantDomain::Bookkeeping).unwrap();
        assert_eq!(json, "\"bookkeeping\"");
    }
}
