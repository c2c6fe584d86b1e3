//! Pattern tier - keyword/regex classification with an explicit priority
//! table.
//!
//! Several domains share vocabulary: "moms" belongs to both the
//! bookkeeping and tax rule sets, "kund" appears inside "kundfaktura".
//! Resolution is therefore not left to declaration order: rules are
//! evaluated per domain in [`AssistantDomain::PRIORITY`] order and the
//! earlier domain wins when two matches carry equal confidence. A higher
//! confidence always beats priority.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::agent::AgentContext;
use crate::domain::foundation::AssistantDomain;

use super::classifier::{Classifier, ClassifierError};
use super::types::{Intent, IntentEntity};

struct PatternRule {
    pattern: Regex,
    category: &'static str,
    confidence: f32,
}

impl PatternRule {
    fn new(pattern: &str, category: &'static str, confidence: f32) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("invalid intent pattern"),
            category,
            confidence,
        }
    }
}

struct DomainRules {
    domain: AssistantDomain,
    rules: Vec<PatternRule>,
}

/// The rule table, one entry per domain, in priority order.
static RULE_TABLE: Lazy<Vec<DomainRules>> = Lazy::new(|| {
    vec![
        DomainRules {
            domain: AssistantDomain::Invoicing,
            rules: vec![
                PatternRule::new(r"(?i)påminnelse", "send_reminder", 0.95),
                PatternRule::new(r"(?i)skapa\s+(en\s+)?faktura", "create_invoice", 0.95),
                PatternRule::new(r"(?i)fakturera", "create_invoice", 0.9),
                PatternRule::new(r"(?i)obetalda?\s+fakturor", "list_unpaid", 0.9),
                PatternRule::new(r"(?i)faktur", "invoice_question", 0.8),
                PatternRule::new(r"(?i)förfallen|förfallit", "list_unpaid", 0.8),
            ],
        },
        DomainRules {
            domain: AssistantDomain::Bookkeeping,
            rules: vec![
                PatternRule::new(r"(?i)bokför", "record_entry", 0.95),
                PatternRule::new(r"(?i)verifikation", "record_entry", 0.9),
                PatternRule::new(r"(?i)kvitto", "record_receipt", 0.85),
                PatternRule::new(r"(?i)kontering|avstämning", "reconcile", 0.85),
                PatternRule::new(r"(?i)moms", "vat_question", 0.7),
                PatternRule::new(r"(?i)saldo|kontobalans", "account_balance", 0.8),
            ],
        },
        DomainRules {
            domain: AssistantDomain::Tax,
            rules: vec![
                PatternRule::new(r"(?i)momsdeklaration", "vat_declaration", 0.95),
                PatternRule::new(r"(?i)deklaration", "declaration", 0.9),
                PatternRule::new(r"(?i)arbetsgivaravgift", "employer_contribution", 0.9),
                PatternRule::new(r"(?i)skatt", "tax_question", 0.85),
                PatternRule::new(r"(?i)moms", "vat_question", 0.7),
            ],
        },
        DomainRules {
            domain: AssistantDomain::Customers,
            rules: vec![
                PatternRule::new(r"(?i)ny\s+kund", "create_customer", 0.9),
                PatternRule::new(r"(?i)kunduppgifter", "customer_details", 0.9),
                PatternRule::new(r"(?i)kund", "customer_question", 0.7),
            ],
        },
        DomainRules {
            domain: AssistantDomain::Reporting,
            rules: vec![
                PatternRule::new(r"(?i)resultaträkning", "income_statement", 0.95),
                PatternRule::new(r"(?i)balansräkning", "balance_sheet", 0.95),
                PatternRule::new(r"(?i)rapport", "report_question", 0.8),
                PatternRule::new(r"(?i)nyckeltal", "key_figures", 0.85),
            ],
        },
    ]
});

static INVOICE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bF-\d+\b").unwrap());
static PERIOD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}-Q[1-4]\b").unwrap());

/// Keyword/regex classifier over the priority table.
#[derive(Default)]
pub struct PatternClassifier;

impl PatternClassifier {
    /// Creates the classifier. The rule table is process-wide and
    /// immutable.
    pub fn new() -> Self {
        Self
    }

    fn best_match(utterance: &str) -> Option<(AssistantDomain, &'static str, f32)> {
        debug_assert_eq!(
            RULE_TABLE.len(),
            AssistantDomain::PRIORITY.len(),
            "rule table must cover every domain"
        );

        let mut best: Option<(AssistantDomain, &'static str, f32)> = None;
        for domain_rules in RULE_TABLE.iter() {
            for rule in &domain_rules.rules {
                if !rule.pattern.is_match(utterance) {
                    continue;
                }
                // Strictly greater: on a tie the earlier (higher-priority)
                // domain keeps the slot.
                let beats = best.map_or(true, |(_, _, c)| rule.confidence > c);
                if beats {
                    best = Some((domain_rules.domain, rule.category, rule.confidence));
                }
            }
        }
        best
    }

    fn extract_entities(utterance: &str) -> Vec<IntentEntity> {
        let mut entities = Vec::new();
        for capture in INVOICE_ID.find_iter(utterance) {
            entities.push(IntentEntity::new("invoice_id", capture.as_str()));
        }
        for capture in PERIOD.find_iter(utterance) {
            entities.push(IntentEntity::new("period", capture.as_str()));
        }
        entities
    }
}

#[async_trait]
impl Classifier for PatternClassifier {
    async fn classify(
        &self,
        utterance: &str,
        _context: &AgentContext,
    ) -> Result<Intent, ClassifierError> {
        let entities = Self::extract_entities(utterance);

        let intent = match Self::best_match(utterance) {
            Some((domain, category, confidence)) => {
                Intent::new(category, domain, confidence).with_entities(entities)
            }
            None => Intent::unknown().with_entities(entities),
        };

        Ok(intent)
    }
}
