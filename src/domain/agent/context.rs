//! Request context threaded through one agent turn.

use std::collections::HashMap;

use crate::domain::foundation::{CompanyId, ConversationId, UserId};
use crate::domain::intent::Intent;

/// Context for one in-flight request.
///
/// Built at the boundary from the auth/session collaborator and passed by
/// reference through classifier, planner, agents, and tools. Two in-flight
/// calls for the same conversation never mutate one context concurrently;
/// the orchestrator clones per dispatch.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// Authenticated user making the request.
    pub user_id: UserId,

    /// Tenant the request is scoped to.
    pub company_id: CompanyId,

    /// Conversation this turn belongs to.
    pub conversation_id: ConversationId,

    /// Classified intent, once classification has run.
    pub intent: Option<Intent>,

    /// Scratch values shared between steps of one request.
    pub memory: HashMap<String, serde_json::Value>,
}

impl AgentContext {
    /// Creates a context for a new request.
    pub fn new(user_id: UserId, company_id: CompanyId, conversation_id: ConversationId) -> Self {
        Self {
            user_id,
            company_id,
            conversation_id,
            intent: None,
            memory: HashMap::new(),
        }
    }

    /// Attaches a classified intent.
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    /// Stores a scratch value.
    pub fn remember(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.memory.insert(key.into(), value);
    }

    /// Reads a scratch value.
    pub fn recall(&self, key: &str) -> Option<&serde_json::Value> {
        self.memory.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_context() -> AgentContext {
        AgentContext::new(
            UserId::new("user-1").unwrap(),
            CompanyId::new("acme-ab").unwrap(),
            ConversationId::new(),
        )
    }

    #[test]
    fn new_context_has_no_intent() {
        let context = test_context();
        assert!(context.intent.is_none());
        assert!(context.memory.is_empty());
    }

    #[test]
    fn remember_and_recall_roundtrip() {
        let mut context = test_context();
        context.remember("invoice_id", json!("F-1001"));

        assert_eq!(context.recall("invoice_id"), Some(&json!("F-1001")));
        assert!(context.recall("missing").is_none());
    }
}
