//! Intent value objects.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::AssistantDomain;

/// The classified meaning of one user utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Action category within the domain (e.g. "send_reminder").
    pub category: String,

    /// Finer-grained action, when one was detected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_intent: Option<String>,

    /// Entities extracted from the utterance.
    pub entities: Vec<IntentEntity>,

    /// Classifier confidence, always in [0, 1].
    pub confidence: f32,

    /// Domain handler the request should route to.
    pub target_domain: AssistantDomain,
}

impl Intent {
    /// Creates an intent, clamping confidence into [0, 1].
    pub fn new(
        category: impl Into<String>,
        target_domain: AssistantDomain,
        confidence: f32,
    ) -> Self {
        Self {
            category: category.into(),
            sub_intent: None,
            entities: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            target_domain,
        }
    }

    /// The fallback intent when nothing matched.
    pub fn unknown() -> Self {
        Self::new("unknown", AssistantDomain::PRIORITY[0], 0.0)
    }

    /// Sets the sub-intent.
    pub fn with_sub_intent(mut self, sub_intent: impl Into<String>) -> Self {
        self.sub_intent = Some(sub_intent.into());
        self
    }

    /// Adds an entity.
    pub fn with_entity(mut self, entity: IntentEntity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Replaces the entity list.
    pub fn with_entities(mut self, entities: Vec<IntentEntity>) -> Self {
        self.entities = entities;
        self
    }
}

/// One entity extracted from an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentEntity {
    /// Entity kind (e.g. "invoice_id", "period").
    pub kind: String,
    /// Extracted value.
    pub value: String,
}

impl IntentEntity {
    /// Creates a new entity.
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}
