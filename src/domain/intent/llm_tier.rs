//! LLM tier - structured classification via the routing client.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::agent::AgentContext;
use crate::domain::foundation::AssistantDomain;
use crate::domain::llm::LlmClient;
use crate::ports::{CallOptions, LlmMessage};

use super::classifier::{Classifier, ClassifierError};
use super::types::{Intent, IntentEntity};

const CLASSIFY_PROMPT: &str = "Du klassificerar frågor till en ekonomiassistent. \
Svara med ett JSON-objekt: {\"category\": string, \"domain\": \
\"invoicing\"|\"bookkeeping\"|\"tax\"|\"customers\"|\"reporting\", \
\"confidence\": number 0-1, \"entities\": [{\"kind\": string, \"value\": string}]}. \
Svara endast med JSON.";

#[derive(Debug, Deserialize)]
struct ClassifyReply {
    category: String,
    domain: String,
    confidence: f32,
    #[serde(default)]
    entities: Vec<ReplyEntity>,
}

#[derive(Debug, Deserialize)]
struct ReplyEntity {
    kind: String,
    value: String,
}

/// Asks the model to emit a structured category + entities.
pub struct LlmClassifier {
    client: Arc<LlmClient>,
    model: String,
}

impl LlmClassifier {
    /// Creates a classifier that uses `model` through the given client.
    pub fn new(client: Arc<LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        utterance: &str,
        _context: &AgentContext,
    ) -> Result<Intent, ClassifierError> {
        let options = CallOptions::new(&self.model)
            .with_message(LlmMessage::system(CLASSIFY_PROMPT))
            .with_message(LlmMessage::user(utterance))
            .with_max_tokens(256)
            .with_temperature(0.0);

        let response = self
            .client
            .call(options, &CancellationToken::new())
            .await?;

        let content = response
            .content
            .ok_or_else(|| ClassifierError::Malformed("empty reply".to_string()))?;

        let reply: ClassifyReply = serde_json::from_str(content.trim())
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        let domain = AssistantDomain::parse(&reply.domain)
            .ok_or_else(|| ClassifierError::Malformed(format!("unknown domain '{}'", reply.domain)))?;

        debug!(category = %reply.category, domain = %domain, "llm tier classified");

        let entities = reply
            .entities
            .into_iter()
            .map(|e| IntentEntity::new(e.kind, e.value))
            .collect();

        Ok(Intent::new(reply.category, domain, reply.confidence).with_entities(entities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLlmProvider;
    use crate::domain::foundation::{CompanyId, ConversationId, UserId};
    use crate::domain::llm::{ModelRoutes, ProviderKind};
    use std::time::Duration;

    fn test_context() -> AgentContext {
        AgentContext::new(
            UserId::new("user-1").unwrap(),
            CompanyId::new("acme-ab").unwrap(),
            ConversationId::new(),
        )
    }

    fn classifier_with(mock: MockLlmProvider) -> LlmClassifier {
        let client = LlmClient::new(ModelRoutes::standard(), Duration::from_secs(5))
            .with_provider(ProviderKind::OpenAi, Arc::new(mock));
        LlmClassifier::new(Arc::new(client), "gpt-4o-mini")
    }

    #[tokio::test]
    async fn parses_structured_reply() {
        let mock = MockLlmProvider::new().with_text_response(
            r#"{"category":"send_reminder","domain":"invoicing","confidence":0.92,
                "entities":[{"kind":"invoice_id","value":"F-1001"}]}"#,
        );
        let classifier = classifier_with(mock);

        let intent = classifier
            .classify("skicka påminnelse för F-1001", &test_context())
            .await
            .unwrap();

        assert_eq!(intent.category, "send_reminder");
        assert_eq!(intent.target_domain, AssistantDomain::Invoicing);
        assert_eq!(intent.entities.len(), 1);
    }

    #[tokio::test]
    async fn clamps_out_of_range_confidence() {
        let mock = MockLlmProvider::new().with_text_response(
            r#"{"category":"tax_question","domain":"tax","confidence":1.4,"entities":[]}"#,
        );
        let classifier = classifier_with(mock);

        let intent = classifier.classify("skattefråga", &test_context()).await.unwrap();
        assert_eq!(intent.confidence, 1.0);
    }

    #[tokio::test]
    async fn malformed_reply_is_an_error() {
        let mock = MockLlmProvider::new().with_text_response("ingen aning");
        let classifier = classifier_with(mock);

        let result = classifier.classify("hjälp", &test_context()).await;
        assert!(matches!(result, Err(ClassifierError::Malformed(_))));
    }

    #[tokio::test]
    async fn unknown_domain_is_an_error() {
        let mock = MockLlmProvider::new().with_text_response(
            r#"{"category":"x","domain":"payroll","confidence":0.8,"entities":[]}"#,
        );
        let classifier = classifier_with(mock);

        let result = classifier.classify("lönefråga", &test_context()).await;
        assert!(matches!(result, Err(ClassifierError::Malformed(_))));
    }
}
