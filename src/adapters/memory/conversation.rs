//! In-memory conversation repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::foundation::{CompanyId, ConversationId};
use crate::ports::{
    ConversationRecord, ConversationRepository, LlmMessage, RepositoryError,
};

#[derive(Debug, Default)]
struct Inner {
    conversations: HashMap<ConversationId, ConversationRecord>,
    messages: HashMap<ConversationId, Vec<LlmMessage>>,
}

/// In-memory implementation of [`ConversationRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryConversationRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every conversation. Test isolation helper.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.conversations.clear();
        inner.messages.clear();
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: &ConversationRecord) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        inner.messages.entry(conversation.id).or_default();
        Ok(())
    }

    async fn list(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<ConversationRecord>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<ConversationRecord> = inner
            .conversations
            .values()
            .filter(|c| &c.company_id == company_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn get_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, RepositoryError> {
        Ok(self.inner.lock().await.conversations.get(id).cloned())
    }

    async fn add_message(
        &self,
        id: &ConversationId,
        message: &LlmMessage,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        if !inner.conversations.contains_key(id) {
            return Err(RepositoryError::NotFound);
        }
        inner.messages.entry(*id).or_default().push(message.clone());
        Ok(())
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<LlmMessage>, RepositoryError> {
        let inner = self.inner.lock().await;
        inner
            .messages
            .get(id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }
}
