//! Conversation Repository Port - persistence collaborator for conversations.
//!
//! Persistence itself is out of scope for this crate; the core only
//! depends on this interface. Implementations must append messages in
//! order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{CompanyId, ConversationId, Timestamp, UserId};

use super::llm_provider::LlmMessage;

/// A stored conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique identifier.
    pub id: ConversationId,
    /// Owning user.
    pub user_id: UserId,
    /// Tenant the conversation belongs to.
    pub company_id: CompanyId,
    /// When the conversation was created.
    pub created_at: Timestamp,
}

impl ConversationRecord {
    /// Creates a new conversation record.
    pub fn new(user_id: UserId, company_id: CompanyId) -> Self {
        Self {
            id: ConversationId::new(),
            user_id,
            company_id,
            created_at: Timestamp::now(),
        }
    }
}

/// Repository port for conversation persistence.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Saves a new conversation.
    async fn create(&self, conversation: &ConversationRecord) -> Result<(), RepositoryError>;

    /// Lists conversations for a company, newest first.
    async fn list(&self, company_id: &CompanyId)
        -> Result<Vec<ConversationRecord>, RepositoryError>;

    /// Finds a conversation by id. Returns `None` if not found.
    async fn get_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, RepositoryError>;

    /// Appends a message to a conversation.
    async fn add_message(
        &self,
        id: &ConversationId,
        message: &LlmMessage,
    ) -> Result<(), RepositoryError>;

    /// Returns a conversation's messages in append order.
    async fn messages(&self, id: &ConversationId) -> Result<Vec<LlmMessage>, RepositoryError>;
}

/// Repository failures.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// The conversation does not exist.
    #[error("conversation not found")]
    NotFound,

    /// The backing store is unreachable.
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
