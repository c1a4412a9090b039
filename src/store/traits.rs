//! Backend-agnostic storage trait for conversations.

use async_trait::async_trait;

use crate::error::{CollectError, DatabaseError};
use crate::model::{Conversation, Message};

/// Conversation persistence. All writes are single atomic statements.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the schema if it does not exist.
    async fn ensure_schema(&self) -> Result<(), DatabaseError>;

    /// Drop and recreate the schema, losing every conversation.
    async fn reset(&self) -> Result<(), DatabaseError>;

    /// Insert a new conversation. Never merges: an existing id is a conflict.
    async fn create_conversation(
        &self,
        id: &str,
        user: &str,
        messages: &[Message],
    ) -> Result<(), CollectError>;

    /// Insert a one-message conversation, or append to the existing one.
    async fn upsert_message(
        &self,
        id: &str,
        user: &str,
        message: &Message,
    ) -> Result<(), CollectError>;

    /// Append to an existing conversation only.
    async fn append_message(&self, id: &str, message: &Message) -> Result<(), CollectError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DatabaseError>;

    /// Number of stored conversations.
    async fn count(&self) -> Result<u64, DatabaseError>;

    /// Close the underlying connection.
    async fn close(&self);
}
