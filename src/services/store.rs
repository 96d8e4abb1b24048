use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Conversation, ConversationQuery, Message};

/// Durable document store for conversations and their messages.
///
/// There is no referential integrity between the two: deleting a
/// conversation leaves its messages in place, so callers remove children
/// first. Update and delete calls report whether a record matched.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// Matching conversations, most recently updated first.
    async fn list_conversations(&self, query: &ConversationQuery) -> Result<Vec<Conversation>>;

    async fn update_conversation_title(&self, id: &str, title: &str) -> Result<bool>;

    async fn set_conversation_archived(
        &self,
        id: &str,
        archived: bool,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Record activity: bump `last_updated` and replace the preview.
    async fn touch_conversation(
        &self,
        id: &str,
        at: DateTime<Utc>,
        last_message: &str,
    ) -> Result<bool>;

    async fn delete_conversation(&self, id: &str) -> Result<bool>;

    async fn insert_message(&self, message: &Message) -> Result<()>;

    /// Messages of one conversation ordered by timestamp, then exchange order.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    async fn delete_message(&self, id: &str) -> Result<bool>;
}
