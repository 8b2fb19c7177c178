use crate::error::Result;
use crate::types::{ChatAction, GetUpdates, OutgoingMessage, Update};
use async_trait::async_trait;

/// Source of inbound platform events (long-poll `getUpdates`).
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// One bounded long-poll request. Returns updates in ascending id order.
    async fn get_updates(&self, request: &GetUpdates) -> Result<Vec<Update>>;
}

/// Outbound side of the bot: replies, menu edits, callback acks.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, chat_id: i64, message: OutgoingMessage) -> Result<()>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        message: OutgoingMessage,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_query_id: &str, text: Option<&str>)
    -> Result<()>;

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<()>;
}
