use trellis_domain::error::Result;
use trellis_domain::message::Message;

/// Durable message store with a unique sparse index on `Message::id`.
///
/// Inserting a duplicate id returns [`trellis_domain::Error::Duplicate`];
/// reads return messages in successful-write order.
#[async_trait::async_trait]
pub trait DocStore: Send + Sync {
    async fn insert_message(&self, message: &Message) -> Result<()>;

    async fn messages_for(&self, conversation_id: &str) -> Result<Vec<Message>>;
}
