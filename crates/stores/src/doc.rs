//! In-process message document store with a unique sparse index on
//! `Message::id`.

use std::collections::HashSet;

use parking_lot::RwLock;

use trellis_domain::error::{Error, Result};
use trellis_domain::message::Message;
use trellis_ports::doc::DocStore;

/// In-memory [`DocStore`]. Messages are kept in successful-write order.
#[derive(Default)]
pub struct MemoryDocs {
    messages: RwLock<Vec<Message>>,
    ids: RwLock<HashSet<String>>,
}

impl MemoryDocs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stored messages (test helper).
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[async_trait::async_trait]
impl DocStore for MemoryDocs {
    async fn insert_message(&self, message: &Message) -> Result<()> {
        {
            let mut ids = self.ids.write();
            if !ids.insert(message.id.clone()) {
                return Err(Error::Duplicate(format!("messageId {}", message.id)));
            }
        }
        self.messages.write().push(message.clone());
        Ok(())
    }

    async fn messages_for(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}
