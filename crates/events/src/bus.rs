use std::sync::Arc;

use trellis_domain::error::Result;
use trellis_domain::stream::BoxStream;
use trellis_ports::kv::KvStore;

/// Thin facade over the KV pub/sub surface for message-scoped topics.
#[derive(Clone)]
pub struct EventBus {
    kv: Arc<dyn KvStore>,
}

impl EventBus {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn topic(message_id: &str) -> String {
        format!("events:{message_id}")
    }

    /// Publish a serialized envelope to a message's topic.
    pub async fn publish(&self, message_id: &str, payload: &str) -> Result<()> {
        self.kv.publish(&Self::topic(message_id), payload).await
    }

    /// Subscribe to a message's topic; yields envelopes published after
    /// this call, in publish order.
    pub async fn subscribe(&self, message_id: &str) -> Result<BoxStream<'static, String>> {
        self.kv.subscribe(&Self::topic(message_id)).await
    }
}
