use std::time::Duration;

use trellis_domain::error::Result;
use trellis_domain::stream::BoxStream;

/// Key/value store port: plain keys with optional TTL, ordered lists, and
/// per-topic pub/sub.
///
/// Used for the message cache (`conversations:{id}:messages`), executive
/// summaries, heartbeat membership (`nodes:active:{nodeId}`), and event
/// topics (`events:{messageId}`). Subscribers on one topic observe a
/// single totally-ordered stream.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Set with expiry. Re-setting refreshes the TTL (heartbeat refresh is
    /// CAS-free by design).
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Append one element to the list at `key`, creating it if absent.
    async fn list_push(&self, key: &str, value: &str) -> Result<()>;

    /// Read the whole list in append order.
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;

    /// Replace the entire list. Only the offline dedup utility writes
    /// through this.
    async fn list_replace(&self, key: &str, values: Vec<String>) -> Result<()>;

    /// All live (non-expired) keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Publish a payload to a topic. No-op without subscribers.
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;

    /// Subscribe to a topic; yields payloads published after this call.
    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>>;
}
