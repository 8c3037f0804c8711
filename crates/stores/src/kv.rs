//! In-process key/value store: TTL'd keys, ordered lists, per-topic
//! pub/sub over tokio broadcast channels.
//!
//! Expiry is lazy — expired entries are dropped on read and on prefix
//! scans, so no sweeper task is needed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use trellis_domain::error::Result;
use trellis_domain::stream::BoxStream;
use trellis_ports::kv::KvStore;

/// Buffered payloads per topic before slow subscribers start lagging.
const TOPIC_CAPACITY: usize = 256;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-memory [`KvStore`].
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
    lists: RwLock<HashMap<String, Vec<String>>>,
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut topics = self.topics.lock();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    return Ok(Some(entry.value.clone()))
                }
                None => return Ok(None),
                Some(_) => {} // expired — fall through to evict
            }
        }
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        self.lists
            .write()
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.lists.read().get(key).cloned().unwrap_or_default())
    }

    async fn list_replace(&self, key: &str, values: Vec<String>) -> Result<()> {
        self.lists.write().insert(key.to_string(), values);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(k, entry)| k.starts_with(prefix) && !entry.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        // A send error only means no live subscribers.
        let _ = self.topic_sender(topic).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, String>> {
        let mut rx = self.topic_sender(topic).subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(payload) => yield payload,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn set_get_delete() {
        let kv = MemoryKv::new();
        kv.set("a", "1").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
        kv.delete("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let kv = MemoryKv::new();
        kv.set_with_ttl("hb", "alive", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(kv.get("hb").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(kv.get("hb").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_refresh_extends_lifetime() {
        let kv = MemoryKv::new();
        kv.set_with_ttl("hb", "alive", Duration::from_millis(30))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        kv.set_with_ttl("hb", "alive", Duration::from_millis(30))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(kv.get("hb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn scan_prefix_skips_expired() {
        let kv = MemoryKv::new();
        kv.set("nodes:active:a", "x").await.unwrap();
        kv.set_with_ttl("nodes:active:b", "y", Duration::from_millis(5))
            .await
            .unwrap();
        kv.set("other:c", "z").await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        let keys = kv.scan_prefix("nodes:active:").await.unwrap();
        assert_eq!(keys, vec!["nodes:active:a".to_string()]);
    }

    #[tokio::test]
    async fn lists_preserve_append_order() {
        let kv = MemoryKv::new();
        for i in 0..5 {
            kv.list_push("msgs", &format!("m{i}")).await.unwrap();
        }
        let values = kv.list_range("msgs").await.unwrap();
        assert_eq!(values, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn list_replace_overwrites() {
        let kv = MemoryKv::new();
        kv.list_push("msgs", "a").await.unwrap();
        kv.list_push("msgs", "a").await.unwrap();
        kv.list_replace("msgs", vec!["a".into()]).await.unwrap();
        assert_eq!(kv.list_range("msgs").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn pubsub_is_ordered_per_topic() {
        let kv = MemoryKv::new();
        let mut sub = kv.subscribe("events:m1").await.unwrap();

        for i in 0..10 {
            kv.publish("events:m1", &format!("e{i}")).await.unwrap();
        }

        for i in 0..10 {
            assert_eq!(sub.next().await.unwrap(), format!("e{i}"));
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_later_publishes() {
        let kv = MemoryKv::new();
        kv.publish("t", "before").await.unwrap();
        let mut sub = kv.subscribe("t").await.unwrap();
        kv.publish("t", "after").await.unwrap();
        assert_eq!(sub.next().await.unwrap(), "after");
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let kv = MemoryKv::new();
        let mut sub_a = kv.subscribe("events:a").await.unwrap();
        kv.publish("events:b", "for-b").await.unwrap();
        kv.publish("events:a", "for-a").await.unwrap();
        assert_eq!(sub_a.next().await.unwrap(), "for-a");
    }
}
