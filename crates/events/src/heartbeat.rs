//! Node membership heartbeat.
//!
//! Each process refreshes `nodes:active:{nodeId}` with a 20 s TTL every
//! 10 s. A write failure is logged and retried on the next tick — never
//! fatal. Stopping deletes the key so the node disappears immediately
//! instead of after TTL expiry.

use std::sync::Arc;
use std::time::Duration;

use trellis_domain::config::HeartbeatConfig;
use trellis_domain::error::Result;
use trellis_ports::kv::KvStore;

const KEY_PREFIX: &str = "nodes:active:";

/// Heartbeat writer for this process.
pub struct Heartbeat {
    kv: Arc<dyn KvStore>,
    node_id: String,
    ttl: Duration,
    interval: Duration,
}

/// Handle to a running heartbeat task.
pub struct HeartbeatHandle {
    task: tokio::task::JoinHandle<()>,
    kv: Arc<dyn KvStore>,
    key: String,
}

impl Heartbeat {
    pub fn new(kv: Arc<dyn KvStore>, config: &HeartbeatConfig) -> Self {
        let node_id = if config.node_id.is_empty() {
            format!("trellis-{}", &uuid_like_suffix())
        } else {
            config.node_id.clone()
        };
        Self {
            kv,
            node_id,
            ttl: Duration::from_secs(config.ttl_secs),
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Write the membership key once, then spawn the refresh loop.
    pub async fn start(self) -> HeartbeatHandle {
        let key = format!("{KEY_PREFIX}{}", self.node_id);
        let payload = serde_json::json!({
            "node_id": self.node_id,
            "started_at": chrono::Utc::now().to_rfc3339(),
        })
        .to_string();

        if let Err(e) = self.kv.set_with_ttl(&key, &payload, self.ttl).await {
            tracing::warn!(node_id = %self.node_id, error = %e, "initial heartbeat write failed");
        }

        let kv = self.kv.clone();
        let task_key = key.clone();
        let node_id = self.node_id.clone();
        let (ttl, interval) = (self.ttl, self.interval);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately; already written
            loop {
                ticker.tick().await;
                if let Err(e) = kv.set_with_ttl(&task_key, &payload, ttl).await {
                    tracing::warn!(node_id = %node_id, error = %e, "heartbeat refresh failed, retrying next tick");
                }
            }
        });

        HeartbeatHandle {
            task,
            kv: self.kv,
            key,
        }
    }
}

impl HeartbeatHandle {
    /// Stop refreshing and remove the membership key.
    pub async fn stop(self) {
        self.task.abort();
        if let Err(e) = self.kv.delete(&self.key).await {
            tracing::warn!(key = %self.key, error = %e, "heartbeat key delete failed");
        }
    }
}

/// Enumerate live node ids by prefix scan.
pub async fn active_nodes(kv: &dyn KvStore) -> Result<Vec<String>> {
    let keys = kv.scan_prefix(KEY_PREFIX).await?;
    Ok(keys
        .into_iter()
        .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(String::from))
        .collect())
}

fn uuid_like_suffix() -> String {
    // Short random suffix for anonymous nodes; collision space is fine
    // for the membership listing.
    let ms = chrono::Utc::now().timestamp_millis();
    format!("{ms:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_stores::MemoryKv;

    fn fast_config() -> HeartbeatConfig {
        HeartbeatConfig {
            node_id: "node-a".into(),
            ttl_secs: 1,
            interval_secs: 1,
        }
    }

    #[tokio::test]
    async fn start_registers_node() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let handle = Heartbeat::new(kv.clone(), &fast_config()).start().await;

        let nodes = active_nodes(kv.as_ref()).await.unwrap();
        assert_eq!(nodes, vec!["node-a"]);
        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_removes_node() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let handle = Heartbeat::new(kv.clone(), &fast_config()).start().await;
        handle.stop().await;

        let nodes = active_nodes(kv.as_ref()).await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn empty_node_id_gets_generated() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let hb = Heartbeat::new(
            kv,
            &HeartbeatConfig {
                node_id: String::new(),
                ..fast_config()
            },
        );
        assert!(hb.node_id().starts_with("trellis-"));
    }

    #[tokio::test]
    async fn multiple_nodes_listed() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let h1 = Heartbeat::new(
            kv.clone(),
            &HeartbeatConfig {
                node_id: "a".into(),
                ..fast_config()
            },
        )
        .start()
        .await;
        let h2 = Heartbeat::new(
            kv.clone(),
            &HeartbeatConfig {
                node_id: "b".into(),
                ..fast_config()
            },
        )
        .start()
        .await;

        let mut nodes = active_nodes(kv.as_ref()).await.unwrap();
        nodes.sort();
        assert_eq!(nodes, vec!["a", "b"]);

        h1.stop().await;
        h2.stop().await;
    }
}
