use serde::{Deserialize, Serialize};

/// Node membership heartbeat: a TTL'd key refreshed at half its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Stable identifier for this process. Empty = derive a random id at
    /// startup.
    #[serde(default)]
    pub node_id: String,

    #[serde(default = "d_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "d_interval")]
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            ttl_secs: d_ttl(),
            interval_secs: d_interval(),
        }
    }
}

fn d_ttl() -> u64 {
    20
}
fn d_interval() -> u64 {
    10
}
