//! Per-turn publishers.
//!
//! [`TurnPublisher`] is the single funnel for everything a turn puts on
//! its topic: stage statuses and tool lifecycle events. It owns the
//! monotonic timestamp source. [`ToolEventPublisher`] wraps one tool
//! invocation with a stable `toolId` and guarantees the start/terminal
//! pairing shape that subscribers rely on.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use trellis_domain::event::{StatusEvent, ToolEvent};

use crate::bus::EventBus;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Truncation helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Truncate to at most `max` bytes at a char boundary, appending an
/// ellipsis marker when shortened.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut boundary = max;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}…", &s[..boundary])
}

/// Truncate every string leaf in a JSON value to `max` bytes. Keeps the
/// bus small regardless of what tools put in their args or metadata.
pub(crate) fn truncate_value(value: &Value, max: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_str(s, max)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| truncate_value(v, max)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_value(v, max)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnPublisher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The single publisher bound to one turn's message id.
pub struct TurnPublisher {
    bus: EventBus,
    message_id: String,
    field_cap: usize,
    last_ts: Mutex<i64>,
}

impl TurnPublisher {
    pub fn new(bus: EventBus, message_id: impl Into<String>, field_cap: usize) -> Arc<Self> {
        Arc::new(Self {
            bus,
            message_id: message_id.into(),
            field_cap,
            last_ts: Mutex::new(0),
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Next timestamp for this topic: wall clock, bumped past the previous
    /// stamp so per-topic order stays strictly monotonic.
    pub(crate) fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last_ts.lock();
        let ts = if now > *last { now } else { *last + 1 };
        *last = ts;
        ts
    }

    async fn publish_json(&self, payload: &impl serde::Serialize) {
        match serde_json::to_string(payload) {
            Ok(json) => {
                if let Err(e) = self.bus.publish(&self.message_id, &json).await {
                    tracing::warn!(message_id = %self.message_id, error = %e, "event publish failed");
                }
            }
            Err(e) => {
                tracing::warn!(message_id = %self.message_id, error = %e, "event serialization failed");
            }
        }
    }

    /// Emit a stage status (`routing`, `planning`, `thinking`,
    /// `tool_status`).
    pub async fn status(
        &self,
        action: &str,
        description: &str,
        reasoning: Option<String>,
        confidence: Option<f64>,
    ) {
        let mut event = StatusEvent::new(action, description, self.next_timestamp());
        event.reasoning = reasoning.map(|r| truncate_str(&r, self.field_cap));
        event.confidence = confidence;
        self.publish_json(&event).await;
    }

    /// Open a tool invocation scope. The `toolId` is fixed here and
    /// stamped on every event of the invocation.
    pub fn tool(self: &Arc<Self>, tool_type: &str, tool_name: &str) -> ToolEventPublisher {
        ToolEventPublisher {
            turn: self.clone(),
            tool_id: format!("{tool_type}_{}", self.next_timestamp()),
            tool_type: tool_type.to_string(),
            tool_name: tool_name.to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolEventPublisher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Publisher scoped to one tool invocation.
pub struct ToolEventPublisher {
    turn: Arc<TurnPublisher>,
    tool_id: String,
    tool_type: String,
    tool_name: String,
}

impl ToolEventPublisher {
    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub async fn start(&self, args: &Value) {
        let event = ToolEvent::ToolStart {
            tool_id: self.tool_id.clone(),
            tool_type: self.tool_type.clone(),
            tool_name: self.tool_name.clone(),
            timestamp: self.turn.next_timestamp(),
            args: truncate_value(args, self.turn.field_cap),
        };
        self.turn.publish_json(&event).await;
    }

    pub async fn progress(&self, message: &str) {
        let event = ToolEvent::ToolProgress {
            tool_id: self.tool_id.clone(),
            tool_type: self.tool_type.clone(),
            tool_name: self.tool_name.clone(),
            timestamp: self.turn.next_timestamp(),
            message: truncate_str(message, self.turn.field_cap),
        };
        self.turn.publish_json(&event).await;
    }

    pub async fn complete(&self, metadata: &Value) {
        let event = ToolEvent::ToolComplete {
            tool_id: self.tool_id.clone(),
            tool_type: self.tool_type.clone(),
            tool_name: self.tool_name.clone(),
            timestamp: self.turn.next_timestamp(),
            metadata: truncate_value(metadata, self.turn.field_cap),
        };
        self.turn.publish_json(&event).await;
    }

    pub async fn error(&self, error: &str) {
        let event = ToolEvent::ToolError {
            tool_id: self.tool_id.clone(),
            tool_type: self.tool_type.clone(),
            tool_name: self.tool_name.clone(),
            timestamp: self.turn.next_timestamp(),
            error: truncate_str(error, self.turn.field_cap),
        };
        self.turn.publish_json(&event).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use trellis_stores::MemoryKv;

    fn test_publisher() -> (Arc<TurnPublisher>, EventBus) {
        let bus = EventBus::new(Arc::new(MemoryKv::new()));
        (TurnPublisher::new(bus.clone(), "m1", 64), bus)
    }

    #[test]
    fn truncate_str_respects_char_boundaries() {
        let s = "héllo wörld, this is long";
        let out = truncate_str(s, 3);
        assert!(out.ends_with('…'));
        assert!(out.len() <= 3 + '…'.len_utf8());
    }

    #[test]
    fn truncate_value_walks_nested_structures() {
        let value = serde_json::json!({
            "a": "x".repeat(100),
            "nested": { "b": ["y".repeat(100), 42] }
        });
        let out = truncate_value(&value, 10);
        assert!(out["a"].as_str().unwrap().len() <= 10 + '…'.len_utf8());
        assert!(out["nested"]["b"][0].as_str().unwrap().len() <= 10 + '…'.len_utf8());
        assert_eq!(out["nested"]["b"][1], 42);
    }

    #[tokio::test]
    async fn timestamps_are_strictly_monotonic() {
        let (publisher, _bus) = test_publisher();
        let mut prev = 0;
        for _ in 0..100 {
            let ts = publisher.next_timestamp();
            assert!(ts > prev, "timestamp went backwards: {ts} <= {prev}");
            prev = ts;
        }
    }

    #[tokio::test]
    async fn tool_id_stable_across_invocation_events() {
        let (publisher, bus) = test_publisher();
        let mut sub = bus.subscribe("m1").await.unwrap();

        let tool = publisher.tool("web", "web_search");
        tool.start(&serde_json::json!({"query": "q"})).await;
        tool.complete(&serde_json::json!({"hits": 3})).await;

        let start: serde_json::Value =
            serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        let complete: serde_json::Value =
            serde_json::from_str(&sub.next().await.unwrap()).unwrap();

        assert_eq!(start["type"], "tool_start");
        assert_eq!(complete["type"], "tool_complete");
        assert_eq!(start["toolId"], complete["toolId"]);
        assert!(start["toolId"].as_str().unwrap().starts_with("web_"));
        assert!(start["timestamp"].as_i64().unwrap() < complete["timestamp"].as_i64().unwrap());
    }

    #[tokio::test]
    async fn status_events_share_the_topic() {
        let (publisher, bus) = test_publisher();
        let mut sub = bus.subscribe("m1").await.unwrap();

        publisher
            .status("routing", "matching patterns", None, Some(0.9))
            .await;

        let event: serde_json::Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        assert_eq!(event["type"], "status");
        assert_eq!(event["action"], "routing");
        assert_eq!(event["confidence"], 0.9);
    }

    #[tokio::test]
    async fn oversized_args_are_truncated_on_the_bus() {
        let (publisher, bus) = test_publisher();
        let mut sub = bus.subscribe("m1").await.unwrap();

        let tool = publisher.tool("shell", "execute_command");
        tool.start(&serde_json::json!({"command": "x".repeat(5000)}))
            .await;

        let event: serde_json::Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        assert!(event["args"]["command"].as_str().unwrap().len() < 100);
    }
}
