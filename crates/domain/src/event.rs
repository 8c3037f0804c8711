//! Bus event envelopes published on the per-message topic
//! `events:{messageId}`.
//!
//! Two families share the topic, distinguished by the `type` field: tool
//! lifecycle events (`tool_start` … `tool_error`) and stage statuses
//! (`type = "status"`). Timestamps are epoch milliseconds stamped by the
//! turn's publisher so the per-topic order is monotonic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolEvent {
    ToolStart {
        #[serde(rename = "toolId")]
        tool_id: String,
        #[serde(rename = "toolType")]
        tool_type: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        timestamp: i64,
        /// Sanitized, truncated invocation arguments.
        args: Value,
    },
    ToolProgress {
        #[serde(rename = "toolId")]
        tool_id: String,
        #[serde(rename = "toolType")]
        tool_type: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        timestamp: i64,
        message: String,
    },
    ToolComplete {
        #[serde(rename = "toolId")]
        tool_id: String,
        #[serde(rename = "toolType")]
        tool_type: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        timestamp: i64,
        #[serde(default)]
        metadata: Value,
    },
    ToolError {
        #[serde(rename = "toolId")]
        tool_id: String,
        #[serde(rename = "toolType")]
        tool_type: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        timestamp: i64,
        error: String,
    },
}

impl ToolEvent {
    pub fn tool_id(&self) -> &str {
        match self {
            ToolEvent::ToolStart { tool_id, .. }
            | ToolEvent::ToolProgress { tool_id, .. }
            | ToolEvent::ToolComplete { tool_id, .. }
            | ToolEvent::ToolError { tool_id, .. } => tool_id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            ToolEvent::ToolStart { timestamp, .. }
            | ToolEvent::ToolProgress { timestamp, .. }
            | ToolEvent::ToolComplete { timestamp, .. }
            | ToolEvent::ToolError { timestamp, .. } => *timestamp,
        }
    }

    /// Terminal events close an invocation: exactly one per `tool_start`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolEvent::ToolComplete { .. } | ToolEvent::ToolError { .. }
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage statuses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// High-level stage progress shared on the same topic as tool events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Always `"status"` on the wire.
    #[serde(rename = "type")]
    pub event_type: String,
    /// `routing`, `planning`, `thinking`, or `tool_status`.
    pub action: String,
    pub description: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl StatusEvent {
    pub fn new(action: impl Into<String>, description: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event_type: "status".into(),
            action: action.into(),
            description: description.into(),
            timestamp,
            reasoning: None,
            confidence: None,
        }
    }
}
