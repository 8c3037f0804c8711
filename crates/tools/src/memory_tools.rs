//! Memory tool server — read-only access to conversation memory.
//!
//! Tools: `get_context_history`, `get_summary`.

use std::sync::Arc;

use serde_json::{json, Value};

use trellis_domain::error::{Error, Result};
use trellis_domain::tool::{ToolDescriptor, ToolResult};
use trellis_memory::MemoryService;

use crate::server::{CallContext, ToolServer};

/// The `memory` tool server.
pub struct MemoryToolServer {
    memory: Arc<MemoryService>,
}

impl MemoryToolServer {
    pub fn new(memory: Arc<MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait::async_trait]
impl ToolServer for MemoryToolServer {
    fn name(&self) -> &str {
        "memory"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "get_context_history".into(),
                description: "Recent conversation messages within a token budget.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "conversationId": { "type": "string" },
                        "maxTokens": { "type": "integer" }
                    },
                    "required": ["conversationId"]
                }),
            },
            ToolDescriptor {
                name: "get_summary".into(),
                description: "The running executive summary of a conversation.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "conversationId": { "type": "string" }
                    },
                    "required": ["conversationId"]
                }),
            },
        ]
    }

    async fn call(&self, tool: &str, args: &Value, _ctx: &CallContext) -> Result<ToolResult> {
        let conversation_id = args["conversationId"].as_str().unwrap_or_default();

        match tool {
            "get_context_history" => {
                let max_tokens = args["maxTokens"]
                    .as_u64()
                    .map(|t| t as usize)
                    .unwrap_or(self.memory.config().context_max_tokens);
                let block = self.memory.get_context(conversation_id, max_tokens).await;

                let text = block
                    .messages
                    .iter()
                    .map(|m| format!("{:?}: {}", m.role, m.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ToolResult::text(text).with_metadata(json!({
                    "message_count": block.messages.len(),
                    "total_tokens": block.total_tokens,
                    "has_summary": block.summary.is_some(),
                })))
            }
            "get_summary" => {
                let summary = self.memory.get_executive_summary(conversation_id).await;
                match summary {
                    Some(text) => Ok(ToolResult::text(text)),
                    None => Ok(ToolResult::text("No summary yet.")),
                }
            }
            other => Err(Error::Validation(format!("memory server has no tool {other}"))),
        }
    }
}
