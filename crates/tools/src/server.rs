use std::time::Duration;

use serde_json::Value;

use trellis_domain::error::Result;
use trellis_domain::tool::{CommandPattern, ToolDescriptor, ToolResult};
use trellis_events::CancelToken;

/// Identity of the turn a tool call belongs to. Event routing keys off
/// `message_id`; the rest is carried for logging.
#[derive(Clone, Default)]
pub struct CallContext {
    pub conversation_id: String,
    pub generation_id: String,
    pub message_id: String,
    pub cancel: CancelToken,
}

/// A named tool server: a directory of descriptors plus an invocation
/// endpoint. Servers may also publish command patterns for the precheck
/// fastpath.
#[async_trait::async_trait]
pub trait ToolServer: Send + Sync {
    fn name(&self) -> &str;

    fn descriptors(&self) -> Vec<ToolDescriptor>;

    /// Command patterns this server serves at `pattern://` resources.
    fn patterns(&self) -> Vec<CommandPattern> {
        Vec::new()
    }

    /// Per-call timeout for one of this server's tools.
    fn call_timeout(&self, _tool: &str) -> Duration {
        Duration::from_secs(30)
    }

    /// Invoke a tool. `args` are already schema-validated by the registry.
    async fn call(&self, tool: &str, args: &Value, ctx: &CallContext) -> Result<ToolResult>;
}
