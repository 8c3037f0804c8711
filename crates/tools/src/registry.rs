//! The tool registry: descriptor index, pattern cache, and the evented
//! invocation wrapper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use trellis_domain::error::{Error, Result};
use trellis_domain::tool::{CommandPattern, ToolDescriptor, ToolResult};
use trellis_events::TurnPublisher;

use crate::schema::validate_args;
use crate::server::{CallContext, ToolServer};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Indexes tool servers by tool name and wraps every invocation with
/// validation, events, timeout, and cancellation.
///
/// Safe for concurrent calls from different turns; the caller guarantees
/// at most one concurrent invocation per `(message_id, tool_id)` by
/// running a turn's nodes sequentially.
pub struct ToolRegistry {
    servers: Vec<Arc<dyn ToolServer>>,
    by_tool: HashMap<String, usize>,
    /// Pattern cache, replaced atomically on refresh.
    patterns: RwLock<Arc<Vec<CommandPattern>>>,
}

impl ToolRegistry {
    /// Index the given servers. Later servers lose name collisions; a
    /// collision is a deployment mistake and gets a warning.
    pub fn new(servers: Vec<Arc<dyn ToolServer>>) -> Arc<Self> {
        let mut by_tool = HashMap::new();
        for (idx, server) in servers.iter().enumerate() {
            for descriptor in server.descriptors() {
                if let Some(prev) = by_tool.insert(descriptor.name.clone(), idx) {
                    tracing::warn!(
                        tool = %descriptor.name,
                        winner = %servers[prev].name(),
                        loser = %server.name(),
                        "duplicate tool name, first server wins"
                    );
                    by_tool.insert(descriptor.name.clone(), prev);
                }
            }
        }

        let registry = Arc::new(Self {
            servers,
            by_tool,
            patterns: RwLock::new(Arc::new(Vec::new())),
        });
        registry.refresh_patterns();
        registry
    }

    /// All descriptors, grouped by server name.
    pub fn descriptors_by_server(&self) -> HashMap<String, Vec<ToolDescriptor>> {
        self.servers
            .iter()
            .map(|s| (s.name().to_string(), s.descriptors()))
            .collect()
    }

    /// Look up the descriptor for a tool name.
    pub fn descriptor(&self, tool: &str) -> Option<ToolDescriptor> {
        let server = self.server_for(tool)?;
        server.descriptors().into_iter().find(|d| d.name == tool)
    }

    /// The server that owns `tool`, if any.
    pub fn server_for(&self, tool: &str) -> Option<&Arc<dyn ToolServer>> {
        self.by_tool.get(tool).map(|&idx| &self.servers[idx])
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.by_tool.contains_key(tool)
    }

    // ── Patterns ───────────────────────────────────────────────────

    /// Current pattern snapshot (cheap clone of an `Arc`).
    pub fn patterns(&self) -> Arc<Vec<CommandPattern>> {
        self.patterns.read().clone()
    }

    /// Re-collect patterns from every server and atomically replace the
    /// cache. Called once at startup and on explicit refresh.
    pub fn refresh_patterns(&self) {
        let mut collected = Vec::new();
        for server in &self.servers {
            for mut pattern in server.patterns() {
                if pattern.server.is_empty() {
                    pattern.server = server.name().to_string();
                }
                match pattern.compile() {
                    Ok(_) => collected.push(pattern),
                    Err(e) => {
                        tracing::warn!(
                            pattern_id = %pattern.id,
                            server = %pattern.server,
                            error = %e,
                            "skipping uncompilable command pattern"
                        );
                    }
                }
            }
        }
        tracing::debug!(count = collected.len(), "pattern cache refreshed");
        *self.patterns.write() = Arc::new(collected);
    }

    // ── Invocation ─────────────────────────────────────────────────

    /// Invoke `tool` with lifecycle events on the turn's topic.
    ///
    /// Order of operations per the tool contract: validate → `tool_start`
    /// → dispatch (bounded by the server's timeout, raced against the
    /// cancel token) → `tool_complete` or `tool_error`.
    ///
    /// Schema-invalid arguments never start an invocation and therefore
    /// emit no events.
    pub async fn call_tool(
        &self,
        tool: &str,
        args: &Value,
        ctx: &CallContext,
        publisher: &Arc<TurnPublisher>,
    ) -> Result<ToolResult> {
        let server = self
            .server_for(tool)
            .ok_or_else(|| Error::Validation(format!("unknown tool: {tool}")))?
            .clone();

        let descriptor = server
            .descriptors()
            .into_iter()
            .find(|d| d.name == tool)
            .ok_or_else(|| Error::Validation(format!("unknown tool: {tool}")))?;

        validate_args(&descriptor.input_schema, args)?;

        let events = publisher.tool(server.name(), tool);
        events.start(args).await;

        let timeout = server.call_timeout(tool);
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, server.call(tool, args, ctx)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::Timeout(format!(
                        "tool {tool} exceeded {}s",
                        timeout.as_secs()
                    ))),
                }
            }
            _ = ctx.cancel.cancelled() => Err(Error::Cancelled),
        };

        match outcome {
            Ok(result) if result.is_error => {
                let error_text = result.joined_text();
                events.error(&error_text).await;
                tracing::debug!(tool, message_id = %ctx.message_id, "tool returned error result");
                Ok(result)
            }
            Ok(result) => {
                events.complete(&result.metadata).await;
                Ok(result)
            }
            Err(e) => {
                events.error(&e.to_string()).await;
                tracing::warn!(
                    tool,
                    conversation_id = %ctx.conversation_id,
                    generation_id = %ctx.generation_id,
                    message_id = %ctx.message_id,
                    error = %e,
                    "tool call failed"
                );
                Err(e)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;
    use trellis_events::EventBus;
    use trellis_stores::MemoryKv;

    struct EchoServer;

    #[async_trait::async_trait]
    impl ToolServer for EchoServer {
        fn name(&self) -> &str {
            "echo"
        }

        fn descriptors(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor {
                name: "echo_text".into(),
                description: "echo the input".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            }]
        }

        fn patterns(&self) -> Vec<CommandPattern> {
            vec![CommandPattern {
                id: "echo".into(),
                pattern: r"^say\s+(.+)$".into(),
                flags: "i".into(),
                tool: "echo_text".into(),
                parameter_mapping: HashMap::from([("text".into(), 1)]),
                description: "echo".into(),
                examples: vec!["say hello".into()],
                confidence: 0.9,
                server: String::new(),
            }]
        }

        async fn call(&self, _tool: &str, args: &Value, _ctx: &CallContext) -> Result<ToolResult> {
            let text = args["text"].as_str().unwrap_or_default();
            if text == "fail" {
                return Ok(ToolResult::error("requested failure"));
            }
            if text == "boom" {
                return Err(Error::Other("exploded".into()));
            }
            Ok(ToolResult::text(text).with_metadata(json!({ "len": text.len() })))
        }
    }

    struct SlowServer;

    #[async_trait::async_trait]
    impl ToolServer for SlowServer {
        fn name(&self) -> &str {
            "slow"
        }
        fn descriptors(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor {
                name: "sleep_forever".into(),
                description: "never returns".into(),
                input_schema: json!({ "type": "object", "properties": {} }),
            }]
        }
        fn call_timeout(&self, _tool: &str) -> Duration {
            Duration::from_millis(300)
        }
        async fn call(&self, _tool: &str, _args: &Value, _ctx: &CallContext) -> Result<ToolResult> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolResult::text("unreachable"))
        }
    }

    fn setup() -> (Arc<ToolRegistry>, Arc<TurnPublisher>, EventBus) {
        let registry = ToolRegistry::new(vec![Arc::new(EchoServer), Arc::new(SlowServer)]);
        let bus = EventBus::new(Arc::new(MemoryKv::new()));
        let publisher = TurnPublisher::new(bus.clone(), "m1", 2048);
        (registry, publisher, bus)
    }

    #[tokio::test]
    async fn successful_call_emits_start_then_complete() {
        let (registry, publisher, bus) = setup();
        let mut sub = bus.subscribe("m1").await.unwrap();

        let result = registry
            .call_tool("echo_text", &json!({"text": "hi"}), &CallContext::default(), &publisher)
            .await
            .unwrap();
        assert_eq!(result.joined_text(), "hi");

        let start: Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        let complete: Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        assert_eq!(start["type"], "tool_start");
        assert_eq!(complete["type"], "tool_complete");
        assert_eq!(complete["metadata"]["len"], 2);
        assert_eq!(start["toolId"], complete["toolId"]);
    }

    #[tokio::test]
    async fn error_result_emits_tool_error() {
        let (registry, publisher, bus) = setup();
        let mut sub = bus.subscribe("m1").await.unwrap();

        let result = registry
            .call_tool("echo_text", &json!({"text": "fail"}), &CallContext::default(), &publisher)
            .await
            .unwrap();
        assert!(result.is_error);

        let _start = sub.next().await.unwrap();
        let error: Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        assert_eq!(error["type"], "tool_error");
        assert_eq!(error["error"], "requested failure");
    }

    #[tokio::test]
    async fn server_error_emits_tool_error_and_propagates() {
        let (registry, publisher, bus) = setup();
        let mut sub = bus.subscribe("m1").await.unwrap();

        let err = registry
            .call_tool("echo_text", &json!({"text": "boom"}), &CallContext::default(), &publisher)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exploded"));

        let _start = sub.next().await.unwrap();
        let error: Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        assert_eq!(error["type"], "tool_error");
    }

    #[tokio::test]
    async fn invalid_args_emit_no_events() {
        let (registry, publisher, bus) = setup();
        let mut sub = bus.subscribe("m1").await.unwrap();

        let err = registry
            .call_tool("echo_text", &json!({}), &CallContext::default(), &publisher)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Nothing was published: a probe event must be first on the topic.
        publisher.status("thinking", "probe", None, None).await;
        let first: Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        assert_eq!(first["type"], "status");
    }

    #[tokio::test]
    async fn unknown_tool_is_validation_error() {
        let (registry, publisher, _bus) = setup();
        let err = registry
            .call_tool("nope", &json!({}), &CallContext::default(), &publisher)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn timeout_emits_tool_error() {
        let (registry, publisher, bus) = setup();
        let mut sub = bus.subscribe("m1").await.unwrap();

        let err = registry
            .call_tool("sleep_forever", &json!({}), &CallContext::default(), &publisher)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));

        let _start = sub.next().await.unwrap();
        let error: Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        assert_eq!(error["type"], "tool_error");
    }

    #[tokio::test]
    async fn cancellation_emits_terminal_event() {
        let (registry, publisher, bus) = setup();
        let mut sub = bus.subscribe("m1").await.unwrap();

        let ctx = CallContext::default();
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel.cancel();
        });

        let err = registry
            .call_tool("sleep_forever", &json!({}), &ctx, &publisher)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let _start = sub.next().await.unwrap();
        let error: Value = serde_json::from_str(&sub.next().await.unwrap()).unwrap();
        assert_eq!(error["type"], "tool_error");
    }

    #[tokio::test]
    async fn patterns_collected_and_stamped_with_server() {
        let (registry, _publisher, _bus) = setup();
        let patterns = registry.patterns();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].server, "echo");
        assert!(patterns[0].extract("say hello").is_some());
    }

    #[tokio::test]
    async fn refresh_replaces_snapshot_atomically() {
        let (registry, _publisher, _bus) = setup();
        let before = registry.patterns();
        registry.refresh_patterns();
        let after = registry.patterns();
        // Old snapshot is still usable by in-flight readers.
        assert_eq!(before.len(), after.len());
    }
}
