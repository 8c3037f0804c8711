//! `Respond(query, options)` — the orchestrator contract.
//!
//! One call = one turn: persist the user message (fatal on store
//! failure), run the graph on its own task, stream tokens to the caller
//! with backpressure, persist the assistant message, then schedule
//! background summarization. The returned stream yields zero or more
//! tokens followed by exactly one usage-metadata record.

use std::sync::Arc;

use sha2::Digest;
use tokio::sync::{mpsc, oneshot};

use trellis_domain::error::{Error, Result};
use trellis_domain::message::{Message, Role};
use trellis_domain::stream::{BoxStream, ReplyChunk, Usage};
use trellis_events::{CancelToken, TurnPublisher};
use trellis_tools::CallContext;

use crate::bundle::{Capabilities, TurnCtx};
use crate::graph_def::{build_turn_graph, ENTRY};
use crate::state::TurnState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the request came from (diagnostic only).
#[derive(Debug, Clone, Default)]
pub struct Source {
    pub application: String,
    pub device: String,
}

#[derive(Debug, Clone, Default)]
pub struct RespondOptions {
    pub conversation_id: Option<String>,
    pub generation_id: Option<String>,
    pub stream: bool,
    pub source: Option<Source>,
}

/// Stable conversation id for callers that do not supply one: first 16
/// hex chars of SHA-256 over the first user message, prefixed `conv_`.
pub fn derive_conversation_id(first_user_message: &str) -> String {
    let digest = sha2::Sha256::digest(first_user_message.as_bytes());
    format!("conv_{}", &hex::encode(digest)[..16])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    caps: Capabilities,
}

impl Orchestrator {
    pub fn new(caps: Capabilities) -> Arc<Self> {
        Arc::new(Self { caps })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Run one turn. Returns a stream of tokens terminated by one
    /// usage-metadata chunk; errors end the stream as an `Err` item.
    ///
    /// Fatal pre-flight failures (user-message persistence) are returned
    /// directly instead of through the stream.
    pub async fn respond(
        &self,
        query: &str,
        options: RespondOptions,
        cancel: CancelToken,
    ) -> Result<BoxStream<'static, Result<ReplyChunk>>> {
        let conversation_id = options
            .conversation_id
            .clone()
            .unwrap_or_else(|| derive_conversation_id(query));
        let generation_id = options
            .generation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let message_id = uuid::Uuid::new_v4().to_string();

        tracing::debug!(
            conversation_id = %conversation_id,
            generation_id = %generation_id,
            message_id = %message_id,
            "turn started"
        );

        // Persist the user message first; a store failure aborts the turn.
        let user_message = Message::new(conversation_id.clone(), Role::User, query);
        self.caps.memory.append_message(&user_message).await?;

        // Pre-load the conversation slice. The just-persisted user
        // message is excluded: it rides in the messages channel.
        let mut context = self
            .caps
            .memory
            .get_context(&conversation_id, self.caps.config.memory.context_max_tokens)
            .await;
        context.messages.retain(|m| m.id != user_message.id);

        let publisher = TurnPublisher::new(
            self.caps.bus.clone(),
            message_id.clone(),
            self.caps.config.tools.event_field_cap,
        );
        let call_ctx = CallContext {
            conversation_id: conversation_id.clone(),
            generation_id,
            message_id: message_id.clone(),
            cancel: cancel.clone(),
        };

        let (token_tx, mut token_rx) = mpsc::channel::<String>(64);
        let (done_tx, done_rx) = oneshot::channel::<Result<Usage>>();

        let turn_ctx = TurnCtx::new(self.caps.clone(), publisher, call_ctx, token_tx);
        let graph = build_turn_graph(&turn_ctx)?;

        let mut state = TurnState {
            query: query.to_string(),
            message_id,
            context_messages: context.as_chat_messages(),
            messages: vec![user_message.as_chat()],
            ..TurnState::default()
        };

        let memory = self.caps.memory.clone();
        let driver_ctx = turn_ctx.clone();
        tokio::spawn(async move {
            let run_result = graph.run(&mut state, ENTRY, &driver_ctx.call_ctx.cancel).await;

            let outcome = match run_result {
                Ok(()) => match state.response.take() {
                    Some(assistant_message) => {
                        match memory.append_message(&assistant_message).await {
                            Ok(_) => {
                                memory.schedule_summarize(&assistant_message.conversation_id);
                                Ok(driver_ctx.total_usage())
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "assistant message persistence failed");
                                Err(e)
                            }
                        }
                    }
                    None => {
                        tracing::warn!("graph finished without a response");
                        Err(Error::Other("turn produced no response".into()))
                    }
                },
                Err(e) => {
                    if !matches!(e, Error::Cancelled) {
                        tracing::error!(error = %e, "turn failed");
                    }
                    Err(e)
                }
            };

            let _ = done_tx.send(outcome);
            // Dropping driver_ctx (the last TurnCtx clone) closes the
            // token channel, letting the output stream drain and finish.
        });

        let stream = async_stream::stream! {
            while let Some(token) = token_rx.recv().await {
                yield Ok(ReplyChunk::Token(token));
            }
            match done_rx.await {
                Ok(Ok(usage)) => yield Ok(ReplyChunk::Metadata { usage_metadata: usage }),
                Ok(Err(e)) => yield Err(e),
                Err(_) => yield Err(Error::Other("turn driver vanished".into())),
            }
        };

        Ok(Box::pin(stream))
    }

    /// Non-streaming convenience: drain the turn and return the full
    /// reply text plus usage.
    pub async fn respond_collect(
        &self,
        query: &str,
        options: RespondOptions,
        cancel: CancelToken,
    ) -> Result<(String, Usage)> {
        use futures_util::StreamExt;

        let mut stream = self.respond(query, options, cancel).await?;
        let mut text = String::new();
        let mut usage = Usage::default();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                ReplyChunk::Token(token) => text.push_str(&token),
                ReplyChunk::Metadata { usage_metadata } => usage = usage_metadata,
            }
        }
        Ok((text, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_are_stable_and_prefixed() {
        let a = derive_conversation_id("turn on the kitchen lights");
        let b = derive_conversation_id("turn on the kitchen lights");
        assert_eq!(a, b);
        assert!(a.starts_with("conv_"));
        assert_eq!(a.len(), "conv_".len() + 16);
    }

    #[test]
    fn derived_ids_differ_per_message() {
        assert_ne!(
            derive_conversation_id("hello"),
            derive_conversation_id("goodbye")
        );
    }

    #[test]
    fn derived_id_is_lowercase_hex() {
        let id = derive_conversation_id("check");
        let hex_part = id.strip_prefix("conv_").unwrap();
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
