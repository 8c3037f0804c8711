//! The responder — streams the final assistant reply.
//!
//! Tokens flow to the caller live, except for a short hold-back window
//! at the head of the reply: that window is scanned against the
//! inadequate-response markers. A hit suppresses the reply and requests
//! one replan round (bounded by the plan's replan cap); once the cap is
//! reached the buffered reply is delivered as-is.

use std::sync::Arc;

use futures_util::StreamExt;

use trellis_domain::error::Result;
use trellis_domain::message::{ChatMessage, Message, Role};
use trellis_domain::plan::MAX_REPLANS;
use trellis_domain::stream::StreamEvent;
use trellis_graph::Node;
use trellis_ports::llm::ChatRequest;

use crate::bundle::TurnCtx;
use crate::inadequate::{is_inadequate, DETECTION_WINDOW_CHARS};
use crate::state::{TurnDelta, TurnState};

pub struct RespondNode {
    ctx: Arc<TurnCtx>,
}

impl RespondNode {
    pub fn new(ctx: Arc<TurnCtx>) -> Self {
        Self { ctx }
    }

    fn build_request(&self, state: &TurnState) -> ChatRequest {
        let system = "You are a helpful assistant. Use the conversation context and any \
                      tool results provided in system messages. Answer directly and \
                      concretely; cite specifics (scores, dates, numbers) when the context \
                      contains them.";

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(state.context_messages.iter().cloned());
        messages.extend(state.messages.iter().cloned());

        ChatRequest {
            messages,
            temperature: Some(0.7),
            max_tokens: None,
            json_mode: false,
            model: None,
        }
    }
}

#[async_trait::async_trait]
impl Node<TurnState> for RespondNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        self.ctx
            .publisher
            .status("thinking", "composing answer", None, None)
            .await;

        let markers = &self.ctx.caps.config.router.inadequate_markers;
        // Only hold tokens back while a replan is still possible.
        let can_replan = state.replanned_count < MAX_REPLANS;

        let mut stream = self
            .ctx
            .caps
            .roles
            .responder
            .stream(self.build_request(state))
            .await?;

        let mut full_text = String::new();
        let mut held = String::new();
        let mut verdict_reached = !can_replan;
        let mut suppressed = false;

        while let Some(event) = stream.next().await {
            if self.ctx.call_ctx.cancel.is_cancelled() {
                return Err(trellis_domain::Error::Cancelled);
            }
            match event? {
                StreamEvent::Token { text } => {
                    full_text.push_str(&text);
                    if verdict_reached {
                        if !suppressed {
                            self.ctx.send_token(&text).await;
                        }
                    } else {
                        held.push_str(&text);
                        if is_inadequate(&held, markers) {
                            verdict_reached = true;
                            suppressed = true;
                        } else if held.chars().count() >= DETECTION_WINDOW_CHARS {
                            // Window passed clean: flush and go live.
                            verdict_reached = true;
                            self.ctx.send_token(&held).await;
                            held.clear();
                        }
                    }
                }
                StreamEvent::Done { usage, .. } => {
                    if let Some(usage) = usage.as_ref() {
                        self.ctx.record_usage(usage);
                    }
                }
                StreamEvent::Error { message } => {
                    return Err(trellis_domain::Error::Model {
                        model: self.ctx.caps.roles.responder.model_id().to_string(),
                        message,
                    });
                }
            }
        }

        // Short replies may end inside the window.
        if !verdict_reached {
            if is_inadequate(&held, markers) {
                suppressed = true;
            } else {
                self.ctx.send_token(&held).await;
                held.clear();
            }
        }

        // Suppression only happens while the replan budget is open.
        if suppressed {
            tracing::debug!(
                replanned_count = state.replanned_count,
                "inadequate reply, requesting replan"
            );
            return Ok(TurnDelta {
                request_replan: Some(true),
                replan_reason: Some(format!(
                    "previous answer punted: {}",
                    full_text.chars().take(160).collect::<String>()
                )),
                node_number: Some(state.node_number + 1),
                ..TurnDelta::default()
            });
        }

        let message = Message::new(
            self.ctx.call_ctx.conversation_id.clone(),
            Role::Assistant,
            full_text.clone(),
        );

        Ok(TurnDelta {
            response: Some(message),
            messages: vec![ChatMessage::assistant(full_text)],
            request_replan: Some(false),
            node_number: Some(state.node_number + 1),
            ..TurnDelta::default()
        })
    }
}
