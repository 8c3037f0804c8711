//! Fastpath chain: execute the pattern's target tool, then confirm in
//! one short sentence.
//!
//! The chain never touches the classifier or planner — that is its
//! point. A failed tool call still produces a spoken outcome; the
//! confirmer explains instead of celebrating.

use std::sync::Arc;

use serde_json::Value;

use trellis_domain::error::Result;
use trellis_domain::message::{ChatMessage, Message, Role};
use trellis_graph::Node;
use trellis_ports::llm::ChatRequest;

use crate::bundle::TurnCtx;
use crate::state::{FastpathTicket, TurnDelta, TurnState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fastpath executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FastpathExecNode {
    ctx: Arc<TurnCtx>,
}

impl FastpathExecNode {
    pub fn new(ctx: Arc<TurnCtx>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Node<TurnState> for FastpathExecNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        let mut ticket = state.fastpath.clone();
        let args = Value::Object(
            ticket
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        );

        let outcome = self
            .ctx
            .caps
            .tools
            .call_tool(&ticket.tool, &args, &self.ctx.call_ctx, &self.ctx.publisher)
            .await;

        match outcome {
            Ok(result) if !result.is_error => {
                ticket.success = true;
                ticket.result = result.joined_text();
            }
            Ok(result) => {
                ticket.success = false;
                ticket.error = result.joined_text();
            }
            Err(e) => {
                ticket.success = false;
                ticket.error = e.to_string();
            }
        }
        ticket.complete = true;

        Ok(TurnDelta {
            fastpath: Some(ticket),
            node_number: Some(state.node_number + 1),
            ..TurnDelta::default()
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tiny confirmer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConfirmNode {
    ctx: Arc<TurnCtx>,
}

impl ConfirmNode {
    pub fn new(ctx: Arc<TurnCtx>) -> Self {
        Self { ctx }
    }

    /// Template fallback when the confirmation model is unavailable.
    fn template_confirmation(ticket: &FastpathTicket) -> String {
        if ticket.success {
            format!("Done — {} executed.", ticket.tool)
        } else {
            format!("That didn't work: {}", ticket.error)
        }
    }
}

#[async_trait::async_trait]
impl Node<TurnState> for ConfirmNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        let ticket = &state.fastpath;

        let outcome = if ticket.success {
            format!("succeeded with result: {}", ticket.result)
        } else {
            format!("failed with error: {}", ticket.error)
        };
        let prompt = format!(
            "The user said: \"{}\". The tool `{}` was executed and {}. \
             Reply with one short, friendly sentence confirming the outcome. \
             Do not mention tools.",
            state.query, ticket.tool, outcome
        );

        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(0.3),
            max_tokens: Some(60),
            json_mode: false,
            model: None,
        };

        let text = match self.ctx.caps.roles.classifier.invoke(req).await {
            Ok(resp) => {
                if let Some(usage) = resp.usage.as_ref() {
                    self.ctx.record_usage(usage);
                }
                let trimmed = resp.content.trim().to_string();
                if trimmed.is_empty() {
                    Self::template_confirmation(ticket)
                } else {
                    trimmed
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "confirmer model failed, using template");
                Self::template_confirmation(ticket)
            }
        };

        self.ctx.send_token(&text).await;

        let message = Message::new(
            self.ctx.call_ctx.conversation_id.clone(),
            Role::Assistant,
            text.clone(),
        );

        Ok(TurnDelta {
            response: Some(message),
            messages: vec![ChatMessage::assistant(text)],
            node_number: Some(state.node_number + 1),
            ..TurnDelta::default()
        })
    }
}
