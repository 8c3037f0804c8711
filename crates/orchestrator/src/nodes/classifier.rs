//! Router tier 1 — the fast classifier.
//!
//! A small model answers `direct | plan` with a confidence. Low
//! confidence coerces to `plan` (the planner can always decide to just
//! respond); an unparseable answer falls back to the respond branch.

use std::sync::Arc;

use serde_json::{json, Value};

use trellis_domain::error::Result;
use trellis_domain::message::ChatMessage;
use trellis_graph::Node;
use trellis_ports::llm::ChatRequest;

use crate::bundle::TurnCtx;
use crate::state::{RouterDecision, TurnDelta, TurnState};

fn classifier_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "decision": { "type": "string", "enum": ["direct", "plan"] },
            "confidence": { "type": "number" },
            "reasoning": { "type": "string" }
        },
        "required": ["decision", "confidence"]
    })
}

/// Parsed classifier verdict.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Verdict {
    pub decision: RouterDecision,
    pub confidence: f64,
    pub reasoning: String,
}

/// Decode the model's JSON, applying the low-confidence coercion.
pub(crate) fn decode_verdict(value: &Value, min_confidence: f64) -> Verdict {
    let decision_str = value
        .get("decision")
        .and_then(|d| d.as_str())
        .unwrap_or("direct")
        .to_ascii_lowercase();
    let confidence = value
        .get("confidence")
        .and_then(|c| c.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let reasoning = value
        .get("reasoning")
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .to_string();

    let decision = if confidence < min_confidence {
        RouterDecision::Plan
    } else if decision_str == "plan" {
        RouterDecision::Plan
    } else {
        RouterDecision::Direct
    };

    Verdict {
        decision,
        confidence,
        reasoning,
    }
}

pub struct ClassifierNode {
    ctx: Arc<TurnCtx>,
}

impl ClassifierNode {
    pub fn new(ctx: Arc<TurnCtx>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Node<TurnState> for ClassifierNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        let system = "You are a routing classifier for an assistant. Decide whether the \
                      user's message can be answered directly from general knowledge and \
                      conversation context (\"direct\"), or needs tools such as web search \
                      or command execution (\"plan\"). Answer with JSON only.";

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(state.context_messages.iter().cloned());
        messages.push(ChatMessage::user(format!(
            "Classify this message: {}",
            state.query
        )));

        let req = ChatRequest {
            messages,
            temperature: Some(0.0),
            max_tokens: Some(200),
            json_mode: true,
            model: None,
        };

        let min = self.ctx.caps.config.router.classifier_min_confidence;
        let verdict = match self
            .ctx
            .caps
            .roles
            .classifier
            .invoke_structured(req, &classifier_schema())
            .await
        {
            Ok(value) => decode_verdict(&value, min),
            Err(e) => {
                // Model-format failure: fall back to the respond branch.
                tracing::warn!(error = %e, "classifier failed, routing direct");
                Verdict {
                    decision: RouterDecision::Direct,
                    confidence: 0.0,
                    reasoning: "classifier unavailable".into(),
                }
            }
        };

        self.ctx
            .publisher
            .status(
                "routing",
                match verdict.decision {
                    RouterDecision::Plan => "building a plan",
                    _ => "answering directly",
                },
                Some(verdict.reasoning.clone()),
                Some(verdict.confidence),
            )
            .await;

        Ok(TurnDelta {
            router_decision: Some(verdict.decision),
            node_number: Some(state.node_number + 1),
            ..TurnDelta::default()
        })
    }
}
