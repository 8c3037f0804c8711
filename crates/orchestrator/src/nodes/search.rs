//! The search node — the only looping node.
//!
//! One visit = one `web_search` call plus a sufficiency check. When the
//! evaluator wants a refined query, a new search step is injected right
//! after the current one, so the loop runs through the executor in
//! strict step order. The iteration counter caps the loop at
//! [`MAX_SEARCH_ITERATIONS`]; reaching the cap forces the cursor
//! forward. An evaluator failure counts as sufficient — a stalled turn
//! is worse than a mediocre search.

use std::sync::Arc;

use serde_json::{json, Value};

use trellis_domain::error::Result;
use trellis_domain::message::ChatMessage;
use trellis_domain::plan::Step;
use trellis_graph::Node;
use trellis_ports::llm::ChatRequest;

use crate::bundle::TurnCtx;
use crate::state::{TurnDelta, TurnState};

/// Hard cap on search calls per turn.
pub const MAX_SEARCH_ITERATIONS: u8 = 5;

fn evaluator_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sufficient": { "type": "boolean" },
            "reasoning": { "type": "string" },
            "newSearchQuery": { "type": "string" }
        },
        "required": ["sufficient"]
    })
}

/// Evaluator verdict over one batch of results.
#[derive(Debug, Clone)]
pub(crate) struct Sufficiency {
    pub sufficient: bool,
    pub new_query: Option<String>,
}

pub(crate) fn decode_sufficiency(value: &Value) -> Sufficiency {
    let sufficient = value
        .get("sufficient")
        .and_then(|s| s.as_bool())
        .unwrap_or(true);
    let new_query = value
        .get("newSearchQuery")
        .or_else(|| value.get("new_search_query"))
        .and_then(|q| q.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(String::from);
    Sufficiency {
        sufficient,
        new_query,
    }
}

pub struct SearchNode {
    ctx: Arc<TurnCtx>,
}

impl SearchNode {
    pub fn new(ctx: Arc<TurnCtx>) -> Self {
        Self { ctx }
    }

    async fn evaluate(&self, state: &TurnState, query: &str, results: &str) -> Sufficiency {
        let context: String = state
            .context_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "USER QUESTION: {}\nSEARCH QUERY: {query}\nRESULTS:\n{results}\n\n\
             CONVERSATION CONTEXT:\n{context}\n\n\
             Are these results sufficient to answer the user's question? Reply with JSON: \
             {{\"sufficient\": bool, \"reasoning\": string, \"newSearchQuery\": string?}}. \
             Only set newSearchQuery when a refined query would clearly do better.",
            state.query
        );

        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(0.0),
            max_tokens: Some(300),
            json_mode: true,
            model: None,
        };

        match self
            .ctx
            .caps
            .roles
            .evaluator
            .invoke_structured(req, &evaluator_schema())
            .await
        {
            Ok(value) => decode_sufficiency(&value),
            Err(e) => {
                // Do not stall the turn on evaluator trouble.
                tracing::warn!(error = %e, "search evaluator failed, treating as sufficient");
                Sufficiency {
                    sufficient: true,
                    new_query: None,
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Node<TurnState> for SearchNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        let Some(Step::Search { search_query, .. }) = state.current_step() else {
            // Defensive: a mis-dispatched step just advances the cursor.
            tracing::warn!("search node reached without a search step");
            return Ok(TurnDelta {
                current_step_index: Some(state.current_step_index + 1),
                node_number: Some(state.node_number + 1),
                ..TurnDelta::default()
            });
        };
        let query = search_query.clone();
        let iterations_after = state.search_iterations.saturating_add(1);

        self.ctx
            .publisher
            .status("tool_status", &format!("searching: {query}"), None, None)
            .await;

        // One web_search call. Failures become responder context rather
        // than turn aborts.
        let args = json!({ "query": query });
        let (results_text, search_failed) = match self
            .ctx
            .caps
            .tools
            .call_tool("web_search", &args, &self.ctx.call_ctx, &self.ctx.publisher)
            .await
        {
            Ok(result) if !result.is_error => (result.joined_text(), false),
            Ok(result) => (format!("Search failed: {}", result.joined_text()), true),
            Err(e) => (format!("Search failed: {e}"), true),
        };

        let context_message = ChatMessage::system(format!(
            "Search results for \"{query}\":\n{results_text}"
        ));

        // Failed searches advance without evaluation.
        if search_failed {
            return Ok(TurnDelta {
                messages: vec![context_message],
                current_step_index: Some(state.current_step_index + 1),
                search_iterations: Some(iterations_after),
                node_number: Some(state.node_number + 1),
                ..TurnDelta::default()
            });
        }

        let verdict = self.evaluate(state, &query, &results_text).await;

        let mut delta = TurnDelta {
            messages: vec![context_message],
            current_step_index: Some(state.current_step_index + 1),
            search_iterations: Some(iterations_after),
            node_number: Some(state.node_number + 1),
            ..TurnDelta::default()
        };

        // Refine only while under the cap; the cap forces advance.
        if !verdict.sufficient && iterations_after < MAX_SEARCH_ITERATIONS {
            if let (Some(new_query), Some(mut plan)) =
                (verdict.new_query, state.execution_plan.clone())
            {
                plan.insert_after(
                    state.current_step_index,
                    Step::Search {
                        purpose: "Refine previous search".into(),
                        search_query: new_query,
                    },
                );
                delta.execution_plan = Some(plan);
            }
        }

        Ok(delta)
    }
}
