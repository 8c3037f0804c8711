//! Turn state: the graph's typed channels.
//!
//! `messages` is the single append channel; every other channel
//! replaces. Deltas model "no write" as `None` (or an empty list), so a
//! node only touches the channels it names.

use std::collections::HashMap;

use trellis_domain::message::{ChatMessage, Message};
use trellis_domain::plan::ExecutionPlan;
use trellis_graph::{reducer, GraphState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channel value types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrecheckDecision {
    #[default]
    Pending,
    Fastpath,
    Classifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouterDecision {
    #[default]
    Pending,
    Direct,
    Plan,
}

/// The fastpath ticket filled by precheck and consumed by the fastpath
/// executor and confirmer.
#[derive(Debug, Clone, Default)]
pub struct FastpathTicket {
    pub tool: String,
    pub server: String,
    pub parameters: HashMap<String, String>,
    pub success: bool,
    pub result: String,
    pub error: String,
    pub message: String,
    pub complete: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One instance per turn, discarded after streaming.
#[derive(Debug, Clone, Default)]
pub struct TurnState {
    /// Original user query text.
    pub query: String,
    /// Accumulated model-visible turns (append channel).
    pub messages: Vec<ChatMessage>,
    /// Final assistant message, set by the responder/confirmer.
    pub response: Option<Message>,
    /// Next specialized node label, set by the executor.
    pub next_graph: String,
    /// Per-turn event-topic key.
    pub message_id: String,
    /// Pre-loaded conversation slice (summary already folded in).
    pub context_messages: Vec<ChatMessage>,
    pub execution_plan: Option<ExecutionPlan>,
    pub current_step_index: usize,
    pub request_replan: bool,
    pub replan_reason: String,
    pub replanned_count: u8,
    pub search_iterations: u8,
    pub precheck_decision: PrecheckDecision,
    pub fastpath: FastpathTicket,
    pub router_decision: RouterDecision,
    /// Diagnostic position counter.
    pub node_number: u32,
}

/// Partial state returned by nodes.
#[derive(Debug, Default)]
pub struct TurnDelta {
    pub messages: Vec<ChatMessage>,
    pub response: Option<Message>,
    pub next_graph: Option<String>,
    pub execution_plan: Option<ExecutionPlan>,
    pub current_step_index: Option<usize>,
    pub request_replan: Option<bool>,
    pub replan_reason: Option<String>,
    pub replanned_count: Option<u8>,
    pub search_iterations: Option<u8>,
    pub precheck_decision: Option<PrecheckDecision>,
    pub fastpath: Option<FastpathTicket>,
    pub router_decision: Option<RouterDecision>,
    pub node_number: Option<u32>,
}

impl GraphState for TurnState {
    type Delta = TurnDelta;

    fn apply(&mut self, delta: TurnDelta) {
        reducer::append(&mut self.messages, delta.messages);
        if delta.response.is_some() {
            self.response = delta.response;
        }
        reducer::replace(&mut self.next_graph, delta.next_graph);
        if delta.execution_plan.is_some() {
            self.execution_plan = delta.execution_plan;
        }
        reducer::replace(&mut self.current_step_index, delta.current_step_index);
        reducer::replace(&mut self.request_replan, delta.request_replan);
        reducer::replace(&mut self.replan_reason, delta.replan_reason);
        reducer::replace(&mut self.replanned_count, delta.replanned_count);
        reducer::replace(&mut self.search_iterations, delta.search_iterations);
        reducer::replace(&mut self.precheck_decision, delta.precheck_decision);
        if let Some(ticket) = delta.fastpath {
            self.fastpath = ticket;
        }
        reducer::replace(&mut self.router_decision, delta.router_decision);
        reducer::replace(&mut self.node_number, delta.node_number);
    }
}

impl TurnState {
    /// The plan step the executor is pointing at, if any.
    pub fn current_step(&self) -> Option<&trellis_domain::plan::Step> {
        self.execution_plan
            .as_ref()
            .and_then(|p| p.steps.get(self.current_step_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_domain::plan::Step;

    #[test]
    fn messages_append_while_scalars_replace() {
        let mut state = TurnState {
            query: "q".into(),
            messages: vec![ChatMessage::user("hi")],
            ..TurnState::default()
        };

        state.apply(TurnDelta {
            messages: vec![ChatMessage::system("ctx")],
            current_step_index: Some(2),
            ..TurnDelta::default()
        });

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.current_step_index, 2);
        assert_eq!(state.query, "q");
    }

    #[test]
    fn empty_delta_is_identity_on_scalars() {
        let mut state = TurnState {
            replanned_count: 2,
            search_iterations: 3,
            ..TurnState::default()
        };
        state.apply(TurnDelta::default());
        assert_eq!(state.replanned_count, 2);
        assert_eq!(state.search_iterations, 3);
        assert!(state.messages.is_empty());
    }

    #[test]
    fn current_step_tracks_index() {
        let mut state = TurnState::default();
        state.apply(TurnDelta {
            execution_plan: Some(ExecutionPlan {
                reasoning: String::new(),
                steps: vec![
                    Step::Search {
                        purpose: "p".into(),
                        search_query: "q".into(),
                    },
                    Step::respond("answer"),
                ],
                replanned_count: 0,
            }),
            ..TurnDelta::default()
        });

        assert!(matches!(state.current_step(), Some(Step::Search { .. })));
        state.apply(TurnDelta {
            current_step_index: Some(1),
            ..TurnDelta::default()
        });
        assert!(matches!(state.current_step(), Some(Step::Respond { .. })));
        state.apply(TurnDelta {
            current_step_index: Some(2),
            ..TurnDelta::default()
        });
        assert!(state.current_step().is_none());
    }
}
