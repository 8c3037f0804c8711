//! The executor: plan cursor → specialized node dispatch.
//!
//! Reads `steps[current_step_index]` and sets `next_graph`; the graph's
//! conditional edge does the actual transition. An exhausted cursor ends
//! the graph. Dispatch arms are ordered by routing priority:
//! research/search over command over respond.

use trellis_domain::error::Result;
use trellis_domain::plan::StepKind;
use trellis_graph::Node;

use crate::state::{TurnDelta, TurnState};

/// Edge label the executor uses for "plan exhausted".
pub const LABEL_END: &str = "end";
pub const LABEL_SEARCH: &str = "search";
pub const LABEL_COMMAND: &str = "command";
pub const LABEL_RESPOND: &str = "respond";

/// Stateless: the dispatch decision is a pure function of the plan
/// cursor.
pub struct ExecutorNode;

/// Pure dispatch decision, exposed for tests.
pub(crate) fn dispatch_label(state: &TurnState) -> &'static str {
    let Some(plan) = state.execution_plan.as_ref() else {
        // No plan means the classifier routed direct; answer.
        return LABEL_RESPOND;
    };
    if state.current_step_index >= plan.steps.len() {
        return LABEL_END;
    }
    match plan.steps[state.current_step_index].kind() {
        StepKind::Search => LABEL_SEARCH,
        StepKind::Command => LABEL_COMMAND,
        StepKind::Respond => LABEL_RESPOND,
    }
}

#[async_trait::async_trait]
impl Node<TurnState> for ExecutorNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        let label = dispatch_label(state);
        tracing::debug!(
            step_index = state.current_step_index,
            next = label,
            "executor dispatch"
        );
        Ok(TurnDelta {
            next_graph: Some(label.to_string()),
            node_number: Some(state.node_number + 1),
            ..TurnDelta::default()
        })
    }
}
