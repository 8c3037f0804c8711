//! The turn graph: nodes wired to conditional edges.
//!
//! ```text
//! precheck ──fastpath──▶ fastpath_exec ──▶ confirm ──▶ END
//!     │
//!     └─────────────▶ classifier ──direct──▶ respond
//!                          │                   ▲ │
//!                        plan                  │ └─replan──▶ planner
//!                          ▼                   │                │
//!                       planner ──▶ executor ──┤◀───────────────┘
//!                                     │  ▲
//!                           search ◀──┘  │ (search re-injects steps,
//!                           command ◀────┤  so cycles run through the
//!                                        │  executor's cursor)
//!                           exhausted ──▶ END
//! ```

use std::sync::Arc;

use trellis_domain::error::Result;
use trellis_domain::plan::MAX_REPLANS;
use trellis_graph::{Graph, GraphBuilder, END};

use crate::bundle::TurnCtx;
use crate::nodes::classifier::ClassifierNode;
use crate::nodes::command::CommandNode;
use crate::nodes::executor::{self, ExecutorNode};
use crate::nodes::fastpath::{ConfirmNode, FastpathExecNode};
use crate::nodes::planner::PlannerNode;
use crate::nodes::precheck::PrecheckNode;
use crate::nodes::respond::RespondNode;
use crate::nodes::search::SearchNode;
use crate::state::{PrecheckDecision, RouterDecision, TurnState};

pub const ENTRY: &str = "precheck";

/// Build the per-turn graph over a shared [`TurnCtx`].
pub fn build_turn_graph(ctx: &Arc<TurnCtx>) -> Result<Graph<TurnState>> {
    GraphBuilder::new()
        .node("precheck", Arc::new(PrecheckNode::new(ctx.clone())))
        .node("fastpath_exec", Arc::new(FastpathExecNode::new(ctx.clone())))
        .node("confirm", Arc::new(ConfirmNode::new(ctx.clone())))
        .node("classifier", Arc::new(ClassifierNode::new(ctx.clone())))
        .node("planner", Arc::new(PlannerNode::new(ctx.clone())))
        .node("executor", Arc::new(ExecutorNode))
        .node("search", Arc::new(SearchNode::new(ctx.clone())))
        .node("command", Arc::new(CommandNode::new(ctx.clone())))
        .node("respond", Arc::new(RespondNode::new(ctx.clone())))
        .edge("precheck", |s: &TurnState| {
            match s.precheck_decision {
                PrecheckDecision::Fastpath => "fastpath_exec".into(),
                _ => "classifier".into(),
            }
        })
        .fixed_edge("fastpath_exec", "confirm")
        .fixed_edge("confirm", END)
        .edge("classifier", |s: &TurnState| match s.router_decision {
            RouterDecision::Plan => "planner".into(),
            _ => "respond".into(),
        })
        .fixed_edge("planner", "executor")
        .edge("executor", |s: &TurnState| match s.next_graph.as_str() {
            executor::LABEL_SEARCH => "search".into(),
            executor::LABEL_COMMAND => "command".into(),
            executor::LABEL_RESPOND => "respond".into(),
            _ => END.into(),
        })
        .fixed_edge("search", "executor")
        .fixed_edge("command", "executor")
        .edge("respond", |s: &TurnState| {
            if s.request_replan && s.replanned_count < MAX_REPLANS {
                "planner".into()
            } else {
                END.into()
            }
        })
        .build()
}
