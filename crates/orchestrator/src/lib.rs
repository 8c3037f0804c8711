//! `trellis-orchestrator` — the execution-graph runtime behind
//! `respond()`.
//!
//! One turn flows: persist the user message → precheck (regex fastpath)
//! → classifier (direct vs plan) → planner → executor → specialized
//! nodes (search / command) → responder → stream tokens and one usage
//! record → persist the assistant message → schedule summarization.
//!
//! Nodes receive a capability bundle (models, memory, tools, events) as
//! a constructor parameter; graph state carries only data.

pub mod bundle;
pub mod graph_def;
pub mod inadequate;
pub mod nodes;
pub mod orchestrator;
pub mod state;

pub use bundle::{Capabilities, TurnCtx};
pub use orchestrator::{derive_conversation_id, Orchestrator, RespondOptions, Source};
pub use state::{PrecheckDecision, RouterDecision, TurnDelta, TurnState};
