//! `trellis-graph` — a typed-state graph scheduler.
//!
//! The graph is data: named nodes plus conditional edges evaluated over
//! the state after each node. Nodes are pure with respect to the state —
//! they receive a shared reference and return a delta; the scheduler
//! merges the delta through the state's reducers and follows the edge.
//! Cycles are legal; a transition guard stops a broken edge function
//! from spinning forever.
//!
//! One `run` call drives one turn: nodes execute strictly sequentially,
//! and the caller's cancel token is checked between nodes (I/O inside a
//! node observes the same token through its own capabilities).

pub mod reducer;
mod scheduler;

pub use scheduler::{Graph, GraphBuilder, GraphState, Node, END};
