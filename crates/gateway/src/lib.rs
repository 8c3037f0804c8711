//! `trellis-gateway` — the `trellis` binary.
//!
//! Wires the in-process stores, model roles, tool servers, and the
//! orchestrator together, then serves the OpenAI-compatible HTTP API
//! (`trellis run`) or an interactive chat REPL (`trellis chat`).

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod state;
