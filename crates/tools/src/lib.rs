//! `trellis-tools` — tool servers and the registry that fronts them.
//!
//! Every tool call flows through [`ToolRegistry::call_tool`], which
//! validates arguments against the declared schema, wraps the dispatch in
//! lifecycle events (`tool_start` then exactly one of `tool_complete` /
//! `tool_error`), applies the per-tool timeout, and honors the turn's
//! cancel token.
//!
//! Built-in servers: web search, URL fetch (SSRF-guarded), shell
//! (blocklist-guarded), RAG over the vector index, and conversation
//! memory.

pub mod fetch;
pub mod memory_tools;
pub mod rag;
pub mod registry;
pub mod schema;
pub mod search;
pub mod server;
pub mod shell;

pub use registry::ToolRegistry;
pub use server::{CallContext, ToolServer};
