//! `trellis-providers` — language model adapters.
//!
//! One adapter covers every OpenAI-compatible endpoint (OpenAI, Azure-ish
//! gateways, Ollama, vLLM, LM Studio, Together). The crate also owns the
//! pieces every adapter shares: SSE draining, transient-error retry, and
//! the JSON extraction chain behind `invoke_structured`.

pub mod extract;
pub mod openai_compat;
pub mod retry;
pub mod roles;
mod sse;
mod util;

pub use openai_compat::OpenAiCompatModel;
pub use roles::ModelRoles;
