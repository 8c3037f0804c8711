//! `trellis-ports` — capability ports the core consumes.
//!
//! Pure contracts, no policy: language models, the key/value store, the
//! message document store, the vector index, and token counting.
//! Implementations live outside the core (`trellis-providers`,
//! `trellis-stores`) and are threaded to nodes through the capability
//! bundle rather than global state.

pub mod counter;
pub mod doc;
pub mod kv;
pub mod llm;
pub mod vector;

pub use counter::{HeuristicTokenCounter, TokenCounter};
pub use doc::DocStore;
pub use kv::KvStore;
pub use llm::{ChatRequest, ChatResponse, LanguageModel};
pub use vector::{ChunkRecord, ChunkMetadata, CollectionStats, ScoredChunk, VectorIndex};
