//! `trellis-stores` — in-process implementations of the storage ports.
//!
//! These back tests, the CLI, and single-node deployments: a TTL-aware
//! key/value store with ordered lists and per-topic pub/sub, a message
//! document store with a unique sparse index on message id, and a cosine
//! vector index.

mod doc;
mod kv;
mod vector;

pub use doc::MemoryDocs;
pub use kv::MemoryKv;
pub use vector::MemoryVectors;
