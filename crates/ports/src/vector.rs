use serde::{Deserialize, Serialize};
use serde_json::Value;

use trellis_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Positional metadata carried by every stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Epoch milliseconds at ingestion.
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub custom: Value,
}

/// A chunk with its embedding, as stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// `"{source}_chunk_{index}_{epochMs}"`.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// A search hit: the chunk plus its cosine score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Aggregate statistics for a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub chunk_count: usize,
    pub source_count: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VectorIndex port
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Vector index port. Similarity is cosine. Concurrent adds and searches
/// against the same collection must be supported; deletes may race with
/// reads and need no serialization against them.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist.
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    async fn add(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<()>;

    /// Top-`k` hits with score ≥ `threshold`, best first.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredChunk>>;

    /// Delete all chunks whose `metadata.source` equals `source`.
    /// Returns the number removed.
    async fn delete_by_source(&self, collection: &str, source: &str) -> Result<usize>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats>;
}
