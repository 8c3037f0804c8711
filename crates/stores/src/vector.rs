//! In-process cosine vector index.
//!
//! Collections are plain chunk lists scored by brute-force cosine
//! similarity — the right trade-off for an embedded reference index, and
//! the scoring matches what an HNSW-backed store configured for cosine
//! space returns.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use trellis_domain::error::{Error, Result};
use trellis_ports::vector::{ChunkRecord, CollectionStats, ScoredChunk, VectorIndex};

/// Cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for mismatched lengths or a
/// zero-magnitude side.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            len_a = a.len(),
            len_b = b.len(),
            "cosine_similarity: mismatched vector lengths, returning 0.0"
        );
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// In-memory [`VectorIndex`].
#[derive(Default)]
pub struct MemoryVectors {
    collections: RwLock<HashMap<String, Vec<ChunkRecord>>>,
}

impl MemoryVectors {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryVectors {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    async fn add(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .extend(chunks);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.read();
        let chunks = collections
            .get(collection)
            .ok_or_else(|| Error::Store(format!("unknown collection: {collection}")))?;

        let mut hits: Vec<ScoredChunk> = chunks
            .iter()
            .map(|c| ScoredChunk {
                id: c.id.clone(),
                text: c.text.clone(),
                metadata: c.metadata.clone(),
                score: cosine_similarity(embedding, &c.embedding),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_by_source(&self, collection: &str, source: &str) -> Result<usize> {
        let mut collections = self.collections.write();
        let chunks = collections
            .get_mut(collection)
            .ok_or_else(|| Error::Store(format!("unknown collection: {collection}")))?;
        let before = chunks.len();
        chunks.retain(|c| c.metadata.source != source);
        Ok(before - chunks.len())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        let collections = self.collections.read();
        let chunks = collections
            .get(collection)
            .ok_or_else(|| Error::Store(format!("unknown collection: {collection}")))?;
        let sources: HashSet<&str> = chunks.iter().map(|c| c.metadata.source.as_str()).collect();
        Ok(CollectionStats {
            name: collection.to_string(),
            chunk_count: chunks.len(),
            source_count: sources.len(),
        })
    }
}
