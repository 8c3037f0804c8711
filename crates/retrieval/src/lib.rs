//! `trellis-retrieval` — vector retrieval over the index port.
//!
//! Chunks documents, embeds them through the language model port, runs
//! cosine searches, and reconstructs contiguous text with the
//! overlap-aware merge.

pub mod chunk;
pub mod merge;

pub use merge::MergedGroup;

use std::sync::Arc;

use serde_json::Value;

use trellis_domain::config::RetrievalConfig;
use trellis_domain::error::{Error, Result};
use trellis_ports::llm::LanguageModel;
use trellis_ports::vector::{
    ChunkMetadata, ChunkRecord, CollectionStats, ScoredChunk, VectorIndex,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retriever
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Retrieval service: ingestion and search over one vector index.
pub struct Retriever {
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn LanguageModel>,
    config: RetrievalConfig,
}

/// Outcome of a document ingestion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AddReport {
    pub source: String,
    pub chunks_added: usize,
}

impl Retriever {
    pub fn new(
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn LanguageModel>,
        config: RetrievalConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            vectors,
            embedder,
            config,
        })
    }

    /// Chunk, embed, and store a document under `source`.
    pub async fn add_document(
        &self,
        collection: &str,
        source: &str,
        text: &str,
        custom: Value,
    ) -> Result<AddReport> {
        if text.trim().is_empty() {
            return Err(Error::Validation("document text is empty".into()));
        }

        let chunks = chunk::chunk_text(text, self.config.chunk_size, self.config.chunk_overlap);
        let total = chunks.len();
        let embeddings = self.embedder.embed(chunks.clone()).await?;
        if embeddings.len() != total {
            return Err(Error::Model {
                model: self.embedder.model_id().to_string(),
                message: format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    total
                ),
            });
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (text, embedding))| ChunkRecord {
                id: format!("{source}_chunk_{index}_{now_ms}"),
                text,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    chunk_index: index,
                    total_chunks: total,
                    created_at_ms: now_ms,
                    custom: custom.clone(),
                },
                embedding,
            })
            .collect();

        self.vectors.ensure_collection(collection).await?;
        self.vectors.add(collection, records).await?;

        tracing::debug!(collection, source, chunks = total, "document ingested");
        Ok(AddReport {
            source: source.to_string(),
            chunks_added: total,
        })
    }

    /// Raw ranked hits for a query.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        let embeddings = self.embedder.embed(vec![query.to_string()]).await?;
        let embedding = embeddings.into_iter().next().ok_or_else(|| Error::Model {
            model: self.embedder.model_id().to_string(),
            message: "embedder returned no vector for query".into(),
        })?;

        self.vectors
            .search(
                collection,
                &embedding,
                top_k.unwrap_or(self.config.top_k),
                threshold.unwrap_or(self.config.score_threshold),
            )
            .await
    }

    /// Ranked hits folded into per-source merged groups.
    pub async fn search_merged(
        &self,
        collection: &str,
        query: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<MergedGroup>> {
        let hits = self.search(collection, query, top_k, threshold).await?;
        Ok(merge::merge_chunks(
            hits,
            self.config.min_merge_overlap,
            self.config.max_merge_fraction,
        ))
    }

    /// Delete all chunks of `source`. Returns the number removed.
    pub async fn delete_documents(&self, collection: &str, source: &str) -> Result<usize> {
        self.vectors.delete_by_source(collection, source).await
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.vectors.list_collections().await
    }

    pub async fn collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        self.vectors.collection_stats(collection).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
