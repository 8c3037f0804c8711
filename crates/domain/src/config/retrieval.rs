use serde::{Deserialize, Serialize};

/// Vector retrieval defaults: chunking geometry, search cut-offs, and the
/// overlap-merge window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Characters per chunk.
    #[serde(default = "d_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[serde(default = "d_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "d_top_k")]
    pub top_k: usize,

    /// Minimum cosine score for a hit to be returned.
    #[serde(default = "d_score_threshold")]
    pub score_threshold: f32,

    /// Smallest overlap the merge will stitch on, characters.
    #[serde(default = "d_min_merge_overlap")]
    pub min_merge_overlap: usize,

    /// Overlap never exceeds this fraction of the shorter text.
    #[serde(default = "d_max_merge_fraction")]
    pub max_merge_fraction: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: d_chunk_size(),
            chunk_overlap: d_chunk_overlap(),
            top_k: d_top_k(),
            score_threshold: d_score_threshold(),
            min_merge_overlap: d_min_merge_overlap(),
            max_merge_fraction: d_max_merge_fraction(),
        }
    }
}

fn d_chunk_size() -> usize {
    2000
}
fn d_chunk_overlap() -> usize {
    200
}
fn d_top_k() -> usize {
    5
}
fn d_score_threshold() -> f32 {
    0.6
}
fn d_min_merge_overlap() -> usize {
    50
}
fn d_max_merge_fraction() -> f64 {
    0.8
}
