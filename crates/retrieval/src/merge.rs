//! Overlap-aware chunk merging.
//!
//! Reconstructs contiguous text from overlapping chunks that share a
//! source. The algorithm is deterministic:
//!
//! 1. Group hits by `metadata.source`.
//! 2. Within a group, sort by `chunk_index` ascending, ties by score
//!    descending.
//! 3. Fold left-to-right: for consecutive chunk texts `A`, `B`, find the
//!    largest `L` with `min_overlap ≤ L ≤ max_fraction·min(|A|,|B|)` such
//!    that the accumulator's last `L` characters equal `B`'s first `L`.
//!    On a hit append `B[L..]`, otherwise append `"\n\n" + B`.
//! 4. Each group carries the mean score and its chunk count; groups are
//!    returned sorted by mean score descending.
//!
//! Merging a single-element group returns the original text, and merging
//! an already-merged result changes nothing — both properties are pinned
//! by tests.

use serde::Serialize;

use trellis_ports::vector::ScoredChunk;

/// One merged source group.
#[derive(Debug, Clone, Serialize)]
pub struct MergedGroup {
    pub source: String,
    pub text: String,
    pub avg_score: f32,
    pub merged_chunks: usize,
}

/// Largest overlap length within `[min_overlap, max_l]` where the tail of
/// `acc` equals the head of `next`. Lengths are characters.
fn overlap_len(
    acc: &[char],
    prev_chunk_len: usize,
    next: &[char],
    min_overlap: usize,
    max_fraction: f64,
) -> Option<usize> {
    let shorter = prev_chunk_len.min(next.len());
    let max_l = ((shorter as f64) * max_fraction).floor() as usize;
    let max_l = max_l.min(acc.len()).min(next.len());

    for l in (min_overlap..=max_l).rev() {
        if acc[acc.len() - l..] == next[..l] {
            return Some(l);
        }
    }
    None
}

/// Merge a ranked hit list into per-source groups.
pub fn merge_chunks(
    hits: Vec<ScoredChunk>,
    min_overlap: usize,
    max_fraction: f64,
) -> Vec<MergedGroup> {
    // Group by source, preserving first-seen order (final order is by
    // score anyway; this keeps the fold deterministic).
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<ScoredChunk>> =
        std::collections::HashMap::new();
    for hit in hits {
        if !groups.contains_key(&hit.metadata.source) {
            order.push(hit.metadata.source.clone());
        }
        groups.entry(hit.metadata.source.clone()).or_default().push(hit);
    }

    let mut merged: Vec<MergedGroup> = order
        .into_iter()
        .map(|source| {
            let mut chunks = groups.remove(&source).expect("group exists");
            chunks.sort_by(|a, b| {
                a.metadata
                    .chunk_index
                    .cmp(&b.metadata.chunk_index)
                    .then_with(|| b.score.total_cmp(&a.score))
            });

            let avg_score =
                chunks.iter().map(|c| c.score).sum::<f32>() / chunks.len() as f32;
            let merged_chunks = chunks.len();

            let mut iter = chunks.into_iter();
            let first = iter.next().expect("group is non-empty");
            let mut acc: Vec<char> = first.text.chars().collect();
            let mut prev_len = acc.len();

            for chunk in iter {
                let next: Vec<char> = chunk.text.chars().collect();
                match overlap_len(&acc, prev_len, &next, min_overlap, max_fraction) {
                    Some(l) => acc.extend(&next[l..]),
                    None => {
                        acc.push('\n');
                        acc.push('\n');
                        acc.extend(&next);
                    }
                }
                prev_len = next.len();
            }

            MergedGroup {
                source,
                text: acc.into_iter().collect(),
                avg_score,
                merged_chunks,
            }
        })
        .collect();

    merged.sort_by(|a, b| b.avg_score.total_cmp(&a.avg_score));
    merged
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use trellis_ports::vector::ChunkMetadata;

    const MIN_OVERLAP: usize = 50;
    const MAX_FRACTION: f64 = 0.8;

    fn hit(source: &str, index: usize, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            id: format!("{source}_chunk_{index}_0"),
            text: text.into(),
            metadata: ChunkMetadata {
                source: source.into(),
                chunk_index: index,
                total_chunks: 0,
                created_at_ms: 0,
                custom: serde_json::Value::Null,
            },
            score,
        }
    }

    /// Deterministic pseudo-prose long enough for real overlaps.
    fn long_text(chars: usize) -> String {
        let words = [
            "graph", "router", "plan", "search", "merge", "stream", "event", "chunk", "node",
            "memory",
        ];
        let mut out = String::new();
        let mut i = 0usize;
        while out.chars().count() < chars {
            out.push_str(words[i % words.len()]);
            out.push_str(&i.to_string());
            out.push(' ');
            i += 1;
        }
        out.chars().take(chars).collect()
    }

    #[test]
    fn single_chunk_returns_original_text() {
        let groups = merge_chunks(
            vec![hit("doc", 0, "just one chunk of text", 0.9)],
            MIN_OVERLAP,
            MAX_FRACTION,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].text, "just one chunk of text");
        assert_eq!(groups[0].merged_chunks, 1);
        assert!((groups[0].avg_score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn overlapping_chunks_reconstruct_without_seams() {
        let original = long_text(8000);
        let chunks = chunk_text(&original, 2000, 200);
        assert!(chunks.len() >= 2);

        let hits: Vec<ScoredChunk> = chunks
            .iter()
            .enumerate()
            .map(|(i, text)| hit("doc", i, text, 0.8))
            .collect();

        let groups = merge_chunks(hits, MIN_OVERLAP, MAX_FRACTION);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].merged_chunks >= 2);
        assert_eq!(groups[0].text, original, "merge must reproduce the source text");

        // No duplicated 200-char seam anywhere.
        let seam: String = chunks[1].chars().take(200).collect();
        let occurrences = groups[0].text.matches(&seam).count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn merge_is_idempotent() {
        let original = long_text(5000);
        let chunks = chunk_text(&original, 2000, 200);
        let hits: Vec<ScoredChunk> = chunks
            .iter()
            .enumerate()
            .map(|(i, text)| hit("doc", i, text, 0.7))
            .collect();

        let first_pass = merge_chunks(hits, MIN_OVERLAP, MAX_FRACTION);
        let again = merge_chunks(
            vec![hit("doc", 0, &first_pass[0].text, first_pass[0].avg_score)],
            MIN_OVERLAP,
            MAX_FRACTION,
        );
        assert_eq!(again[0].text, first_pass[0].text);
    }

    #[test]
    fn non_overlapping_chunks_join_with_blank_line() {
        let a = long_text(200);
        let b: String = long_text(400).chars().skip(200).collect();
        let groups = merge_chunks(
            vec![hit("doc", 0, &a, 0.9), hit("doc", 5, &b, 0.8)],
            MIN_OVERLAP,
            MAX_FRACTION,
        );
        assert_eq!(groups[0].text, format!("{a}\n\n{b}"));
    }

    #[test]
    fn tiny_overlaps_below_minimum_are_not_stitched() {
        // 10-char overlap is below the 50-char minimum: must not merge.
        let a = "x".repeat(90) + "abcdefghij";
        let b = "abcdefghij".to_string() + &"y".repeat(90);
        let groups = merge_chunks(
            vec![hit("doc", 0, &a, 0.9), hit("doc", 1, &b, 0.9)],
            MIN_OVERLAP,
            MAX_FRACTION,
        );
        assert!(groups[0].text.contains("\n\n"));
    }

    #[test]
    fn groups_are_separate_per_source_and_sorted_by_score() {
        let groups = merge_chunks(
            vec![
                hit("low", 0, &long_text(100), 0.3),
                hit("high", 0, &long_text(100), 0.9),
                hit("high", 1, &long_text(100), 0.7),
            ],
            MIN_OVERLAP,
            MAX_FRACTION,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].source, "high");
        assert!((groups[0].avg_score - 0.8).abs() < 1e-6);
        assert_eq!(groups[0].merged_chunks, 2);
        assert_eq!(groups[1].source, "low");
    }

    #[test]
    fn out_of_order_hits_are_sorted_by_chunk_index() {
        let original = long_text(5000);
        let chunks = chunk_text(&original, 2000, 200);
        let mut hits: Vec<ScoredChunk> = chunks
            .iter()
            .enumerate()
            .map(|(i, text)| hit("doc", i, text, 0.6))
            .collect();
        hits.reverse(); // ranked order ≠ positional order

        let groups = merge_chunks(hits, MIN_OVERLAP, MAX_FRACTION);
        assert_eq!(groups[0].text, original);
    }

    #[test]
    fn overlap_capped_by_fraction_of_shorter_text() {
        // Overlap of 80 chars, but next chunk is only 90 chars long:
        // 0.8 * 90 = 72 < 80, so the full overlap cannot be used and the
        // texts join with a separator instead of stitching.
        let shared = long_text(80);
        let a = format!("{}{}", long_text(200).chars().rev().collect::<String>(), shared);
        let b = format!("{}0123456789", shared);
        let groups = merge_chunks(
            vec![hit("doc", 0, &a, 0.5), hit("doc", 1, &b, 0.5)],
            MIN_OVERLAP,
            MAX_FRACTION,
        );
        assert!(groups[0].text.contains("\n\n"));
    }
}
