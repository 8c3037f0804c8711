//! Character-based document chunking with overlap.

/// Split `text` into chunks of at most `chunk_size` characters where
/// consecutive chunks share `overlap` trailing/leading characters.
///
/// Operates on characters (not bytes) so multi-byte text chunks cleanly.
/// `overlap` is clamped below `chunk_size` to guarantee forward progress.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }

    chunks
}
