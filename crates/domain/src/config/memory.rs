use serde::{Deserialize, Serialize};

/// Conversation memory settings: context budget and executive-summary
/// lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget for the per-turn context block.
    #[serde(default = "d_context_max_tokens")]
    pub context_max_tokens: usize,

    /// Rewrite the executive summary once a conversation has more user
    /// turns than this.
    #[serde(default = "d_summarize_after_turns")]
    pub summarize_after_turns: usize,

    /// Upper bound requested from the summarizer model.
    #[serde(default = "d_summary_max_tokens")]
    pub summary_max_tokens: u32,

    /// Heuristic token counter divisor (characters per token).
    #[serde(default = "d_chars_per_token")]
    pub chars_per_token: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_max_tokens: d_context_max_tokens(),
            summarize_after_turns: d_summarize_after_turns(),
            summary_max_tokens: d_summary_max_tokens(),
            chars_per_token: d_chars_per_token(),
        }
    }
}

fn d_context_max_tokens() -> usize {
    4000
}
fn d_summarize_after_turns() -> usize {
    12
}
fn d_summary_max_tokens() -> u32 {
    512
}
fn d_chars_per_token() -> usize {
    4
}
