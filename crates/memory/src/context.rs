//! Context block assembly under a token budget.
//!
//! The budget is a hard ceiling: when the untrimmed message sequence would
//! exceed it, the oldest prefix is replaced by the conversation's
//! executive summary (when one exists and itself fits).

use trellis_domain::message::{ChatMessage, Message};
use trellis_ports::counter::TokenCounter;

/// The per-turn conversation slice handed to the router, planner, and
/// responder. `total_tokens` never exceeds the requested budget.
#[derive(Debug, Clone, Default)]
pub struct ContextBlock {
    pub messages: Vec<Message>,
    pub summary: Option<String>,
    pub total_tokens: usize,
}

impl ContextBlock {
    /// Model-visible projection: the summary (if any) leads as a system
    /// message, followed by the kept turns.
    pub fn as_chat_messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(ref summary) = self.summary {
            out.push(ChatMessage::system(format!(
                "Conversation summary so far:\n{summary}"
            )));
        }
        out.extend(self.messages.iter().map(Message::as_chat));
        out
    }
}

/// Remove duplicate ids, first occurrence wins. Cache reads pass through
/// here because the KV list is append-only and crash-retries can double-
/// write.
pub fn dedup_by_id(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = std::collections::HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect()
}

/// Fit `messages` (oldest first) plus an optional summary into
/// `max_tokens`.
///
/// Newest messages are kept preferentially. The summary is only attached
/// when messages had to be dropped and the summary itself fits the
/// remaining budget.
pub fn fit_to_budget(
    messages: Vec<Message>,
    summary: Option<String>,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> ContextBlock {
    let full_tokens: usize = messages.iter().map(|m| counter.count(&m.content)).sum();
    if full_tokens <= max_tokens {
        return ContextBlock {
            messages,
            summary: None,
            total_tokens: full_tokens,
        };
    }

    let summary_tokens = summary.as_deref().map(|s| counter.count(s)).unwrap_or(0);
    let (summary, reserved) = if summary.is_some() && summary_tokens < max_tokens {
        (summary, summary_tokens)
    } else {
        (None, 0)
    };

    // Walk from the newest message backwards, keeping what fits.
    let mut kept = Vec::new();
    let mut used = reserved;
    for message in messages.into_iter().rev() {
        let cost = counter.count(&message.content);
        if used + cost > max_tokens {
            break;
        }
        used += cost;
        kept.push(message);
    }
    kept.reverse();

    ContextBlock {
        messages: kept,
        summary,
        total_tokens: used,
    }
}
