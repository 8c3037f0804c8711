//! Executive summary generation.
//!
//! A background job rewrites the running long-horizon summary once a
//! conversation grows past the configured turn threshold. Failures are
//! logged and never surfaced to the turn that scheduled them.

use trellis_domain::error::Result;
use trellis_domain::message::{ChatMessage, Message, Role};
use trellis_ports::llm::{ChatRequest, LanguageModel};

/// Should a summary rewrite run for this conversation state?
pub fn should_summarize(messages: &[Message], after_turns: usize) -> bool {
    messages.iter().filter(|m| m.role == Role::User).count() > after_turns
}

/// Build the summarizer prompt over the full message history and any
/// previous summary.
pub fn summary_prompt(messages: &[Message], previous: Option<&str>) -> String {
    let mut conversation = String::new();
    for m in messages {
        let role = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        conversation.push_str(&format!("{role}: {}\n", m.content));
    }

    let previous_block = previous
        .map(|p| format!("PREVIOUS SUMMARY:\n{p}\n\n"))
        .unwrap_or_default();

    format!(
        "You are a conversation summarizer. Rewrite the executive summary of \
         the following conversation, preserving:\n\
         1. The user's ongoing goals\n\
         2. Key facts learned about the user or context\n\
         3. Decisions made and open threads\n\n\
         Be concise and write in present tense. Omit pleasantries.\n\n\
         {previous_block}CONVERSATION:\n{conversation}"
    )
}

/// Generate the new executive summary (non-streaming).
pub async fn generate_summary(
    model: &dyn LanguageModel,
    messages: &[Message],
    previous: Option<&str>,
    max_tokens: u32,
) -> Result<String> {
    let req = ChatRequest {
        messages: vec![ChatMessage::user(summary_prompt(messages, previous))],
        temperature: Some(0.1),
        max_tokens: Some(max_tokens),
        json_mode: false,
        model: None,
    };
    let resp = model.invoke(req).await?;
    Ok(resp.content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> Message {
        Message::new("c1", role, content)
    }

    #[test]
    fn threshold_counts_user_turns_only() {
        let messages = vec![
            msg(Role::User, "a"),
            msg(Role::Assistant, "b"),
            msg(Role::User, "c"),
            msg(Role::System, "d"),
        ];
        assert!(should_summarize(&messages, 1));
        assert!(!should_summarize(&messages, 2));
    }

    #[test]
    fn prompt_includes_previous_summary() {
        let messages = vec![msg(Role::User, "hello")];
        let prompt = summary_prompt(&messages, Some("old summary"));
        assert!(prompt.contains("PREVIOUS SUMMARY:\nold summary"));
        assert!(prompt.contains("user: hello"));
    }

    #[test]
    fn prompt_without_previous_summary() {
        let messages = vec![msg(Role::Assistant, "hi")];
        let prompt = summary_prompt(&messages, None);
        assert!(!prompt.contains("PREVIOUS SUMMARY"));
        assert!(prompt.contains("assistant: hi"));
    }
}
