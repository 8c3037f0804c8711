//! `trellis chat` — interactive REPL.
//!
//! Each line becomes one turn; tokens stream to stdout as they arrive.

use std::io::Write;
use std::sync::Arc;

use futures_util::StreamExt;

use trellis_domain::config::Config;
use trellis_domain::stream::ReplyChunk;
use trellis_events::CancelToken;
use trellis_orchestrator::RespondOptions;

use crate::bootstrap;

/// Run the chat REPL until Ctrl+D or `/exit`.
pub async fn chat(config: Arc<Config>, conversation: Option<String>) -> anyhow::Result<()> {
    let (state, heartbeat) = bootstrap::build_app_state(config).await?;

    let conversation_id =
        conversation.unwrap_or_else(|| format!("chat_{}", uuid::Uuid::new_v4()));

    let mut rl = rustyline::DefaultEditor::new()?;
    eprintln!("trellis chat — conversation {conversation_id}");
    eprintln!("Ctrl+D or /exit to quit");
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == "/exit" {
                    break;
                }
                rl.add_history_entry(&line).ok();

                if let Err(e) = send_message(&state, &conversation_id, trimmed).await {
                    eprintln!("\x1B[31merror: {e}\x1B[0m");
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    heartbeat.stop().await;
    Ok(())
}

async fn send_message(
    state: &crate::state::AppState,
    conversation_id: &str,
    message: &str,
) -> anyhow::Result<()> {
    let options = RespondOptions {
        conversation_id: Some(conversation_id.to_string()),
        stream: true,
        ..RespondOptions::default()
    };

    let mut reply = state
        .orchestrator
        .respond(message, options, CancelToken::new())
        .await?;

    let mut stdout = std::io::stdout();
    while let Some(chunk) = reply.next().await {
        match chunk? {
            ReplyChunk::Token(text) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            ReplyChunk::Metadata { usage_metadata } => {
                println!();
                eprintln!(
                    "({} in / {} out tokens)",
                    usage_metadata.input_tokens, usage_metadata.output_tokens
                );
            }
        }
    }
    Ok(())
}
