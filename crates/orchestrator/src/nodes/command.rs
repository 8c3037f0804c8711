//! The command node — dispatches a command step to the matching tool.
//!
//! Step domains `web` / `scrape` / `url` fetch a page through
//! `scrape_url` (SSRF validation included); everything else runs
//! through `execute_command` behind the shell blocklist. Validation and
//! security rejections never abort the turn: they become system context
//! messages the responder explains from, while the registry has already
//! put the matching `tool_error` on the bus.

use std::sync::Arc;

use serde_json::json;

use trellis_domain::error::Result;
use trellis_domain::message::ChatMessage;
use trellis_domain::plan::Step;
use trellis_graph::Node;

use crate::bundle::TurnCtx;
use crate::state::{TurnDelta, TurnState};

pub struct CommandNode {
    ctx: Arc<TurnCtx>,
}

impl CommandNode {
    pub fn new(ctx: Arc<TurnCtx>) -> Self {
        Self { ctx }
    }
}

/// True when the step's domain routes to the URL fetcher.
pub(crate) fn is_web_domain(domain: &str) -> bool {
    matches!(
        domain.to_ascii_lowercase().as_str(),
        "web" | "scrape" | "url" | "fetch"
    )
}

/// Pull the first http(s) URL out of the step details.
pub(crate) fn extract_url(details: &str) -> Option<&str> {
    details
        .split_whitespace()
        .find(|token| token.starts_with("http://") || token.starts_with("https://"))
}

#[async_trait::async_trait]
impl Node<TurnState> for CommandNode {
    async fn run(&self, state: &TurnState) -> Result<TurnDelta> {
        let Some(Step::Command {
            domain, details, ..
        }) = state.current_step()
        else {
            tracing::warn!("command node reached without a command step");
            return Ok(TurnDelta {
                current_step_index: Some(state.current_step_index + 1),
                node_number: Some(state.node_number + 1),
                ..TurnDelta::default()
            });
        };
        let (domain, details) = (domain.clone(), details.clone());

        self.ctx
            .publisher
            .status("tool_status", &format!("running {domain} command"), None, None)
            .await;

        let context_text = if is_web_domain(&domain) {
            match extract_url(&details) {
                Some(url) => {
                    let args = json!({ "url": url });
                    match self
                        .ctx
                        .caps
                        .tools
                        .call_tool("scrape_url", &args, &self.ctx.call_ctx, &self.ctx.publisher)
                        .await
                    {
                        Ok(result) if !result.is_error => {
                            format!("Content of {url}:\n{}", result.joined_text())
                        }
                        Ok(result) => {
                            format!("Could not fetch {url}: {}", result.joined_text())
                        }
                        Err(e) => format!("Could not fetch {url}: {e}"),
                    }
                }
                None => format!("Command step had no URL to fetch (details: {details})"),
            }
        } else {
            let args = json!({ "command": details });
            match self
                .ctx
                .caps
                .tools
                .call_tool(
                    "execute_command",
                    &args,
                    &self.ctx.call_ctx,
                    &self.ctx.publisher,
                )
                .await
            {
                Ok(result) if !result.is_error => {
                    format!("Command `{details}` output:\n{}", result.joined_text())
                }
                Ok(result) => {
                    format!("Command `{details}` failed: {}", result.joined_text())
                }
                Err(e) => format!("Command `{details}` was not run: {e}"),
            }
        };

        Ok(TurnDelta {
            messages: vec![ChatMessage::system(context_text)],
            current_step_index: Some(state.current_step_index + 1),
            node_number: Some(state.node_number + 1),
            ..TurnDelta::default()
        })
    }
}
