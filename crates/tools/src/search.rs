//! Web search server — `web_search` against a SearXNG-style JSON
//! endpoint.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use trellis_domain::config::SearchConfig;
use trellis_domain::error::{Error, Result};
use trellis_domain::tool::{ToolDescriptor, ToolResult};

use crate::server::{CallContext, ToolServer};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Format hits the way the evaluator and responder consume them.
fn format_results(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".into();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("{}. {}\n   {}\n   {}", i + 1, hit.title, hit.url, hit.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The `web` tool server, owning one tool: `web_search`.
pub struct WebSearchServer {
    client: reqwest::Client,
    config: SearchConfig,
}

impl WebSearchServer {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn search(&self, query: &str, count: usize) -> Result<ToolResult> {
        if query.trim().is_empty() {
            return Err(Error::Validation("search query is empty".into()));
        }

        let resp = self
            .client
            .get(&self.config.endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Http(format!(
                "search endpoint returned HTTP {}",
                resp.status()
            )));
        }

        let mut parsed: SearchResponse =
            resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        parsed.results.truncate(count);

        let metadata = json!({
            "query": query,
            "result_count": parsed.results.len(),
        });
        Ok(ToolResult::text(format_results(&parsed.results)).with_metadata(metadata))
    }
}

#[async_trait::async_trait]
impl ToolServer for WebSearchServer {
    fn name(&self) -> &str {
        "web"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "web_search".into(),
            description: "Search the web and return ranked result snippets.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "count": { "type": "integer", "description": "Max results" }
                },
                "required": ["query"]
            }),
        }]
    }

    fn call_timeout(&self, _tool: &str) -> Duration {
        Duration::from_secs(self.config.timeout_secs + 2)
    }

    async fn call(&self, tool: &str, args: &Value, _ctx: &CallContext) -> Result<ToolResult> {
        match tool {
            "web_search" => {
                let query = args["query"].as_str().unwrap_or_default();
                let count = args["count"]
                    .as_u64()
                    .map(|c| c as usize)
                    .unwrap_or(self.config.default_count);
                self.search(query, count).await
            }
            other => Err(Error::Validation(format!("web server has no tool {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_results_numbers_hits() {
        let hits = vec![
            SearchHit {
                title: "Rust".into(),
                url: "https://rust-lang.org".into(),
                content: "A language".into(),
            },
            SearchHit {
                title: "Tokio".into(),
                url: "https://tokio.rs".into(),
                content: "A runtime".into(),
            },
        ];
        let text = format_results(&hits);
        assert!(text.starts_with("1. Rust"));
        assert!(text.contains("2. Tokio"));
        assert!(text.contains("https://tokio.rs"));
    }

    #[test]
    fn format_results_empty() {
        assert_eq!(format_results(&[]), "No results found.");
    }

    #[tokio::test]
    async fn empty_query_is_validation_error() {
        let server = WebSearchServer::new(SearchConfig::default()).unwrap();
        let err = server.search("  ", 5).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn response_parsing_tolerates_missing_fields() {
        let raw = r#"{"results":[{"title":"only title"}]}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert!(parsed.results[0].url.is_empty());
    }
}
