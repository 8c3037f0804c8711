//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat-completions contract. One
//! instance is bound to one model id; the role set builds several
//! instances over a shared HTTP client.

use serde_json::{json, Value};

use crate::extract::extract_json;
use crate::retry::with_retry;
use crate::sse::sse_response_stream;
use crate::util::from_reqwest;
use trellis_domain::config::LlmConfig;
use trellis_domain::error::{Error, Result};
use trellis_domain::message::{ChatMessage, Role};
use trellis_domain::stream::{BoxStream, StreamEvent, Usage};
use trellis_ports::llm::{ChatRequest, ChatResponse, LanguageModel};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A [`LanguageModel`] bound to one model id on an OpenAI-compatible
/// endpoint.
pub struct OpenAiCompatModel {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    max_retries: u32,
    backoff_ms: u64,
}

impl OpenAiCompatModel {
    /// Build an adapter for `model` from the shared LLM config.
    ///
    /// The bearer token is read from the configured environment variable
    /// once at construction; an unset variable means no auth header
    /// (local endpoints).
    pub fn from_config(cfg: &LlmConfig, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        let api_key = if cfg.api_key_env.is_empty() {
            None
        } else {
            std::env::var(&cfg.api_key_env).ok()
        };

        Ok(Self {
            base_url: cfg.endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client,
            max_retries: cfg.max_retries,
            backoff_ms: cfg.retry_backoff_ms,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| json!({ "role": role_to_str(m.role), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": req.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
        });
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if req.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    async fn post_chat(&self, body: &Value) -> Result<Value> {
        let resp = self
            .authed_post(&self.chat_url())
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Model {
                model: self.model.clone(),
                message: format!("HTTP {status}: {text}"),
            });
        }

        resp.json::<Value>().await.map_err(from_reqwest)
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_usage(v: &Value) -> Option<Usage> {
    let usage = v.get("usage")?;
    Some(Usage {
        input_tokens: usage.get("prompt_tokens")?.as_u64()? as u32,
        output_tokens: usage
            .get("completion_tokens")
            .and_then(|t| t.as_u64())
            .unwrap_or(0) as u32,
        total_tokens: usage
            .get("total_tokens")
            .and_then(|t| t.as_u64())
            .unwrap_or(0) as u32,
    })
}

fn parse_chat_response(model: &str, body: &Value) -> Result<ChatResponse> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(ChatResponse {
        content,
        usage: parse_usage(body),
        model: body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string(),
    })
}

/// Parse one streaming `data:` payload into stream events.
fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            return vec![Err(Error::Http(format!("bad SSE chunk: {e}")))];
        }
    };

    let mut events = Vec::new();

    if let Some(text) = value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
    {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token { text: text.into() }));
        }
    }

    // The usage-bearing chunk arrives last with an empty choices array
    // when stream_options.include_usage is honored.
    if let Some(usage) = parse_usage(&value) {
        events.push(Ok(StreamEvent::Done {
            usage: Some(usage),
            finish_reason: value
                .pointer("/choices/0/finish_reason")
                .and_then(|f| f.as_str())
                .map(String::from),
        }));
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LanguageModel impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LanguageModel for OpenAiCompatModel {
    async fn invoke(&self, req: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(&req, false);
        let response = with_retry(self.max_retries, self.backoff_ms, || {
            self.post_chat(&body)
        })
        .await?;
        parse_chat_response(&self.model, &response)
    }

    async fn stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = self.build_body(&req, true);

        let resp = with_retry(self.max_retries, self.backoff_ms, || async {
            let resp = self
                .authed_post(&self.chat_url())
                .json(&body)
                .send()
                .await
                .map_err(from_reqwest)?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(Error::Model {
                    model: self.model.clone(),
                    message: format!("HTTP {status}: {text}"),
                });
            }
            Ok(resp)
        })
        .await?;

        Ok(sse_response_stream(resp, parse_sse_data))
    }

    async fn invoke_structured(&self, mut req: ChatRequest, schema: &Value) -> Result<Value> {
        req.json_mode = true;
        // The schema is advisory for OpenAI-compatible backends: it is
        // injected into the system prompt, and output is validated by the
        // extraction chain plus the caller's decoder.
        if let Some(first) = req.messages.first_mut() {
            if first.role == Role::System {
                first.content = format!(
                    "{}\n\nRespond with a single JSON document matching this schema:\n{}",
                    first.content, schema
                );
            }
        }

        let response = self.invoke(req).await?;
        extract_json(&response.content)
    }

    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": inputs });

        let response = with_retry(self.max_retries, self.backoff_ms, || async {
            let resp = self
                .authed_post(&url)
                .json(&body)
                .send()
                .await
                .map_err(from_reqwest)?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(Error::Model {
                    model: self.model.clone(),
                    message: format!("embeddings HTTP {status}: {text}"),
                });
            }
            resp.json::<Value>().await.map_err(from_reqwest)
        })
        .await?;

        let data = response
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| Error::Model {
                model: self.model.clone(),
                message: "embeddings response missing 'data' array".into(),
            })?;

        Ok(data
            .iter()
            .map(|item| {
                item.get("embedding")
                    .and_then(|e| e.as_array())
                    .map(|arr| {
                        arr.iter()
                            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model() -> OpenAiCompatModel {
        OpenAiCompatModel::from_config(&LlmConfig::default(), "test-model").unwrap()
    }

    #[test]
    fn build_body_basic() {
        let model = test_model();
        let req = ChatRequest::from_messages(vec![
            ChatMessage::system("be helpful"),
            ChatMessage::user("hi"),
        ]);
        let body = model.build_body(&req, false);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("stream").is_none());
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn build_body_json_mode_and_stream() {
        let model = test_model();
        let mut req = ChatRequest::from_messages(vec![ChatMessage::user("hi")]);
        req.json_mode = true;
        let body = model.build_body(&req, true);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn build_body_honors_model_override() {
        let model = test_model();
        let mut req = ChatRequest::from_messages(vec![ChatMessage::user("hi")]);
        req.model = Some("other-model".into());
        let body = model.build_body(&req, false);
        assert_eq!(body["model"], "other-model");
    }

    #[test]
    fn parse_chat_response_extracts_content_and_usage() {
        let body = serde_json::json!({
            "model": "served-model",
            "choices": [{ "message": { "role": "assistant", "content": "hello" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14 }
        });
        let resp = parse_chat_response("test-model", &body).unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.model, "served-model");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.total_tokens, 14);
    }

    #[test]
    fn parse_sse_token_chunk() {
        let data = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        let events = parse_sse_data(data);
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            StreamEvent::Token { text } => assert_eq!(text, "Hi"),
            other => panic!("expected token, got {other:?}"),
        }
    }

    #[test]
    fn parse_sse_done_sentinel() {
        let events = parse_sse_data("[DONE]");
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Done { .. }
        ));
    }

    #[test]
    fn parse_sse_usage_chunk_emits_done() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#;
        let events = parse_sse_data(data);
        match events[0].as_ref().unwrap() {
            StreamEvent::Done { usage, .. } => {
                assert_eq!(usage.unwrap().total_tokens, 7);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn parse_sse_garbage_is_error() {
        let events = parse_sse_data("not json");
        assert!(events[0].is_err());
    }
}
