use serde_json::Value;

use trellis_domain::error::Result;
use trellis_domain::message::ChatMessage;
use trellis_domain::stream::{BoxStream, StreamEvent, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A model-agnostic completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature. `None` lets the backend choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the backend choose.
    pub max_tokens: Option<u32>,
    /// When `true`, request valid-JSON-only output.
    pub json_mode: bool,
    /// Model identifier override. `None` = backend default.
    pub model: Option<String>,
}

impl ChatRequest {
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// A model-agnostic completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LanguageModel port
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The capability every LLM-backed stage consumes.
///
/// `invoke_structured` exists as its own method because structured output
/// carries extraction/repair policy a plain `invoke` must not: callers get
/// back a parsed JSON value or an error, never raw prose.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send a completion request and wait for the full response.
    async fn invoke(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Send a completion request and stream tokens as they arrive.
    async fn stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// Request JSON output conforming to `schema` and return the parsed
    /// value. Implementations repair near-JSON output where possible.
    async fn invoke_structured(&self, req: ChatRequest, schema: &Value) -> Result<Value>;

    /// Embed each input text into a vector.
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// The model identifier this handle resolves to.
    fn model_id(&self) -> &str;
}
