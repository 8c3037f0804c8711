//! OpenAI-compatible `POST /v1/chat/completions`.
//!
//! Translates the standard ChatCompletion request into a `respond()`
//! turn and returns the OpenAI shape, either in full or as
//! `text/event-stream` with `data:` chunks terminated by
//! `data: [DONE]`.
//!
//! Conversation identity precedence: `X-Conversation-ID` header → body
//! `conversation_id` → bearer-token hash → hash of the first user
//! message (handled inside the orchestrator).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use trellis_domain::stream::{ReplyChunk, Usage};
use trellis_events::CancelToken;
use trellis_orchestrator::{derive_conversation_id, RespondOptions, Source};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct OpenAIChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<OpenAIMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
struct OpenAIChatResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Debug, Serialize)]
struct OpenAIChoice {
    index: u32,
    message: OpenAIResponseMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<Usage> for OpenAIUsage {
    fn from(u: Usage) -> Self {
        Self {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIChunk {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<OpenAIChunkChoice>,
}

#[derive(Debug, Serialize)]
struct OpenAIChunkChoice {
    index: u32,
    delta: OpenAIChunkDelta,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize, Default)]
struct OpenAIChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

fn openai_error(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({
            "error": { "message": message, "type": "invalid_request_error" }
        })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn resolve_conversation_id(
    headers: &HeaderMap,
    body_id: Option<&str>,
) -> Option<String> {
    if let Some(id) = headers
        .get("x-conversation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(id.to_string());
    }
    if let Some(id) = body_id.filter(|v| !v.is_empty()) {
        return Some(id.to_string());
    }
    // A stable per-client identity: hash the bearer token.
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty())
    {
        return Some(derive_conversation_id(token));
    }
    None
}

fn last_user_message(messages: &[OpenAIMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/completions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<OpenAIChatRequest>,
) -> axum::response::Response {
    let Some(user_message) = last_user_message(&body.messages) else {
        return openai_error(
            StatusCode::BAD_REQUEST,
            "No user message found in messages array",
        );
    };
    let user_message = user_message.to_string();

    let options = RespondOptions {
        conversation_id: resolve_conversation_id(&headers, body.conversation_id.as_deref()),
        generation_id: None,
        stream: body.stream,
        source: Some(Source {
            application: "openai-compat".into(),
            device: String::new(),
        }),
    };
    let model_name = body
        .model
        .unwrap_or_else(|| state.config.llm.default_model.clone());

    if body.stream {
        chat_stream(state, user_message, options, model_name)
            .await
            .into_response()
    } else {
        chat_blocking(state, user_message, options, model_name)
            .await
            .into_response()
    }
}

async fn chat_blocking(
    state: AppState,
    user_message: String,
    options: RespondOptions,
    model_name: String,
) -> axum::response::Response {
    match state
        .orchestrator
        .respond_collect(&user_message, options, CancelToken::new())
        .await
    {
        Ok((content, usage)) => Json(OpenAIChatResponse {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion",
            created: chrono::Utc::now().timestamp(),
            model: model_name,
            choices: vec![OpenAIChoice {
                index: 0,
                message: OpenAIResponseMessage {
                    role: "assistant",
                    content,
                },
                finish_reason: "stop",
            }],
            usage: usage.into(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "chat completion failed");
            openai_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn chat_stream(
    state: AppState,
    user_message: String,
    options: RespondOptions,
    model_name: String,
) -> axum::response::Response {
    let reply = match state
        .orchestrator
        .respond(&user_message, options, CancelToken::new())
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "turn start failed");
            return openai_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();

    let sse_stream = sse_chunks(id, created, model_name, reply);
    Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Convert a reply stream into OpenAI SSE chunks, ending with the
/// `[DONE]` sentinel.
fn sse_chunks(
    id: String,
    created: i64,
    model: String,
    mut reply: trellis_domain::stream::BoxStream<
        'static,
        trellis_domain::error::Result<ReplyChunk>,
    >,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let chunk = |delta: OpenAIChunkDelta, finish: Option<&'static str>| OpenAIChunk {
            id: id.clone(),
            object: "chat.completion.chunk",
            created,
            model: model.clone(),
            choices: vec![OpenAIChunkChoice {
                index: 0,
                delta,
                finish_reason: finish,
            }],
        };

        // Leading role chunk, per the OpenAI streaming contract.
        let first = chunk(
            OpenAIChunkDelta {
                role: Some("assistant"),
                content: None,
            },
            None,
        );
        yield Ok(Event::default().json_data(&first).unwrap_or_default());

        while let Some(item) = reply.next().await {
            match item {
                Ok(ReplyChunk::Token(text)) => {
                    let data = chunk(
                        OpenAIChunkDelta {
                            role: None,
                            content: Some(text),
                        },
                        None,
                    );
                    yield Ok(Event::default().json_data(&data).unwrap_or_default());
                }
                Ok(ReplyChunk::Metadata { .. }) => {
                    let done = chunk(OpenAIChunkDelta::default(), Some("stop"));
                    yield Ok(Event::default().json_data(&done).unwrap_or_default());
                }
                Err(e) => {
                    tracing::error!(error = %e, "stream failed mid-turn");
                    let data = serde_json::json!({
                        "error": { "message": e.to_string() }
                    });
                    yield Ok(Event::default().json_data(&data).unwrap_or_default());
                    break;
                }
            }
        }

        yield Ok(Event::default().data("[DONE]"));
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
