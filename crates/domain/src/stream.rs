use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming and reply token streams.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while a language model streams a completion.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text token chunk.
    Token { text: String },

    /// Stream finished.
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred mid-stream.
    Error { message: String },
}

/// Token usage for a completion or a whole turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Items of the caller-facing reply stream: zero or more tokens followed by
/// exactly one usage record.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplyChunk {
    Token(String),
    Metadata {
        usage_metadata: Usage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total.add(&Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        });
        total.add(&Usage {
            input_tokens: 1,
            output_tokens: 2,
            total_tokens: 3,
        });
        assert_eq!(total.total_tokens, 18);
    }

    #[test]
    fn metadata_chunk_wire_shape() {
        let chunk = ReplyChunk::Metadata {
            usage_metadata: Usage {
                input_tokens: 1,
                output_tokens: 2,
                total_tokens: 3,
            },
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["usage_metadata"]["total_tokens"], 3);
    }

    #[test]
    fn token_chunk_serializes_as_bare_string() {
        let chunk = ReplyChunk::Token("hello".into());
        assert_eq!(serde_json::to_string(&chunk).unwrap(), "\"hello\"");
    }
}
