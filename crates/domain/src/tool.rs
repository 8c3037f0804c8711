//! Tool protocol types: descriptors, results, and command patterns.
//!
//! The wire contract every tool server speaks: a directory of
//! descriptors with JSON schemas, structured results, and regex-based
//! command-pattern resources for the precheck fastpath.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Descriptors & results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool advertised by a tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// One content item in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Structured result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    /// Server-supplied metadata forwarded on `tool_complete` events.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
            metadata: Value::Null,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Join all text content into one string.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Command patterns (precheck fastpath)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A regex-based command pattern served by a tool server at a
/// `pattern://` resource URI. High-confidence matches bypass the
/// classifier and planner entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPattern {
    pub id: String,
    /// Regex source, matched against the whole user message.
    pub pattern: String,
    /// Regex flags: any of `i`, `m`, `s`.
    #[serde(default)]
    pub flags: String,
    /// The tool the fastpath dispatches to.
    pub tool: String,
    /// Parameter name → capture group index.
    #[serde(default)]
    pub parameter_mapping: HashMap<String, usize>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
    /// Confidence in `[0, 1]`; precheck requires ≥ 0.8 to dispatch.
    pub confidence: f64,
    /// Name of the server that published the pattern.
    #[serde(default)]
    pub server: String,
}

impl CommandPattern {
    /// Compile the pattern honoring its flags.
    pub fn compile(&self) -> Result<regex::Regex, regex::Error> {
        regex::RegexBuilder::new(&self.pattern)
            .case_insensitive(self.flags.contains('i'))
            .multi_line(self.flags.contains('m'))
            .dot_matches_new_line(self.flags.contains('s'))
            .build()
    }

    /// Match `input` and extract parameters via the capture mapping.
    /// Returns `None` on no match; unmatched optional groups yield empty
    /// strings.
    pub fn extract(&self, input: &str) -> Option<HashMap<String, String>> {
        let re = self.compile().ok()?;
        let caps = re.captures(input)?;
        let mut params = HashMap::new();
        for (name, idx) in &self.parameter_mapping {
            let value = caps
                .get(*idx)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            params.insert(name.clone(), value);
        }
        Some(params)
    }
}
