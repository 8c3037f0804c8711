use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Language model configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings for the OpenAI-compatible language model endpoint plus the
/// per-role model assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    #[serde(default = "d_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the bearer token. Empty = no auth
    /// header (local endpoints).
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,

    /// Fallback model used for any unassigned role.
    #[serde(default = "d_default_model")]
    pub default_model: String,

    /// Per-role model overrides.
    #[serde(default)]
    pub roles: RoleModels,

    /// Whole-request timeout, seconds.
    #[serde(default = "d_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retry attempts for transient network failures.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,

    /// Linear backoff unit: attempt `n` sleeps `n * retry_backoff_ms`.
    #[serde(default = "d_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: d_endpoint(),
            api_key_env: d_api_key_env(),
            default_model: d_default_model(),
            roles: RoleModels::default(),
            request_timeout_secs: d_request_timeout(),
            max_retries: d_max_retries(),
            retry_backoff_ms: d_backoff_ms(),
        }
    }
}

/// Which model serves each pipeline role. `None` falls back to
/// [`LlmConfig::default_model`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoleModels {
    /// Tier-1 router (small, fast).
    #[serde(default)]
    pub classifier: Option<String>,
    /// Tier-2 planner (larger, schema-constrained).
    #[serde(default)]
    pub planner: Option<String>,
    /// Final answer streaming.
    #[serde(default)]
    pub responder: Option<String>,
    /// Search sufficiency evaluator.
    #[serde(default)]
    pub evaluator: Option<String>,
    /// Executive summary rewriter.
    #[serde(default)]
    pub summarizer: Option<String>,
    /// Embedding model for vector retrieval.
    #[serde(default)]
    pub embedder: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_endpoint() -> String {
    "http://127.0.0.1:11434/v1".into()
}
fn d_api_key_env() -> String {
    "TRELLIS_API_KEY".into()
}
fn d_default_model() -> String {
    "llama3.1".into()
}
fn d_request_timeout() -> u64 {
    120
}
fn d_max_retries() -> u32 {
    3
}
fn d_backoff_ms() -> u64 {
    250
}
