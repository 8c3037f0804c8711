use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool execution configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub search: SearchConfig,
    /// Per-field truncation bound for event payload text, bytes.
    #[serde(default = "d_event_field_cap")]
    pub event_field_cap: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell: ShellConfig::default(),
            fetch: FetchConfig::default(),
            search: SearchConfig::default(),
            event_field_cap: d_event_field_cap(),
        }
    }
}

/// Shell command execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "d_shell_timeout")]
    pub timeout_secs: u64,
    /// Combined stdout+stderr cap enforced before bus emission and
    /// context injection.
    #[serde(default = "d_shell_output_cap")]
    pub max_output_bytes: usize,
    /// Extra deny-regexes merged with the built-in blocklist.
    #[serde(default)]
    pub extra_denied_patterns: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: d_shell_timeout(),
            max_output_bytes: d_shell_output_cap(),
            extra_denied_patterns: Vec::new(),
        }
    }
}

/// URL fetch (scrape) limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "d_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "d_fetch_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "d_fetch_max_text")]
    pub max_text_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: d_fetch_timeout(),
            max_bytes: d_fetch_max_bytes(),
            max_text_chars: d_fetch_max_text(),
        }
    }
}

/// Web search provider settings (SearXNG-style JSON endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "d_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "d_search_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "d_search_count")]
    pub default_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: d_search_endpoint(),
            timeout_secs: d_search_timeout(),
            default_count: d_search_count(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_event_field_cap() -> usize {
    2048
}
fn d_shell_timeout() -> u64 {
    30
}
fn d_shell_output_cap() -> usize {
    4096
}
fn d_fetch_timeout() -> u64 {
    12
}
fn d_fetch_max_bytes() -> usize {
    2 * 1024 * 1024
}
fn d_fetch_max_text() -> usize {
    100_000
}
fn d_search_endpoint() -> String {
    "http://127.0.0.1:8888/search".into()
}
fn d_search_timeout() -> u64 {
    6
}
fn d_search_count() -> usize {
    5
}
