use serde::{Deserialize, Serialize};

/// Logging output settings, read once at startup by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "d_log_level")]
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: d_log_level(),
            log_json: false,
        }
    }
}

fn d_log_level() -> String {
    "info".into()
}
