/// Shared error type used across all Trellis crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("model {model}: {message}")]
    Model { model: String, message: String },

    #[error("store: {0}")]
    Store(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("blocked: {0}")]
    Blocked(String),

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors a caller may retry (network-level transience).
    ///
    /// Message-based matching covers the codes the upstream stacks put in
    /// error strings: connection reset/refused, name resolution, fetch
    /// failures, and half-closed sockets.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Http(msg) | Error::Other(msg) => {
                let m = msg.to_ascii_lowercase();
                m.contains("connection reset")
                    || m.contains("connection refused")
                    || m.contains("timed out")
                    || m.contains("timeout")
                    || m.contains("dns error")
                    || m.contains("name resolution")
                    || m.contains("failed to lookup")
                    || m.contains("fetch failed")
                    || m.contains("socket hang up")
            }
            _ => false,
        }
    }
}
