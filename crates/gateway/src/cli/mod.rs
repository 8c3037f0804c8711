//! Command-line interface.

pub mod chat;

use clap::{Parser, Subcommand};

use trellis_domain::config::Config;

#[derive(Parser)]
#[command(name = "trellis", version, about = "Conversational AI orchestrator")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "trellis.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default).
    Run,
    /// Interactive chat REPL against the local orchestrator.
    Chat {
        /// Conversation to resume; a fresh one is created otherwise.
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Print the effective configuration.
    ShowConfig,
}

/// Load config from the given path; a missing file means defaults.
///
/// Runs before tracing is initialized (the log level lives in the
/// config), so outcomes are reported by the caller.
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            toml::from_str(&raw).map_err(|e| anyhow::anyhow!("failed to parse {path}: {e}"))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(anyhow::anyhow!("failed to read {path}: {e}")),
    }
}
