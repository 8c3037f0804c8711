//! The capability bundle threaded to nodes.
//!
//! Process-wide capabilities live in [`Capabilities`]; per-turn wiring
//! (publisher, call context, the caller's token channel, usage
//! accumulation) lives in [`TurnCtx`]. Nodes hold an `Arc<TurnCtx>`
//! received at construction — graph state never carries services.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use trellis_domain::config::Config;
use trellis_domain::stream::Usage;
use trellis_events::{EventBus, TurnPublisher};
use trellis_memory::MemoryService;
use trellis_ports::counter::TokenCounter;
use trellis_providers::ModelRoles;
use trellis_tools::{CallContext, ToolRegistry};

/// Process-wide capabilities, built once at bootstrap.
#[derive(Clone)]
pub struct Capabilities {
    pub config: Arc<Config>,
    pub roles: ModelRoles,
    pub memory: Arc<MemoryService>,
    pub tools: Arc<ToolRegistry>,
    pub bus: EventBus,
    pub counter: Arc<dyn TokenCounter>,
}

/// Everything one turn's nodes share.
pub struct TurnCtx {
    pub caps: Capabilities,
    pub publisher: Arc<TurnPublisher>,
    pub call_ctx: CallContext,
    /// Live token forwarding to the caller's reply stream.
    tokens: mpsc::Sender<String>,
    /// Accumulated model usage across all node calls this turn.
    usage: Mutex<Usage>,
}

impl TurnCtx {
    pub fn new(
        caps: Capabilities,
        publisher: Arc<TurnPublisher>,
        call_ctx: CallContext,
        tokens: mpsc::Sender<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            caps,
            publisher,
            call_ctx,
            tokens,
            usage: Mutex::new(Usage::default()),
        })
    }

    /// Forward a token to the caller. A closed receiver just means the
    /// caller stopped reading; the turn still completes for persistence.
    pub async fn send_token(&self, text: &str) {
        let _ = self.tokens.send(text.to_string()).await;
    }

    pub fn record_usage(&self, usage: &Usage) {
        self.usage.lock().add(usage);
    }

    pub fn total_usage(&self) -> Usage {
        *self.usage.lock()
    }
}
