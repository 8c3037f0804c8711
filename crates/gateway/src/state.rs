use std::sync::Arc;

use trellis_domain::config::Config;
use trellis_orchestrator::Orchestrator;
use trellis_ports::kv::KvStore;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    /// KV handle kept for health reporting (active node listing).
    pub kv: Arc<dyn KvStore>,
    pub node_id: String,
}
