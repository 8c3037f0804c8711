//! Process bootstrap: stores, model roles, tool servers, orchestrator,
//! and the heartbeat task.

use std::sync::Arc;

use anyhow::Context;

use trellis_domain::config::Config;
use trellis_events::{EventBus, Heartbeat, HeartbeatHandle};
use trellis_memory::MemoryService;
use trellis_orchestrator::{Capabilities, Orchestrator};
use trellis_ports::counter::HeuristicTokenCounter;
use trellis_ports::kv::KvStore;
use trellis_providers::ModelRoles;
use trellis_retrieval::Retriever;
use trellis_stores::{MemoryDocs, MemoryKv, MemoryVectors};
use trellis_tools::fetch::FetchServer;
use trellis_tools::memory_tools::MemoryToolServer;
use trellis_tools::rag::RagServer;
use trellis_tools::search::WebSearchServer;
use trellis_tools::shell::ShellServer;
use trellis_tools::{ToolRegistry, ToolServer};

use crate::state::AppState;

/// Build the full application state from config.
///
/// Storage is the in-process reference stack; swapping in networked
/// stores means replacing the three `Arc::new(Memory…)` lines with other
/// port implementations.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<(AppState, HeartbeatHandle)> {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let docs = Arc::new(MemoryDocs::new());
    let vectors = Arc::new(MemoryVectors::new());
    let counter = Arc::new(HeuristicTokenCounter::new(config.memory.chars_per_token));

    let roles = ModelRoles::from_config(&config.llm).context("building model roles")?;

    let memory = MemoryService::new(
        kv.clone(),
        docs,
        counter.clone(),
        roles.summarizer.clone(),
        config.memory.clone(),
    );

    let retriever = Retriever::new(vectors, roles.embedder.clone(), config.retrieval.clone());

    let servers: Vec<Arc<dyn ToolServer>> = vec![
        Arc::new(WebSearchServer::new(config.tools.search.clone()).context("web search server")?),
        Arc::new(FetchServer::new(config.tools.fetch.clone()).context("fetch server")?),
        Arc::new(ShellServer::new(config.tools.shell.clone()).context("shell server")?),
        Arc::new(RagServer::new(retriever)),
        Arc::new(MemoryToolServer::new(memory.clone())),
    ];
    let tools = ToolRegistry::new(servers);

    let bus = EventBus::new(kv.clone());

    let heartbeat = Heartbeat::new(kv.clone(), &config.heartbeat);
    let node_id = heartbeat.node_id().to_string();
    let heartbeat_handle = heartbeat.start().await;

    let orchestrator = Orchestrator::new(Capabilities {
        config: config.clone(),
        roles,
        memory,
        tools,
        bus,
        counter,
    });

    tracing::info!(node_id = %node_id, "trellis bootstrapped");

    Ok((
        AppState {
            config,
            orchestrator,
            kv,
            node_id,
        },
        heartbeat_handle,
    ))
}
