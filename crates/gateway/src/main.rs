use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use trellis_domain::config::Config;
use trellis_gateway::cli::{self, Cli, Command};
use trellis_gateway::{api, bootstrap};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(cli::load_config(&cli.config)?);
    init_tracing(&config);

    match cli.command {
        None | Some(Command::Run) => run_server(config).await,
        Some(Command::Chat { conversation }) => {
            trellis_gateway::cli::chat::chat(config, conversation).await
        }
        Some(Command::ShowConfig) => {
            println!("{}", toml::to_string_pretty(config.as_ref())?);
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));

    if config.observability.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let (state, heartbeat) = bootstrap::build_app_state(config.clone()).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    let router = api::router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    heartbeat.stop().await;
    Ok(())
}
