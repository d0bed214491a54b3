//! Marcus HTTP server entry point.

use anyhow::Context as _;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marcus")]
#[command(about = "Personalized multi-provider AI chat backend")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Address to bind the HTTP API to, overriding the configuration
    #[arg(short, long)]
    bind: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Marcus...");

    let mut config = if let Some(config_path) = cli.config {
        marcus::config::Config::load_from_path(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        marcus::config::Config::load()
            .with_context(|| "failed to load configuration from environment")?
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    tracing::info!(
        data_dir = %config.data_dir.display(),
        environment = ?config.environment,
        "Configuration loaded"
    );

    let db = marcus::db::Db::connect(&config.sqlite_path())
        .await
        .with_context(|| "failed to connect to database")?;

    let llm_manager = Arc::new(
        marcus::llm::LlmManager::new(config.llm.clone())
            .await
            .with_context(|| "failed to initialize LLM manager")?,
    );

    let state = Arc::new(marcus::api::ApiState::new(&config, &db, llm_manager));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = marcus::api::start_http_server(config.bind, state, shutdown_rx)
        .await
        .with_context(|| format!("failed to start HTTP server on {}", config.bind))?;

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(error) = server.await {
        tracing::warn!(%error, "HTTP server task failed");
    }
    db.close().await;

    tracing::info!("Marcus stopped");
    Ok(())
}
