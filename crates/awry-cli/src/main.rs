//! awry - interactive shell for the profile store and query orchestrator.

use anyhow::Result;
use awry_cli::{config::Config, logging, session::Session};
use awry_core::{CommandBackend, ConfigStore, QueryOrchestrator, SqliteStorage};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use logging::{LogConfig, LogFormat};

/// Interactive shell for the awry database-query tool.
#[derive(Parser, Debug)]
#[command(name = "awry")]
#[command(about = "Profile store and query orchestration shell")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the profile storage path
    #[arg(long, value_name = "FILE")]
    storage: Option<PathBuf>,

    /// Override the backend executable path
    #[arg(long, value_name = "FILE")]
    backend: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "store=debug").
    /// Can be specified multiple times; targets are prefixed with
    /// "awry::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(storage) = cli.storage {
        config.storage_path = storage;
    }
    if let Some(backend) = cli.backend {
        config.backend_path = backend;
    }

    tracing::info!(
        target: "awry::startup",
        "Opening profile store at {}",
        config.storage_path.display()
    );

    let storage = Arc::new(SqliteStorage::open(&config.storage_path)?);
    let store = Arc::new(ConfigStore::open(storage)?);
    let backend = Arc::new(CommandBackend::new(config.backend_path));
    let orchestrator = Arc::new(QueryOrchestrator::new(store.clone(), backend));

    tracing::info!(
        target: "awry::startup",
        "Loaded {} profiles",
        store.profiles().len()
    );

    Session::new(store, orchestrator).run().await
}
