//! fieldline: runs the reconciler against a record database.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use fieldline_core::SystemClock;
use fieldline_engine::{Engine, spawn_reconciler};
use fieldline_storage::SqliteStorage;

use config::DaemonConfig;

#[derive(Parser)]
#[command(name = "fieldline")]
#[command(about = "Promotes scheduled field changes when they fall due")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "fieldline.toml")]
    config: PathBuf,

    /// Database file (overrides config file)
    #[arg(long, env = "FIELDLINE_DB")]
    db: Option<PathBuf>,

    /// Run a single reconciliation pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fieldline=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = DaemonConfig::load(&cli.config)?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    info!(path = %config.database_path.display(), "Opening database");

    let path = config
        .database_path
        .to_str()
        .context("database path is not valid UTF-8")?;
    let store = Arc::new(SqliteStorage::open(path)?);
    let engine = Arc::new(Engine::new(store, Arc::new(SystemClock), config.engine));

    if cli.once {
        let pass_engine = Arc::clone(&engine);
        let report = tokio::task::spawn_blocking(move || pass_engine.reconcile_once()).await??;
        println!(
            "scanned {} records, promoted {} fields on {} records, {} failures",
            report.scanned, report.promoted_fields, report.promoted_records, report.failures
        );
        return Ok(());
    }

    let handle = spawn_reconciler(engine);
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.shutdown().await?;
    Ok(())
}
