//! # Sluice CLI - Warehouse Ingestion Sink Connector
//!
//! Command-line entry point for the sluice sink. The host process drives it
//! with one of two commands:
//!
//! - `check`: probe warehouse connectivity and report a CONNECTION_STATUS
//! - `write`: consume record/state messages on stdin, land the records in the
//!   warehouse, and re-emit each state once everything before it committed
//!
//! ## Usage
//!
//! ```bash
//! # Validate a configuration against the live warehouse
//! sluice-cli check --config config.json
//!
//! # Run a sync: messages in on stdin, checkpoints out on stdout
//! cat messages.jsonl | sluice-cli write --config config.json --catalog catalog.json
//!
//! # Enable debug logging
//! RUST_LOG=debug sluice-cli write --config config.json --catalog catalog.json
//! ```

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sluice_core::{ConfiguredCatalog, ConnectionStatus, ConnectorConfig, Message};
use sluice_io::redshift::RedshiftWarehouse;
use sluice_io::session::WriteSession;
use sluice_io::singlestore::SinglestoreWarehouse;
use sluice_io::stage::{LocalStager, S3Stager, Stager};
use sluice_io::warehouse::Warehouse;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sluice-cli")]
#[command(about = "Warehouse ingestion sink connector")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe warehouse connectivity with the given configuration
    Check {
        /// Path to the connector configuration JSON
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Consume messages on stdin and land them in the warehouse
    Write {
        /// Path to the connector configuration JSON
        #[arg(short, long)]
        config: PathBuf,
        /// Path to the configured catalog JSON
        #[arg(long)]
        catalog: PathBuf,
    },
}

fn load_config(path: &Path) -> Result<ConnectorConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read configuration {}", path.display()))?;
    serde_json::from_str(&raw).context("parse configuration")
}

fn connect(config: &ConnectorConfig) -> Result<(Arc<dyn Warehouse>, Arc<dyn Stager>)> {
    match config {
        ConnectorConfig::Redshift(cfg) => Ok((
            Arc::new(RedshiftWarehouse::new(cfg)?),
            Arc::new(S3Stager::new(cfg)?),
        )),
        ConnectorConfig::Singlestore(cfg) => {
            Ok((Arc::new(SinglestoreWarehouse::new(cfg)), Arc::new(LocalStager)))
        }
    }
}

fn emit(message: &Message) -> Result<()> {
    println!("{}", serde_json::to_string(message)?);
    Ok(())
}

async fn check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let (warehouse, _stager) = connect(&config)?;

    // Connectivity failures are reported to the host, not thrown.
    let status = match warehouse.check().await {
        Ok(()) => ConnectionStatus::succeeded(),
        Err(err) => {
            error!(error = %err, "connectivity check failed");
            ConnectionStatus::failed(format!("An exception occurred: {err:#}"))
        }
    };
    emit(&status)
}

async fn write(config_path: &Path, catalog_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let catalog: ConfiguredCatalog = {
        let raw = std::fs::read_to_string(catalog_path)
            .with_context(|| format!("read catalog {}", catalog_path.display()))?;
        serde_json::from_str(&raw).context("parse catalog")?
    };

    let (warehouse, stager) = connect(&config)?;
    let mut session = WriteSession::start(&catalog, warehouse, stager, config.dialect()).await?;
    info!(streams = catalog.streams.len(), "write session started");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read message from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let message: Message = serde_json::from_str(&line).context("parse message")?;
        if let Some(out) = session.process(message).await? {
            emit(&out)?;
        }
    }

    session.finish().await?;
    info!("write session finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Check { config } => check(&config).await,
        Command::Write { config, catalog } => write(&config, &catalog).await,
    }
}
