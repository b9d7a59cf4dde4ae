//! # Command Line Interface
//!
//! `packet-secrets serve` runs the backend behind the HTTP host shim with
//! in-memory storage.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::api::start_api_server;
use crate::backend::Backend;
use crate::config::AppConfig;
use crate::observability::{init_observability, log_config_info};
use crate::storage::InMemoryStorage;

#[derive(Parser, Debug)]
#[command(name = "packet-secrets")]
#[command(about = "Dynamic Packet API key secrets backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the backend over HTTP
    Serve {
        /// Bind host override
        #[arg(long)]
        host: Option<String>,

        /// Bind port override
        #[arg(long)]
        port: Option<u16>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Apply command line overrides on top of the environment configuration.
pub fn apply_overrides(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    verbose: bool,
) -> crate::Result<AppConfig> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if verbose {
        config.observability.log_level = "debug".to_string();
    }
    config.validate()?;
    Ok(config)
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, verbose } => {
            let config = AppConfig::from_env().context("Failed to load configuration")?;
            let config = apply_overrides(config, host, port, verbose)?;
            serve(config).await
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    init_observability(&config.observability).await?;
    log_config_info(&config);

    info!(app_name = crate::APP_NAME, version = crate::VERSION, "Starting Packet secrets backend");
    warn!("Using in-memory storage: configuration, roles and leases are lost on restart");

    let backend = Arc::new(Backend::with_packet_client(
        Arc::new(InMemoryStorage::new()),
        config.lease.to_settings()?,
    ));

    start_api_server(&config.server, backend, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "API server shutdown listener failed");
        }
    })
    .await?;

    Ok(())
}
