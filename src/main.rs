//! Service Gateway
//!
//! Single entry point for a fleet of HTTP services, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     GATEWAY                          │
//!                     │                                                      │
//!   Client Request    │  ┌─────────┐   ┌──────────┐   ┌──────────────┐       │
//!   ──────────────────┼─▶│  http   │──▶│ routing  │──▶│ rate limiter │       │
//!                     │  │ server  │   │  table   │   └──────┬───────┘       │
//!                     │  └─────────┘   └──────────┘          ▼              │
//!                     │                               ┌──────────────┐       │
//!                     │                               │   circuit    │       │
//!                     │                               │   breaker    │       │
//!                     │                               └──────┬───────┘       │
//!                     │  ┌──────────┐   ┌──────────┐         ▼              │
//!                     │  │ registry │──▶│ balancer │◀── resolve + pick      │
//!                     │  └──────────┘   └────┬─────┘                         │
//!   Client Response   │  ┌──────────┐        ▼                               │
//!   ◀─────────────────┼──│ fallback │◀── upstream call ──────────────────────┼──▶ Service
//!                     │  └──────────┘                                        │    Instance
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use service_gateway::config::{load_config, watcher::ConfigWatcher, ConfigError, GatewayConfig};
use service_gateway::lifecycle::{signals, startup};
use service_gateway::observability::init_tracing;
use service_gateway::{GatewayServer, Shutdown};

#[derive(Parser)]
#[command(name = "service-gateway")]
#[command(about = "API gateway with discovery, load balancing and circuit breaking", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(ConfigError::Validation(errors)) => {
                eprintln!("Invalid configuration in {}:", path.display());
                for error in errors {
                    eprintln!("  - {error}");
                }
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("Failed to load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };

    init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    match run(cli, config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    startup::start_metrics(&config.observability)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    // The watcher must stay alive for updates to flow.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    let server = GatewayServer::new(config)?;
    server.run(listener, config_updates, shutdown).await?;
    Ok(())
}
