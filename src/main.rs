//! Strategy platform request gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────────┐
//!                        │                     REQUEST GATEWAY                      │
//!                        │                                                          │
//!   Client Request       │  ┌──────────┐   ┌───────────┐   ┌──────┐   ┌─────────┐   │
//!   ─────────────────────┼─▶│ registry │──▶│rate limit │──▶│ auth │──▶│ breaker │   │
//!                        │  │  lookup  │   │ (class)   │   │      │   │         │   │
//!                        │  └──────────┘   └───────────┘   └──────┘   └────┬────┘   │
//!                        │                                                 │        │
//!                        │                                                 ▼        │
//!   Client Response      │  ┌──────────┐                            ┌───────────┐   │
//!   ◀────────────────────┼──│ response │◀───────────────────────────│ forwarder │◀──┼── Backend
//!                        │  │transform │                            │ (timeout) │   │   Service
//!                        │  └──────────┘                            └───────────┘   │
//!                        │                                                          │
//!                        │  Cross-cutting: config, events, logging, metrics,        │
//!                        │                 shutdown                                 │
//!                        └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use strategy_gateway::config::{load_config, GatewayConfig};
use strategy_gateway::lifecycle::{wait_for_signal, Shutdown};
use strategy_gateway::observability::{logging, metrics};
use strategy_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "strategy-gateway")]
#[command(about = "Request gateway for the strategy platform services", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Built-in defaults are used if omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;

    tracing::info!("strategy-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        rate_limiting = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
