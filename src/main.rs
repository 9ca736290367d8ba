//! endpoint-gateway: control plane daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────┐
//!                  │                    CONTROL PLANE                         │
//!                  │                                                          │
//!  gatewayctl ─────┼─▶ admin API ──▶ EndpointStore ──▶ KvStore                │
//!                  │                                     │ watch(prefix, rev)  │
//!                  │                                     ▼                     │
//!                  │                               Reconciler                 │
//!                  │                 ┌──────────────┼──────────────┐           │
//!                  │                 ▼              ▼              ▼           │
//!                  │         DescriptorLoader  LoadBalancer   RouteTable       │
//!                  │                           Factory            │           │
//!                  │                                 │            │           │
//!                  │                                 ▼            ▼           │
//!                  │                          ServiceRegistry (GatewayFacade)  │
//!                  └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use endpoint_gateway::config::loader::load_config;
use endpoint_gateway::kv::MemoryStore;
use endpoint_gateway::lifecycle::signals::wait_for_signal;
use endpoint_gateway::observability;
use endpoint_gateway::{Gateway, GatewayConfig, Shutdown};

#[derive(Parser)]
#[command(name = "endpoint-gateway")]
#[command(about = "Runtime-reconfigurable API gateway control plane", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
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

    observability::logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "endpoint-gateway starting");
    tracing::info!(
        config = ?args.config,
        prefix = %config.store.endpoints_prefix,
        admin = %config.admin.bind_address,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.admin.bind_address).await?;
    let gateway = Gateway::build(config, Arc::new(MemoryStore::new()));

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));
    gateway.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
