//! ARmigate demo host.
//!
//! Serves a "Hello World" application behind the inspection gate.
//!
//! ```text
//!     Client Request   ┌──────────────────────────────────────────┐
//!     ────────────────▶│  inspection middleware                   │
//!                      │    fingerprint → scoring API ─────────────┼──▶ ARmigate
//!                      │    ◀── verdict (allow / block / skip) ────┼───
//!                      │                                          │
//!     Block page       │    block ──▶ staged response             │
//!     ◀────────────────│    allow ──▶ application handlers        │
//!                      └──────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use armigate::config::load_config;
use armigate::observability::{logging, metrics};
use armigate::{Gate, HttpServer};

#[derive(Parser)]
#[command(name = "armigate")]
#[command(about = "Demo application protected by the ARmigate inspection gate", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "armigate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability);

    tracing::info!("armigate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoint = %config.gate.endpoint,
        ssl = config.gate.ssl,
        timeout_ms = config.gate.timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gate = Arc::new(Gate::new(&config.gate)?);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, gate);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
