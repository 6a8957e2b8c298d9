//! Pulse hub server -- realtime presence and message delivery.
//!
//! An axum WebSocket server that tracks presence, fans chat messages and
//! receipts out to connected devices, and relays group events between
//! members. Runs against the in-memory store by default.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin pulse-server
//!
//! # Run on custom address
//! cargo run --bin pulse-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! PULSE_ADDR=127.0.0.1:8080 cargo run --bin pulse-server
//! ```

use std::sync::Arc;

use clap::Parser;
use pulse_server::config::{ServerCliArgs, ServerConfig};
use pulse_server::realtime::Realtime;
use pulse_server::socket;
use pulse_server::store::MemoryStore;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting pulse hub server");

    let service = Realtime::new(Arc::new(MemoryStore::new()), config.typing_quiet());

    match socket::start_server(&config.bind_addr, service).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "hub server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "hub server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start hub server");
            std::process::exit(1);
        }
    }
}
