//! tcp-server: length-prefixed echo server.
//!
//! ```text
//!     client ──frame──▶ listener ──▶ connection (inbound pump)
//!                                        │
//!                                        ▼
//!                                   EchoHandler::on_message
//!                                        │ send
//!                                        ▼
//!     client ◀──frame── connection (outbound pump)
//! ```
//!
//! Configuration comes from an optional TOML file; `--bind` and
//! `--log-level` override it. Ctrl-C or SIGTERM closes the server.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;

use tcp_server::config::{load_config, ServerConfig};
use tcp_server::lifecycle::signals::shutdown_signal;
use tcp_server::observability::{logging, metrics};
use tcp_server::{Connection, EventHandler, LengthPrefixed, Server};

#[derive(Parser, Debug)]
#[command(name = "tcp-server", version, about = "Length-prefixed TCP echo server")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level or filter directive, overriding the configuration
    #[arg(long)]
    log_level: Option<String>,
}

/// Writes every message back to its sender.
struct EchoHandler;

#[async_trait]
impl EventHandler<Bytes> for EchoHandler {
    async fn on_connect(&self, conn: &Connection<Bytes>) {
        tracing::info!(peer = conn.remote_addr(), id = %conn.id(), "Client connected");
    }

    async fn on_message(&self, conn: &Connection<Bytes>, message: Bytes) {
        if let Err(e) = conn.send(message).await {
            tracing::debug!(peer = conn.remote_addr(), error = %e, "Echo dropped");
        }
    }

    async fn on_close(&self, conn: &Connection<Bytes>) {
        let reason = conn
            .close_reason()
            .map(|reason| reason.to_string())
            .unwrap_or_default();
        tracing::info!(peer = conn.remote_addr(), %reason, "Client disconnected");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_message_size = config.connection.max_message_size,
        "tcp-server starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = Arc::new(Server::with_config(config, EchoHandler, LengthPrefixed::new())?);

    let closer = Arc::clone(&server);
    tokio::spawn(async move {
        shutdown_signal().await;
        closer.close();
    });

    match server.listen_and_serve().await {
        Err(e) if e.is_closed() => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Server stopped");
            Err(e.into())
        }
        Ok(()) => Ok(()),
    }
}
