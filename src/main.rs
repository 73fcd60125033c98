//! WebSocket-to-TCP Tunnel Server
//!
//! Accepts WebSocket connections on `/tunnel` and relays each one to a TCP
//! endpoint chosen by the client in its first message:
//!
//! ```json
//! {"host": "10.0.0.5", "port": 5432}
//! ```
//!
//! Every later message is raw payload for the target, and everything the
//! target sends comes back as binary messages.

#![deny(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::style)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod protocol;
mod server;

use config::Config;
use server::{SessionSettings, TunnelServer};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

#[derive(Parser, Debug)]
#[command(name = "ws-tunnel")]
#[command(author, version, about = "Relay WebSocket clients to TCP endpoints")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "WS_TUNNEL_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "WS_TUNNEL_PORT")]
    port: Option<u16>,

    /// Largest inbound WebSocket message in bytes (default: unbounded)
    #[arg(long, env = "WS_TUNNEL_MAX_MESSAGE_SIZE")]
    max_message_size: Option<usize>,

    /// Seconds to wait for an upstream TCP connection (default: no limit)
    #[arg(long, env = "WS_TUNNEL_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Path to the config file
    #[arg(short, long, env = "WS_TUNNEL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Everything needed to start the listener
#[derive(Debug)]
struct Resolved {
    host: String,
    port: u16,
    settings: SessionSettings,
}

/// Flags and environment win over the config file, which wins over defaults
fn resolve(cli: Cli, config: Config) -> Resolved {
    let server = config.server;
    Resolved {
        host: cli
            .host
            .or(server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: cli.port.or(server.port).unwrap_or(DEFAULT_PORT),
        settings: SessionSettings {
            max_message_size: cli.max_message_size.or(server.max_message_size),
            connect_timeout: cli
                .connect_timeout
                .or(server.connect_timeout_secs)
                .map(Duration::from_secs),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let resolved = resolve(cli, config);

    let server = TunnelServer::bind((resolved.host.as_str(), resolved.port), resolved.settings)
        .await
        .with_context(|| format!("Failed to bind {}:{}", resolved.host, resolved.port))?;

    info!(
        "WebSocket tunnel server listening on {}",
        server.local_addr()?
    );

    let shutdown = CancellationToken::new();
    let listener = tokio::spawn(server.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    shutdown.cancel();
    listener.await.context("Listener task failed")?;

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
