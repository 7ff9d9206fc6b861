//! Sim-Mirror signaling relay: entry point.
//!
//! The relay pairs exactly one streamer with at most one active viewer and
//! forwards the session-setup messages (offer, answer, ICE candidates)
//! between them.  It never inspects the session descriptions themselves.
//!
//! # Usage
//!
//! ```text
//! mirror-relay [OPTIONS]
//!
//! Options:
//!   --port <PORT>          WebSocket listener port [default: 8765]
//!   --bind <ADDR>          Interface to bind       [default: 0.0.0.0]
//!   --log-level <FILTER>   Default log filter      [default: info]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                 | Default   | Description             |
//! |--------------------------|-----------|-------------------------|
//! | `MIRROR_RELAY_PORT`      | `8765`    | WebSocket listener port |
//! | `MIRROR_RELAY_BIND`      | `0.0.0.0` | Interface to bind       |
//! | `MIRROR_RELAY_LOG_LEVEL` | `info`    | Default log filter      |
//!
//! `RUST_LOG`, when set, wins over `--log-level`.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mirror_relay::domain::RelayConfig;
use mirror_relay::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Sim-Mirror signaling relay.
#[derive(Debug, Parser)]
#[command(
    name = "mirror-relay",
    about = "Pairs one Sim-Mirror streamer with one viewer and relays session setup",
    version
)]
struct Cli {
    /// TCP port for the WebSocket listener.
    #[arg(long, default_value_t = 8765, env = "MIRROR_RELAY_PORT")]
    port: u16,

    /// IP address to bind.
    ///
    /// `0.0.0.0` accepts viewers from the LAN; `127.0.0.1` keeps the relay
    /// local to this machine.
    #[arg(long, default_value = "0.0.0.0", env = "MIRROR_RELAY_BIND")]
    bind: String,

    /// Default log filter when `RUST_LOG` is not set.
    #[arg(long, default_value = "info", env = "MIRROR_RELAY_LOG_LEVEL")]
    log_level: String,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address.
    fn into_relay_config(&self) -> anyhow::Result<RelayConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.port))?;

        Ok(RelayConfig {
            bind_addr,
            ..RelayConfig::default()
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = cli.into_relay_config()?;

    info!("Sim-Mirror relay starting on {}", config.bind_addr);

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("Sim-Mirror relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
