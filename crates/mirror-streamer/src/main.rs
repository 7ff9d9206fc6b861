//! Sim-Mirror streamer: entry point.
//!
//! Runs next to the simulator.  Registers with the signaling relay as the
//! streamer, negotiates one transport session per viewer offer, keeps the
//! viewer supplied with frames while the screen is static, and turns viewer
//! gestures into taps and swipes on the booted device.
//!
//! # Usage
//!
//! ```text
//! mirror-streamer [OPTIONS]
//!
//! Options:
//!   --config <PATH>          TOML config file
//!   --signaling-url <URL>    Relay WebSocket URL (overrides the file)
//!   --log-level <FILTER>     Default log filter (overrides the file)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                        | Description                  |
//! |---------------------------------|------------------------------|
//! | `MIRROR_STREAMER_CONFIG`        | Path of the TOML config file |
//! | `MIRROR_STREAMER_SIGNALING_URL` | Relay WebSocket URL          |
//! | `MIRROR_STREAMER_LOG_LEVEL`     | Default log filter           |
//!
//! `RUST_LOG`, when set, wins over both the flag and the file.
//!
//! # Startup sequence (for beginners)
//!
//! 1. Parse flags, load the config file (or defaults) and apply overrides.
//! 2. Initialise `tracing`.
//! 3. Take one screenshot as a probe.  Failure is reported with a hint and
//!    the process carries on without video.
//! 4. Start the core (`run_streamer`) and the relay client.
//! 5. Wait for Ctrl+C, then stop the relay client and the core.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mirror_streamer::application::{run_streamer, FrameClock, FrameSource, StreamerPorts};
use mirror_streamer::domain::{load_config, StreamerConfig};
use mirror_streamer::infrastructure::{
    ProcessBridgeLauncher, SignalingClient, SimctlDeviceQuery, SimctlScreenshot,
    UnavailableTransportFactory,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Sim-Mirror streamer.
#[derive(Debug, Parser)]
#[command(
    name = "mirror-streamer",
    about = "Streams a booted simulator to one viewer and injects its gestures",
    version
)]
struct Cli {
    /// TOML config file.  Built-in defaults are used when omitted.
    #[arg(long, env = "MIRROR_STREAMER_CONFIG")]
    config: Option<PathBuf>,

    /// WebSocket URL of the signaling relay.
    #[arg(long, env = "MIRROR_STREAMER_SIGNALING_URL")]
    signaling_url: Option<String>,

    /// Default log filter, e.g. `info` or `mirror_streamer=debug`.
    #[arg(long, env = "MIRROR_STREAMER_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file (if any) and applies the flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// result fails validation.
    fn into_streamer_config(self) -> anyhow::Result<StreamerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("cannot load config {}", path.display()))?,
            None => StreamerConfig::default(),
        };

        if let Some(url) = self.signaling_url {
            config.signaling.url = url;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_streamer_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Sim-Mirror streamer starting; relay at {}", config.signaling.url);

    let clock = FrameClock::new();
    let capture = Arc::new(SimctlScreenshot::new(&config.device, clock));
    probe_capture(capture.as_ref()).await;

    let ports = StreamerPorts {
        transport: Arc::new(UnavailableTransportFactory),
        frames: capture,
        devices: Arc::new(SimctlDeviceQuery::new(config.device.clone())),
        launcher: Arc::new(ProcessBridgeLauncher::new(&config.bridge)),
        clock,
    };
    let (streamer, outbound) = run_streamer(&config, ports);

    let running = Arc::new(AtomicBool::new(true));
    let signaling = tokio::spawn(SignalingClient::new(&config.signaling).run(
        streamer.events(),
        outbound,
        Arc::clone(&running),
    ));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
    }

    running.store(false, Ordering::Relaxed);
    streamer.shutdown().await;
    let _ = signaling.await;

    info!("Sim-Mirror streamer stopped");
    Ok(())
}

/// Takes one screenshot and explains what to fix if it fails.
async fn probe_capture(source: &dyn FrameSource) {
    match source.capture_once().await {
        Ok(frame) => info!("capture probe ok ({} bytes)", frame.len()),
        Err(e) => {
            warn!("capture probe failed: {e}");
            warn!(
                "no video will be available; check that Xcode command line tools are \
                 installed, a simulator is booted (`xcrun simctl list devices booted`) \
                 and this terminal has Screen Recording permission"
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
