//! Streamer configuration: TOML file schema and loader.
//!
//! Every field has a default, so the streamer runs without any config file
//! and a file only needs to mention what it changes:
//!
//! ```toml
//! log_level = "debug"
//!
//! [signaling]
//! url = "ws://192.168.1.20:8765"
//!
//! [bridge]
//! command = "/opt/homebrew/bin/python3.11"
//! args = ["scripts/touch_bridge.py"]
//!
//! [chrome]
//! enabled = true
//! top_bar_offset = 60.0
//! window_height = 900.0
//! content_height = 844.0
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the return
//! value of `some_fn()` when absent, and whole sections fall back to their
//! `Default` impl through `#[serde(default)]`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mirror_core::ChromeCorrection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level streamer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamerConfig {
    /// Default `tracing` filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub signaling: SignalingConfig,
    #[serde(default)]
    pub pump: PumpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub chrome: ChromeConfig,
}

/// Connection to the signaling relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay.
    #[serde(default = "default_signaling_url")]
    pub url: String,
    /// Delay between reconnect attempts after the relay connection drops.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Frame liveness pump.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PumpConfig {
    #[serde(default = "default_pump_interval_ms")]
    pub interval_ms: u64,
    /// Frames waiting for the transport beyond this many are dropped.
    #[serde(default = "default_frame_queue_depth")]
    pub frame_queue_depth: usize,
}

/// Session coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// How often outbound bandwidth is logged while connected.
    #[serde(default = "default_bandwidth_sample_interval_ms")]
    pub bandwidth_sample_interval_ms: u64,
}

/// Gesture classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputConfig {
    /// Movement below this many device points is a tap.
    #[serde(default = "default_tap_threshold")]
    pub tap_threshold: f64,
    /// Duration given to every swipe.
    #[serde(default = "default_swipe_duration_ms")]
    pub swipe_duration_ms: u64,
}

/// Injection bridge child process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_command")]
    pub command: String,
    #[serde(default = "default_bridge_args")]
    pub args: Vec<String>,
    /// How long to wait for the bridge's readiness line.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Commands waiting for the bridge beyond this many are dropped.
    #[serde(default = "default_bridge_queue_depth")]
    pub queue_depth: usize,
}

/// Device-management tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_xcrun")]
    pub xcrun: String,
    #[serde(default = "default_idb")]
    pub idb: String,
    /// Path of the companion socket; `{udid}` is replaced by the device id.
    #[serde(default = "default_companion_socket_template")]
    pub companion_socket_template: String,
    /// Device argument passed to `simctl io` for on-demand screenshots.
    #[serde(default = "default_capture_target")]
    pub capture_target: String,
}

/// Window-chrome correction for captures that include the title bar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChromeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub top_bar_offset: f64,
    #[serde(default)]
    pub window_height: f64,
    #[serde(default)]
    pub content_height: f64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_signaling_url() -> String {
    "ws://127.0.0.1:8765".to_string()
}
fn default_reconnect_interval_ms() -> u64 {
    2_000
}
fn default_pump_interval_ms() -> u64 {
    500
}
fn default_frame_queue_depth() -> usize {
    4
}
fn default_bandwidth_sample_interval_ms() -> u64 {
    2_000
}
fn default_tap_threshold() -> f64 {
    mirror_core::TAP_THRESHOLD
}
fn default_swipe_duration_ms() -> u64 {
    mirror_core::SWIPE_DURATION.as_millis() as u64
}
fn default_bridge_command() -> String {
    "python3".to_string()
}
fn default_bridge_args() -> Vec<String> {
    vec!["scripts/touch_bridge.py".to_string()]
}
fn default_ready_timeout_ms() -> u64 {
    10_000
}
fn default_bridge_queue_depth() -> usize {
    64
}
fn default_xcrun() -> String {
    "xcrun".to_string()
}
fn default_idb() -> String {
    "idb".to_string()
}
fn default_companion_socket_template() -> String {
    "/tmp/idb/{udid}_companion.sock".to_string()
}
fn default_capture_target() -> String {
    "booted".to_string()
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            signaling: SignalingConfig::default(),
            pump: PumpConfig::default(),
            session: SessionConfig::default(),
            input: InputConfig::default(),
            bridge: BridgeConfig::default(),
            device: DeviceConfig::default(),
            chrome: ChromeConfig::default(),
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: default_signaling_url(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_pump_interval_ms(),
            frame_queue_depth: default_frame_queue_depth(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bandwidth_sample_interval_ms: default_bandwidth_sample_interval_ms(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            tap_threshold: default_tap_threshold(),
            swipe_duration_ms: default_swipe_duration_ms(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_bridge_command(),
            args: default_bridge_args(),
            ready_timeout_ms: default_ready_timeout_ms(),
            queue_depth: default_bridge_queue_depth(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            xcrun: default_xcrun(),
            idb: default_idb(),
            companion_socket_template: default_companion_socket_template(),
            capture_target: default_capture_target(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl SignalingConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl PumpConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl SessionConfig {
    pub fn bandwidth_sample_interval(&self) -> Duration {
        Duration::from_millis(self.bandwidth_sample_interval_ms)
    }
}

impl InputConfig {
    pub fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.swipe_duration_ms)
    }
}

impl BridgeConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl DeviceConfig {
    /// Companion socket path for `udid`.
    pub fn companion_socket(&self, udid: &str) -> PathBuf {
        PathBuf::from(self.companion_socket_template.replace("{udid}", udid))
    }
}

impl ChromeConfig {
    /// The correction to apply, or `None` when disabled.
    pub fn correction(&self) -> Option<ChromeCorrection> {
        self.enabled.then_some(ChromeCorrection {
            top_bar_offset: self.top_bar_offset,
            window_height: self.window_height,
            content_height: self.content_height,
        })
    }
}

impl StreamerConfig {
    /// Rejects values that would make a component misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        if self.pump.interval_ms == 0 {
            return Err(invalid("pump.interval_ms", "must be greater than zero"));
        }
        if self.pump.frame_queue_depth == 0 {
            return Err(invalid("pump.frame_queue_depth", "must be greater than zero"));
        }
        if self.session.bandwidth_sample_interval_ms == 0 {
            return Err(invalid(
                "session.bandwidth_sample_interval_ms",
                "must be greater than zero",
            ));
        }
        if !(self.input.tap_threshold.is_finite() && self.input.tap_threshold > 0.0) {
            return Err(invalid("input.tap_threshold", "must be a positive number"));
        }
        if self.bridge.queue_depth == 0 {
            return Err(invalid("bridge.queue_depth", "must be greater than zero"));
        }
        if self.bridge.command.trim().is_empty() {
            return Err(invalid("bridge.command", "must not be empty"));
        }
        if !self.device.companion_socket_template.contains("{udid}") {
            return Err(invalid(
                "device.companion_socket_template",
                "must contain the {udid} placeholder",
            ));
        }
        if let Some(chrome) = self.chrome.correction() {
            mirror_core::DeviceGeometry::new(1.0, 1.0, Some(chrome)).map_err(|e| {
                ConfigError::Invalid {
                    field: "chrome",
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }
}

// ── Loader ────────────────────────────────────────────────────────────────────

/// Parses and validates a config from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed TOML and
/// [`ConfigError::Invalid`] for out-of-range values.
pub fn parse_config(content: &str) -> Result<StreamerConfig, ConfigError> {
    let cfg: StreamerConfig = toml::from_str(content)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Loads the config file at `path`.
///
/// Unlike a settings store, an explicitly named file that does not exist is
/// an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<StreamerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
