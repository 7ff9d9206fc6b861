//! Device discovery and on-demand capture through `xcrun simctl` and `idb`.
//!
//! | Question          | Command                                      |
//! |-------------------|----------------------------------------------|
//! | booted device     | `xcrun simctl list devices booted --json`    |
//! | logical size      | `idb describe --udid <udid> --json`          |
//! | companion socket  | path template, checked for existence         |
//! | one screenshot    | `xcrun simctl io <device> screenshot <file>` |
//!
//! The JSON parsers are plain functions so they can be tested without the
//! tools installed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Output;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::application::device_query::{BootedDevice, DeviceQuery, DeviceQueryError};
use crate::application::frame_pump::{CaptureError, FrameClock, FrameSource};
use crate::domain::config::DeviceConfig;
use crate::domain::Frame;

// ── Output parsers ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SimctlDevices {
    devices: BTreeMap<String, Vec<SimctlDevice>>,
}

#[derive(Debug, Deserialize)]
struct SimctlDevice {
    udid: String,
    name: String,
    state: String,
}

/// Picks the first booted device from `simctl list devices --json` output.
///
/// Runtimes are visited in name order so the choice is stable.
///
/// # Errors
///
/// [`DeviceQueryError::Parse`] for malformed JSON,
/// [`DeviceQueryError::NoBootedDevice`] if nothing is booted.
pub fn parse_booted_device(json: &str) -> Result<BootedDevice, DeviceQueryError> {
    let list: SimctlDevices =
        serde_json::from_str(json).map_err(|e| DeviceQueryError::Parse(e.to_string()))?;

    list.devices
        .into_values()
        .flatten()
        .find(|d| d.state == "Booted")
        .map(|d| BootedDevice {
            udid: d.udid,
            name: d.name,
        })
        .ok_or(DeviceQueryError::NoBootedDevice)
}

#[derive(Debug, Deserialize)]
struct IdbDescription {
    screen_dimensions: ScreenDimensions,
}

#[derive(Debug, Deserialize)]
struct ScreenDimensions {
    width_points: f64,
    height_points: f64,
}

/// Extracts the logical screen size from `idb describe --json` output.
///
/// # Errors
///
/// [`DeviceQueryError::Parse`] if the JSON lacks the point dimensions.
pub fn parse_screen_size(json: &str) -> Result<(f64, f64), DeviceQueryError> {
    let description: IdbDescription =
        serde_json::from_str(json).map_err(|e| DeviceQueryError::Parse(e.to_string()))?;
    let dims = description.screen_dimensions;
    Ok((dims.width_points, dims.height_points))
}

// ── Command runner ────────────────────────────────────────────────────────────

/// Stdout on success, `(status, stderr)` otherwise.
fn check_output(program: &str, output: Output) -> Result<Vec<u8>, (String, String)> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    debug!("{program} failed: {}", output.status);
    Err((
        output.status.to_string(),
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ))
}

async fn run_query(program: &str, args: &[&str]) -> Result<String, DeviceQueryError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| DeviceQueryError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = check_output(program, output).map_err(|(status, stderr)| {
        DeviceQueryError::CommandFailed {
            program: program.to_string(),
            status,
            stderr,
        }
    })?;
    String::from_utf8(stdout).map_err(|e| DeviceQueryError::Parse(e.to_string()))
}

// ── DeviceQuery ───────────────────────────────────────────────────────────────

/// [`DeviceQuery`] backed by `xcrun simctl` and `idb`.
#[derive(Debug, Clone)]
pub struct SimctlDeviceQuery {
    config: DeviceConfig,
}

impl SimctlDeviceQuery {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeviceQuery for SimctlDeviceQuery {
    async fn booted_device(&self) -> Result<BootedDevice, DeviceQueryError> {
        let json = run_query(
            &self.config.xcrun,
            &["simctl", "list", "devices", "booted", "--json"],
        )
        .await?;
        parse_booted_device(&json)
    }

    async fn display_size(&self, udid: &str) -> Result<(f64, f64), DeviceQueryError> {
        let json = run_query(&self.config.idb, &["describe", "--udid", udid, "--json"]).await?;
        parse_screen_size(&json)
    }

    async fn injection_endpoint(&self, udid: &str) -> Result<PathBuf, DeviceQueryError> {
        let path = self.config.companion_socket(udid);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            _ => Err(DeviceQueryError::EndpointMissing(path)),
        }
    }
}

// ── FrameSource ───────────────────────────────────────────────────────────────

/// One-shot screenshots through `simctl io screenshot`.
#[derive(Debug, Clone)]
pub struct SimctlScreenshot {
    xcrun: String,
    target: String,
    clock: FrameClock,
}

impl SimctlScreenshot {
    pub fn new(config: &DeviceConfig, clock: FrameClock) -> Self {
        Self {
            xcrun: config.xcrun.clone(),
            target: config.capture_target.clone(),
            clock,
        }
    }
}

#[async_trait]
impl FrameSource for SimctlScreenshot {
    async fn capture_once(&self) -> Result<Frame, CaptureError> {
        let file = tempfile::Builder::new()
            .prefix("sim-mirror-")
            .suffix(".png")
            .tempfile()?;
        let path = file.path().to_path_buf();

        let output = Command::new(&self.xcrun)
            .args(["simctl", "io", &self.target, "screenshot"])
            .arg(&path)
            .output()
            .await
            .map_err(|source| CaptureError::Spawn {
                program: self.xcrun.clone(),
                source,
            })?;

        check_output(&self.xcrun, output).map_err(|(status, stderr)| {
            CaptureError::CommandFailed {
                program: self.xcrun.clone(),
                status,
                stderr,
            }
        })?;

        let image = tokio::fs::read(&path).await?;
        if image.is_empty() {
            return Err(CaptureError::Empty);
        }
        debug!("on-demand screenshot: {} bytes", image.len());
        Ok(Frame::new(image, self.clock.now()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
