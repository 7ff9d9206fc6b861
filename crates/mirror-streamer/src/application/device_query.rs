//! Seam to the device-management layer.
//!
//! The supervisor asks three questions during resolution: which device is
//! booted, how big is its screen, and where is its companion endpoint.  The
//! production answers come from `xcrun simctl` and `idb`; tests script them.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from device discovery.
#[derive(Debug, Error)]
pub enum DeviceQueryError {
    /// The tool could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The tool's output was not what we expected.
    #[error("unexpected device tool output: {0}")]
    Parse(String),

    /// No device is currently booted.
    #[error("no booted device found")]
    NoBootedDevice,

    /// The companion endpoint for the device does not exist.
    #[error("companion endpoint {0} does not exist")]
    EndpointMissing(PathBuf),
}

/// The currently active target device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootedDevice {
    pub udid: String,
    pub name: String,
}

/// Answers the supervisor's discovery questions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceQuery: Send + Sync {
    /// The first booted device.
    async fn booted_device(&self) -> Result<BootedDevice, DeviceQueryError>;

    /// Logical screen size `(width, height)` in points.
    async fn display_size(&self, udid: &str) -> Result<(f64, f64), DeviceQueryError>;

    /// Path of the device's injection companion endpoint.  Must exist.
    async fn injection_endpoint(&self, udid: &str) -> Result<PathBuf, DeviceQueryError>;
}
