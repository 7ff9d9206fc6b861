//! Launches the injection bridge as a child process.
//!
//! The bridge is an external program (by default a Python script talking to
//! the device companion).  It learns which companion to use from the
//! `IDB_COMPANION_SOCKET` environment variable, reads one JSON command per
//! line on stdin, and answers one JSON line per command on stdout.  Its
//! stderr is inherited so its own diagnostics land in our terminal.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::application::device_query::BootedDevice;
use crate::application::injection_supervisor::{BridgeError, BridgeIo, BridgeLauncher};
use crate::domain::config::BridgeConfig;

/// Environment variable naming the companion endpoint for the bridge.
pub const COMPANION_SOCKET_ENV: &str = "IDB_COMPANION_SOCKET";

/// [`BridgeLauncher`] that spawns `command args...`.
#[derive(Debug, Clone)]
pub struct ProcessBridgeLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessBridgeLauncher {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl BridgeLauncher for ProcessBridgeLauncher {
    async fn launch(&self, device: &BootedDevice, endpoint: &Path) -> Result<BridgeIo, BridgeError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(COMPANION_SOCKET_ENV, endpoint)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(BridgeError::ChannelClosed)?;
        let stdout = child.stdout.take().ok_or(BridgeError::ChannelClosed)?;

        info!(
            "bridge launched for {} ({}) pid={:?}",
            device.name,
            device.udid,
            child.id()
        );

        Ok(BridgeIo {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            child: Some(child),
        })
    }
}
