//! Injection bridge supervisor.
//!
//! Owns everything needed to turn an [`InputPrimitive`] into a tap or swipe
//! on the device: the booted device's identity, its [`DeviceGeometry`], and a
//! long-lived bridge child process that speaks newline-delimited JSON.
//!
//! # State machine
//!
//! ```text
//!               request_resolve()
//! Unresolved ─────────────────────▶ Resolving ──▶ Starting ──▶ Ready
//!                                      │             │          │
//!                                      └─────────────┴──────────┴──▶ Failed(reason)
//! ```
//!
//! - Resolution runs on its own task so the coordinator never waits on
//!   `simctl` or `idb`.
//! - Any failure lands in `Failed`.  Nothing retries automatically; the next
//!   explicit [`BridgeSupervisor::request_resolve`] is the only way out.
//! - When the bridge process exits the supervisor moves to `Failed` and does
//!   not respawn it.  The device behind it may have changed, and injecting
//!   into the wrong device is worse than not injecting at all.
//!
//! # Single writer
//!
//! The bridge's stdin is owned by one writer task fed from a bounded queue,
//! so concurrent [`send`](BridgeSupervisor::send) calls can never interleave
//! partial lines.  `send` uses `try_send` and never blocks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines,
};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mirror_core::protocol::codec::{decode_bridge_reply, encode_bridge_line};
use mirror_core::{
    BridgeCommand, ChromeCorrection, DeviceGeometry, GeometryError, InputPrimitive, ProtocolError,
};

use super::device_query::{BootedDevice, DeviceQuery, DeviceQueryError};
use crate::sync::relock;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Lifecycle of the bridge channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BridgeStatus {
    #[default]
    Unresolved,
    Resolving,
    Starting,
    Ready,
    Failed(String),
}

impl BridgeStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, BridgeStatus::Ready)
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeStatus::Unresolved => f.write_str("unresolved"),
            BridgeStatus::Resolving => f.write_str("resolving"),
            BridgeStatus::Starting => f.write_str("starting"),
            BridgeStatus::Ready => f.write_str("ready"),
            BridgeStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Errors from resolving, starting or writing to the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("device query failed: {0}")]
    Device(#[from] DeviceQueryError),

    #[error("invalid device geometry: {0}")]
    Geometry(#[from] GeometryError),

    /// The bridge process could not be spawned.
    #[error("failed to launch bridge {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bridge did not report ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error("bridge exited before reporting ready")]
    ExitedBeforeReady,

    /// The first line from the bridge was not the readiness line.
    #[error("bridge handshake failed: {0}")]
    Handshake(String),

    #[error("bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bridge not ready ({0})")]
    NotReady(BridgeStatus),

    #[error("bridge command queue full")]
    QueueFull,

    #[error("bridge channel closed")]
    ChannelClosed,

    #[error("failed to encode bridge command: {0}")]
    Encode(#[from] ProtocolError),
}

/// Pipes to a freshly launched bridge.
pub struct BridgeIo {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// The child process, when there is one.  Dropping it kills the bridge.
    pub child: Option<Child>,
}

/// Starts the bridge for a resolved device.
#[async_trait]
pub trait BridgeLauncher: Send + Sync {
    /// Launches a bridge targeting `endpoint` on `device`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Spawn`] if the process cannot be started.
    async fn launch(&self, device: &BootedDevice, endpoint: &Path) -> Result<BridgeIo, BridgeError>;
}

/// Tunables for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub chrome: Option<ChromeCorrection>,
    pub ready_timeout: Duration,
    pub queue_depth: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            chrome: None,
            ready_timeout: Duration::from_secs(10),
            queue_depth: 64,
        }
    }
}

// ── Live channel ──────────────────────────────────────────────────────────────

struct LiveChannel {
    generation: u64,
    udid: String,
    commands: mpsc::Sender<String>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    _child: Option<Child>,
}

impl LiveChannel {
    fn shutdown(self) {
        self.writer.abort();
        self.reader.abort();
    }
}

type ReplyLines = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// A bridge that has passed its readiness handshake.
struct Handshaken {
    device: BootedDevice,
    endpoint: PathBuf,
    stdin: Box<dyn AsyncWrite + Send + Unpin>,
    replies: ReplyLines,
    child: Option<Child>,
}

// ── Supervisor ────────────────────────────────────────────────────────────────

struct SupervisorShared {
    query: Arc<dyn DeviceQuery>,
    launcher: Arc<dyn BridgeLauncher>,
    settings: SupervisorSettings,
    status: watch::Sender<BridgeStatus>,
    geometry: watch::Sender<DeviceGeometry>,
    channel: Mutex<Option<LiveChannel>>,
    generation: AtomicU64,
    resolving: Mutex<Option<JoinHandle<()>>>,
}

/// Supervises discovery, startup and delivery for the injection bridge.
///
/// Cheap to clone; clones share one bridge.
#[derive(Clone)]
pub struct BridgeSupervisor {
    shared: Arc<SupervisorShared>,
}

impl BridgeSupervisor {
    pub fn new(
        query: Arc<dyn DeviceQuery>,
        launcher: Arc<dyn BridgeLauncher>,
        settings: SupervisorSettings,
    ) -> Self {
        let (status, _) = watch::channel(BridgeStatus::Unresolved);
        let (geometry, _) = watch::channel(DeviceGeometry::UNRESOLVED);
        Self {
            shared: Arc::new(SupervisorShared {
                query,
                launcher,
                settings,
                status,
                geometry,
                channel: Mutex::new(None),
                generation: AtomicU64::new(0),
                resolving: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> BridgeStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<BridgeStatus> {
        self.shared.status.subscribe()
    }

    /// Geometry snapshots, updated each time resolution reads the display.
    pub fn geometry(&self) -> watch::Receiver<DeviceGeometry> {
        self.shared.geometry.subscribe()
    }

    /// Starts a resolution on a background task.
    ///
    /// A resolution already in flight is cancelled first.  Must be called
    /// from within a Tokio runtime.
    pub fn request_resolve(&self) {
        let this = self.clone();
        let mut slot = relock(&self.shared.resolving);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move { this.resolve().await }));
    }

    /// Runs one full resolution: tear down, discover, launch, handshake.
    pub async fn resolve(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(old) = relock(&self.shared.channel).take() {
            info!("tearing down bridge for {}", old.udid);
            old.shutdown();
        }
        self.set_status(generation, BridgeStatus::Resolving);

        let ready = match self.handshake(generation).await {
            Ok(ready) => ready,
            Err(e) => {
                warn!("bridge resolution failed: {e}");
                self.set_status(generation, BridgeStatus::Failed(e.to_string()));
                return;
            }
        };

        let Handshaken {
            device,
            endpoint,
            stdin,
            replies,
            child,
        } = ready;

        let (tx, rx) = mpsc::channel(self.shared.settings.queue_depth);
        let writer = tokio::spawn(async move {
            if let Err(e) = write_commands(stdin, rx).await {
                warn!("bridge write failed: {e}");
            }
        });

        // Spawn the reader and publish Ready under the channel lock so an
        // immediate exit is always observed after Ready.
        let mut slot = relock(&self.shared.channel);
        if self.current_generation() != generation {
            writer.abort();
            return;
        }
        let this = self.clone();
        let reader = tokio::spawn(async move { this.watch_replies(replies, generation).await });
        info!(
            "bridge ready for {} ({}) via {}",
            device.name,
            device.udid,
            endpoint.display()
        );
        *slot = Some(LiveChannel {
            generation,
            udid: device.udid,
            commands: tx,
            writer,
            reader,
            _child: child,
        });
        self.set_status(generation, BridgeStatus::Ready);
    }

    /// Queues `primitive` for the bridge.
    ///
    /// Never blocks and never queues while the bridge is not `Ready`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NotReady`] when the bridge is not `Ready`.
    /// - [`BridgeError::QueueFull`] when the writer has fallen behind.
    /// - [`BridgeError::ChannelClosed`] when the writer has gone away.
    pub fn send(&self, primitive: &InputPrimitive) -> Result<(), BridgeError> {
        let status = self.status();
        if !status.is_ready() {
            return Err(BridgeError::NotReady(status));
        }

        let line = encode_bridge_line(&BridgeCommand::from(primitive))?;
        let slot = relock(&self.shared.channel);
        let channel = slot.as_ref().ok_or(BridgeError::ChannelClosed)?;
        channel.commands.try_send(line).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BridgeError::ChannelClosed,
        })
    }

    /// Stops any resolution in flight and kills the bridge.
    pub fn shutdown(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = relock(&self.shared.resolving).take() {
            task.abort();
        }
        if let Some(channel) = relock(&self.shared.channel).take() {
            channel.shutdown();
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn current_generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Publishes `status` unless a newer resolution has started since.
    fn set_status(&self, generation: u64, status: BridgeStatus) {
        if self.current_generation() != generation {
            return;
        }
        debug!("bridge status → {status}");
        self.shared.status.send_replace(status);
    }

    /// Publishes `geometry` unless a newer resolution has started since.
    fn publish_geometry(&self, generation: u64, geometry: DeviceGeometry) {
        if self.current_generation() != generation {
            return;
        }
        self.shared.geometry.send_replace(geometry);
    }

    async fn discover_geometry(&self) -> Result<(BootedDevice, DeviceGeometry), BridgeError> {
        let query = &self.shared.query;
        let chrome = self.shared.settings.chrome;

        let device = query.booted_device().await?;
        info!("booted device: {} ({})", device.name, device.udid);

        let (width, height) = query.display_size(&device.udid).await?;
        let geometry = DeviceGeometry::new(width, height, chrome)?;
        info!(
            "device geometry {}x{} pt (chrome correction: {})",
            width,
            height,
            if chrome.is_some() { "on" } else { "off" }
        );
        Ok((device, geometry))
    }

    async fn handshake(&self, generation: u64) -> Result<Handshaken, BridgeError> {
        let query = &self.shared.query;
        let settings = &self.shared.settings;

        let (device, geometry) = match self.discover_geometry().await {
            Ok(found) => found,
            Err(e) => {
                self.publish_geometry(generation, DeviceGeometry::UNRESOLVED);
                return Err(e);
            }
        };
        self.publish_geometry(generation, geometry);

        let endpoint = query.injection_endpoint(&device.udid).await?;
        self.set_status(generation, BridgeStatus::Starting);

        let io = self.shared.launcher.launch(&device, &endpoint).await?;
        let mut replies = BufReader::new(io.stdout).lines();
        wait_for_ready(&mut replies, settings.ready_timeout).await?;

        Ok(Handshaken {
            device,
            endpoint,
            stdin: io.stdin,
            replies,
            child: io.child,
        })
    }

    async fn watch_replies(self, mut replies: ReplyLines, generation: u64) {
        loop {
            match replies.next_line().await {
                Ok(Some(line)) => log_reply(&line),
                Ok(None) => break,
                Err(e) => {
                    warn!("bridge read failed: {e}");
                    break;
                }
            }
        }
        self.on_channel_closed(generation);
    }

    fn on_channel_closed(&self, generation: u64) {
        let mut slot = relock(&self.shared.channel);
        if !slot.as_ref().is_some_and(|c| c.generation == generation) {
            return;
        }
        if let Some(channel) = slot.take() {
            warn!("bridge for {} exited; waiting for re-resolve", channel.udid);
            channel.writer.abort();
        }
        self.set_status(generation, BridgeStatus::Failed("bridge process exited".into()));
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Waits for the bridge's `{"ok":true,"status":"ready"}` line.
async fn wait_for_ready<R>(replies: &mut Lines<R>, limit: Duration) -> Result<(), BridgeError>
where
    R: AsyncBufRead + Unpin,
{
    let line = match timeout(limit, replies.next_line()).await {
        Err(_) => return Err(BridgeError::ReadyTimeout(limit)),
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(None)) => return Err(BridgeError::ExitedBeforeReady),
        Ok(Ok(Some(line))) => line,
    };

    match decode_bridge_reply(&line) {
        Ok(reply) if reply.is_ready() => Ok(()),
        Ok(reply) => Err(BridgeError::Handshake(reply.error.unwrap_or(line))),
        Err(_) => Err(BridgeError::Handshake(line)),
    }
}

/// Drains `commands` into `sink`, one flushed line at a time.
async fn write_commands<W>(mut sink: W, mut commands: mpsc::Receiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = commands.recv().await {
        sink.write_all(line.as_bytes()).await?;
        sink.flush().await?;
    }
    Ok(())
}

fn log_reply(line: &str) {
    match decode_bridge_reply(line) {
        Ok(reply) if reply.ok => debug!("bridge ack"),
        Ok(reply) => warn!(
            "bridge reported error: {}",
            reply.error.as_deref().unwrap_or("unknown")
        ),
        Err(_) => debug!("bridge output: {line}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
