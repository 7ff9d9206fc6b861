//! In-memory implementations of the streamer's seams for testing.
//!
//! The real seams run `xcrun`, `idb`, a Python bridge and a WebRTC engine,
//! none of which exist on a CI machine.  The types here record what the core
//! asked of them and let a test play the engine's side of a session.
//!
//! # Usage in tests
//!
//! ```ignore
//! let factory = Arc::new(MockTransportFactory::new());
//! // ... post an offer to the coordinator ...
//! let session = factory.session(0);
//! session.emit_state(ConnectionState::Connected);
//! assert_eq!(session.close_count(), 0);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Notify;

use crate::application::device_query::{BootedDevice, DeviceQuery, DeviceQueryError};
use crate::application::frame_pump::{CaptureError, FrameSource};
use crate::application::injection_supervisor::{BridgeError, BridgeIo, BridgeLauncher};
use crate::application::transport::{
    ConnectionState, IceCandidate, TransportError, TransportEvent, TransportEvents,
    TransportFactory, TransportSession,
};
use crate::domain::{Frame, SessionId};
use crate::sync::relock;

// ── Transport ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnswerMode {
    Echo,
    Fail,
}

/// Opens [`MockTransport`] sessions and keeps every one it opened.
///
/// All sessions share one journal, so the order of `open`, `answer` and
/// `close` calls across sessions can be asserted.
pub struct MockTransportFactory {
    answers: AnswerMode,
    unavailable: bool,
    gate: Option<Arc<Notify>>,
    sessions: Mutex<Vec<Arc<MockTransport>>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl Default for MockTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportFactory {
    /// Answers every offer immediately with `answer-to:<offer>`.
    pub fn new() -> Self {
        Self {
            answers: AnswerMode::Echo,
            unavailable: false,
            gate: None,
            sessions: Mutex::new(Vec::new()),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Each `create_answer` waits for one [`Notify::notify_one`] on
    /// [`gate`](Self::gate).
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::new()
        }
    }

    /// Every `create_answer` fails.
    pub fn failing_answers() -> Self {
        Self {
            answers: AnswerMode::Fail,
            ..Self::new()
        }
    }

    /// `open` itself fails, as with no engine linked.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    /// The gate shared by all sessions.  A fresh, unused one if not gated.
    pub fn gate(&self) -> Arc<Notify> {
        self.gate.clone().unwrap_or_default()
    }

    /// The `index`-th session opened.  Panics if there is none.
    pub fn session(&self, index: usize) -> Arc<MockTransport> {
        Arc::clone(&relock(&self.sessions)[index])
    }

    pub fn opened(&self) -> usize {
        relock(&self.sessions).len()
    }

    /// Every call made on any session, e.g. `["open:1", "answer:1", "close:1"]`.
    pub fn journal(&self) -> Vec<String> {
        relock(&self.journal).clone()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn open(
        &self,
        session: SessionId,
        events: TransportEvents,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        if self.unavailable {
            return Err(TransportError::Unavailable);
        }
        relock(&self.journal).push(format!("open:{}", session.0));
        let transport = Arc::new(MockTransport {
            id: session,
            events,
            answers: self.answers,
            gate: self.gate.clone(),
            journal: Arc::clone(&self.journal),
            closes: AtomicUsize::new(0),
            frames: Mutex::new(Vec::new()),
            remote_candidates: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            bytes_sent: AtomicU64::new(0),
            bytes_sent_reads: AtomicUsize::new(0),
        });
        relock(&self.sessions).push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// A scripted peer connection.
pub struct MockTransport {
    id: SessionId,
    events: TransportEvents,
    answers: AnswerMode,
    gate: Option<Arc<Notify>>,
    journal: Arc<Mutex<Vec<String>>>,
    closes: AtomicUsize,
    frames: Mutex<Vec<Frame>>,
    remote_candidates: Mutex<Vec<String>>,
    sent: Mutex<Vec<Vec<u8>>>,
    bytes_sent: AtomicU64,
    bytes_sent_reads: AtomicUsize,
}

impl MockTransport {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Fires the engine's local-candidate callback.
    pub fn emit_local_candidate(&self, candidate: &str) {
        self.events
            .emit(TransportEvent::LocalCandidate(IceCandidate {
                candidate: candidate.to_string(),
                sdp_m_line_index: 0,
                sdp_mid: Some("0".to_string()),
            }));
    }

    /// Fires the engine's connection-state callback.
    pub fn emit_state(&self, state: ConnectionState) {
        self.events.emit(TransportEvent::ConnectionState(state));
    }

    /// Fires the engine's data-channel callback.
    pub fn emit_data(&self, bytes: &[u8]) {
        self.events.emit(TransportEvent::DataMessage(bytes.to_vec()));
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<Frame> {
        relock(&self.frames).clone()
    }

    pub fn remote_candidates(&self) -> Vec<String> {
        relock(&self.remote_candidates).clone()
    }

    /// Pretends the encoder sent `bytes` more payload.
    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::SeqCst);
    }

    /// How many times the byte counter has been sampled.
    pub fn bytes_sent_reads(&self) -> usize {
        self.bytes_sent_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportSession for MockTransport {
    async fn create_answer(&self, offer_sdp: &str) -> Result<String, TransportError> {
        relock(&self.journal).push(format!("answer:{}", self.id.0));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.answers {
            AnswerMode::Echo => Ok(format!("answer-to:{offer_sdp}")),
            AnswerMode::Fail => Err(TransportError::Negotiation("scripted failure".into())),
        }
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        relock(&self.remote_candidates).push(candidate.candidate);
        Ok(())
    }

    fn push_frame(&self, frame: &Frame) {
        self.bytes_sent
            .fetch_add(frame.len() as u64, Ordering::SeqCst);
        relock(&self.frames).push(frame.clone());
    }

    fn send_data(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.close_count() > 0 {
            return Err(TransportError::Closed);
        }
        relock(&self.sent).push(bytes.to_vec());
        Ok(())
    }

    fn bytes_sent(&self) -> u64 {
        self.bytes_sent_reads.fetch_add(1, Ordering::SeqCst);
        self.bytes_sent.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        relock(&self.journal).push(format!("close:{}", self.id.0));
    }
}

// ── Capture ───────────────────────────────────────────────────────────────────

/// Frame source returning a fixed image, or always failing.
pub struct MockFrameSource {
    image: Option<Vec<u8>>,
    pub calls: AtomicUsize,
}

impl MockFrameSource {
    pub fn with_image(image: Vec<u8>) -> Self {
        Self {
            image: Some(image),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            image: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    async fn capture_once(&self) -> Result<Frame, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.image {
            Some(image) => Ok(Frame::new(image.clone(), Duration::ZERO)),
            None => Err(CaptureError::Empty),
        }
    }
}

// ── Device query ──────────────────────────────────────────────────────────────

/// Device query with canned answers.
pub struct FixedDeviceQuery {
    device: Option<BootedDevice>,
    size: (f64, f64),
}

impl FixedDeviceQuery {
    /// One booted device of the given logical size.
    pub fn booted(udid: &str, width: f64, height: f64) -> Self {
        Self {
            device: Some(BootedDevice {
                udid: udid.to_string(),
                name: "Mock Device".to_string(),
            }),
            size: (width, height),
        }
    }

    /// Nothing booted.
    pub fn no_device() -> Self {
        Self {
            device: None,
            size: (0.0, 0.0),
        }
    }
}

#[async_trait]
impl DeviceQuery for FixedDeviceQuery {
    async fn booted_device(&self) -> Result<BootedDevice, DeviceQueryError> {
        self.device.clone().ok_or(DeviceQueryError::NoBootedDevice)
    }

    async fn display_size(&self, _udid: &str) -> Result<(f64, f64), DeviceQueryError> {
        Ok(self.size)
    }

    async fn injection_endpoint(&self, udid: &str) -> Result<PathBuf, DeviceQueryError> {
        Ok(PathBuf::from(format!("/tmp/idb/{udid}_companion.sock")))
    }
}

// ── Bridge ────────────────────────────────────────────────────────────────────

/// Bridge launcher backed by in-memory pipes.
///
/// For each launch it keeps the far ends of the bridge's stdin and stdout so
/// a test can read what was written and close the "process".
#[derive(Default)]
pub struct PipeBridgeLauncher {
    first_line: Option<String>,
    far_ends: Mutex<Vec<(DuplexStream, DuplexStream)>>,
    endpoints: Mutex<Vec<PathBuf>>,
}

impl PipeBridgeLauncher {
    /// Prints the readiness line on launch.
    pub fn ready() -> Self {
        Self::printing("{\"ok\":true,\"status\":\"ready\"}\n")
    }

    /// Prints `line` on launch.
    pub fn printing(line: &str) -> Self {
        Self {
            first_line: Some(line.to_string()),
            ..Self::default()
        }
    }

    /// Prints nothing.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Removes and returns `(stdin, stdout)` far ends of launch `index`
    /// among those not yet taken.
    pub fn take_far_end(&self, index: usize) -> (DuplexStream, DuplexStream) {
        relock(&self.far_ends).remove(index)
    }

    pub fn launches(&self) -> usize {
        relock(&self.endpoints).len()
    }

    pub fn endpoints(&self) -> Vec<PathBuf> {
        relock(&self.endpoints).clone()
    }
}

#[async_trait]
impl BridgeLauncher for PipeBridgeLauncher {
    async fn launch(&self, _device: &BootedDevice, endpoint: &Path) -> Result<BridgeIo, BridgeError> {
        relock(&self.endpoints).push(endpoint.to_path_buf());
        let (stdin_near, stdin_far) = tokio::io::duplex(4096);
        let (stdout_near, mut stdout_far) = tokio::io::duplex(4096);
        if let Some(line) = &self.first_line {
            stdout_far.write_all(line.as_bytes()).await?;
        }
        relock(&self.far_ends).push((stdin_far, stdout_far));
        Ok(BridgeIo {
            stdin: Box::new(stdin_near),
            stdout: Box::new(stdout_near),
            child: None,
        })
    }
}
