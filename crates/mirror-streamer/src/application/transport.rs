//! Seam to the peer-connection engine.
//!
//! The engine (SDP, ICE, DTLS, video encoding) is an external collaborator.
//! The coordinator only needs the handful of operations below, plus a way for
//! the engine to report back.
//!
//! # Callbacks as messages
//!
//! Engines typically report local candidates, connection-state changes and
//! data-channel messages through callbacks fired on their own threads.
//! Instead of letting those callbacks touch coordinator state, the engine is
//! handed a [`TransportEvents`] sink that posts each callback as a
//! [`CoordinatorEvent`] tagged with the session it belongs to.  The
//! coordinator processes them one at a time and discards anything tagged
//! with a session that is no longer active.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use mirror_core::SignalMessage;

use super::session_coordinator::CoordinatorEvent;
use crate::domain::{Frame, SessionId};

/// Errors reported by the transport engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No engine is linked into this build.
    #[error("no transport engine available")]
    Unavailable,

    /// The offer, answer or a local/remote description step failed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// A remote candidate was rejected.
    #[error("invalid ICE candidate: {0}")]
    Candidate(String),

    /// The data channel is not open or the send failed.
    #[error("data channel error: {0}")]
    DataChannel(String),

    /// The session has already been closed.
    #[error("transport session closed")]
    Closed,
}

/// Peer connection state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// `true` for the states that end a session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

/// A trickled ICE candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_m_line_index: u16,
    pub sdp_mid: Option<String>,
}

impl IceCandidate {
    /// Extracts the candidate from an `ice-candidate` signaling message.
    pub fn from_signal(msg: &SignalMessage) -> Option<Self> {
        match msg {
            SignalMessage::IceCandidate {
                candidate,
                sdp_m_line_index,
                sdp_mid,
            } => Some(Self {
                candidate: candidate.clone(),
                sdp_m_line_index: *sdp_m_line_index,
                sdp_mid: sdp_mid.clone(),
            }),
            _ => None,
        }
    }

    pub fn into_signal(self) -> SignalMessage {
        SignalMessage::IceCandidate {
            candidate: self.candidate,
            sdp_m_line_index: self.sdp_m_line_index,
            sdp_mid: self.sdp_mid,
        }
    }
}

/// One engine callback.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    ConnectionState(ConnectionState),
    DataMessage(Vec<u8>),
}

/// Sink through which an engine session reports its callbacks.
///
/// Cheap to clone; every clone tags events with the same session id.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    session: SessionId,
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl TransportEvents {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Posts `event` to the coordinator.  Silently dropped once the
    /// coordinator has shut down.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(CoordinatorEvent::Transport {
            session: self.session,
            event,
        });
    }
}

/// Creates one engine session per accepted offer.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Opens a fresh peer connection for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the engine cannot create a connection.
    async fn open(
        &self,
        session: SessionId,
        events: TransportEvents,
    ) -> Result<std::sync::Arc<dyn TransportSession>, TransportError>;
}

/// One live peer connection.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Applies the remote offer, creates the answer and applies it as the
    /// local description, in that order, and returns the answer SDP.
    ///
    /// Local candidates may start arriving on the event sink while this is
    /// still running.
    async fn create_answer(&self, offer_sdp: &str) -> Result<String, TransportError>;

    /// Adds a trickled remote candidate.  Only called after
    /// [`create_answer`](Self::create_answer) has succeeded.
    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Hands one frame to the encoder.  Best-effort; the engine may drop it
    /// under congestion.
    fn push_frame(&self, frame: &Frame);

    /// Sends bytes on the data channel.
    fn send_data(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Cumulative outbound payload bytes.
    fn bytes_sent(&self) -> u64;

    /// Closes the connection.  The coordinator calls this exactly once per
    /// session.
    fn close(&self);
}
