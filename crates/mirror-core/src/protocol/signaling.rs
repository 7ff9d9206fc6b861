//! Signaling relay messages.
//!
//! Every message is a JSON object whose `"type"` field names the variant in
//! kebab-case.  For example:
//!
//! ```json
//! {"type":"register","role":"streamer"}
//! {"type":"offer","sdp":"v=0\r\n..."}
//! {"type":"ice-candidate","candidate":"candidate:1 1 UDP ...","sdpMLineIndex":0,"sdpMid":"0"}
//! {"type":"streamer-ready"}
//! ```
//!
//! The relay forwards `offer`, `answer` and `ice-candidate` verbatim; only
//! `register` is interpreted by the relay itself.

use serde::{Deserialize, Serialize};

/// Role a connection declares when it registers with the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Streamer,
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Streamer => f.write_str("streamer"),
            Role::Viewer => f.write_str("viewer"),
        }
    }
}

/// All messages exchanged with the signaling relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Identifies the connection's role.  Sent once, first.
    Register { role: Role },

    /// Session description offer, viewer → streamer.
    Offer { sdp: String },

    /// Session description answer, streamer → active viewer.
    Answer { sdp: String },

    /// A trickled ICE candidate, either direction.
    IceCandidate {
        candidate: String,
        #[serde(rename = "sdpMLineIndex")]
        sdp_m_line_index: u16,
        #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
    },

    /// Relay → viewer: a streamer is present and ready for an offer.
    StreamerReady,

    /// Relay → viewer: the streamer went away.
    StreamerDisconnected,
}

impl SignalMessage {
    /// Short variant name for log lines.
    ///
    /// SDP bodies and candidates are long and noisy, so logs carry only this.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Register { .. } => "register",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::StreamerReady => "streamer-ready",
            SignalMessage::StreamerDisconnected => "streamer-disconnected",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
