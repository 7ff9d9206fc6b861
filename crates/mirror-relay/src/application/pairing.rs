//! One-streamer / one-active-viewer pairing rules.
//!
//! # Rules
//!
//! - At most one streamer and one *active* viewer are registered at a time.
//! - A new viewer evicts the previous active viewer (its connection is
//!   closed).  A new streamer likewise replaces a previous streamer.
//! - `streamer-ready` goes to the viewer when it registers and a streamer is
//!   already present, or when a streamer registers while a viewer waits.
//! - `offer` flows active viewer → streamer, `answer` flows streamer → active
//!   viewer, `ice-candidate` flows to whichever side did not send it.
//! - When the streamer disconnects the viewer receives
//!   `streamer-disconnected`.
//!
//! Frames from connections that are not (or are no longer) registered are
//! dropped.

use thiserror::Error;
use uuid::Uuid;

use mirror_core::{Role, SignalMessage};

use crate::domain::Envelope;

/// Identifier assigned to each accepted WebSocket connection.
pub type ConnectionId = Uuid;

/// Errors raised while interpreting an inbound frame.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The frame was not a JSON object with a `type` field.
    #[error("malformed signaling frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `register` without a valid `role`.
    #[error("register message without a role")]
    MissingRole,
}

/// What to do with a connection's outbound side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Close the connection.
    Close,
}

/// A single routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub message: Outbound,
}

impl Delivery {
    fn text(to: ConnectionId, text: impl Into<String>) -> Self {
        Self {
            to,
            message: Outbound::Text(text.into()),
        }
    }

    fn close(to: ConnectionId) -> Self {
        Self {
            to,
            message: Outbound::Close,
        }
    }
}

/// Encodes a relay-originated notice.
fn notice(msg: &SignalMessage) -> String {
    // Unit variants always serialize.
    serde_json::to_string(msg).unwrap_or_default()
}

/// Who is currently paired.
#[derive(Debug, Default)]
pub struct PairingTable {
    streamer: Option<ConnectionId>,
    viewer: Option<ConnectionId>,
}

impl PairingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streamer(&self) -> Option<ConnectionId> {
        self.streamer
    }

    pub fn active_viewer(&self) -> Option<ConnectionId> {
        self.viewer
    }

    /// Interprets one inbound text frame from `from`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] if the frame cannot be parsed or a `register`
    /// lacks a role.  The caller logs and drops; the connection stays open.
    pub fn handle_text(
        &mut self,
        from: ConnectionId,
        text: &str,
    ) -> Result<Vec<Delivery>, RelayError> {
        let envelope = Envelope::parse(text)?;

        if envelope.kind == "register" {
            let role = envelope.role.ok_or(RelayError::MissingRole)?;
            return Ok(self.register(from, role));
        }

        Ok(self.route(from, &envelope.kind, text))
    }

    /// Registers `conn` in `role` and returns the resulting notices.
    pub fn register(&mut self, conn: ConnectionId, role: Role) -> Vec<Delivery> {
        let mut out = Vec::new();

        match role {
            Role::Streamer => {
                if self.viewer == Some(conn) {
                    self.viewer = None;
                }
                if let Some(previous) = self.streamer.replace(conn) {
                    if previous != conn {
                        out.push(Delivery::close(previous));
                    }
                }
                if let Some(viewer) = self.viewer {
                    out.push(Delivery::text(viewer, notice(&SignalMessage::StreamerReady)));
                }
            }
            Role::Viewer => {
                if self.streamer == Some(conn) {
                    self.streamer = None;
                }
                if let Some(previous) = self.viewer.replace(conn) {
                    if previous != conn {
                        out.push(Delivery::close(previous));
                    }
                }
                if self.streamer.is_some() {
                    out.push(Delivery::text(conn, notice(&SignalMessage::StreamerReady)));
                }
            }
        }

        out
    }

    /// Forwards a negotiation frame verbatim according to the sender's role.
    pub fn route(&self, from: ConnectionId, kind: &str, text: &str) -> Vec<Delivery> {
        let from_streamer = self.streamer == Some(from);
        let from_viewer = self.viewer == Some(from);

        let target = match kind {
            "offer" if from_viewer => self.streamer,
            "answer" if from_streamer => self.viewer,
            "ice-candidate" if from_streamer => self.viewer,
            "ice-candidate" if from_viewer => self.streamer,
            _ => None,
        };

        target
            .map(|to| vec![Delivery::text(to, text)])
            .unwrap_or_default()
    }

    /// Removes `conn` from the table and returns the resulting notices.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<Delivery> {
        let mut out = Vec::new();

        if self.streamer == Some(conn) {
            self.streamer = None;
            if let Some(viewer) = self.viewer {
                out.push(Delivery::text(
                    viewer,
                    notice(&SignalMessage::StreamerDisconnected),
                ));
            }
        }
        if self.viewer == Some(conn) {
            self.viewer = None;
        }

        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const READY: &str = r#"{"type":"streamer-ready"}"#;
    const GONE: &str = r#"{"type":"streamer-disconnected"}"#;

    fn ids() -> (ConnectionId, ConnectionId) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_viewer_first_gets_ready_only_when_streamer_arrives() {
        // Arrange
        let mut table = PairingTable::new();
        let (streamer, viewer) = ids();

        // Act: viewer registers alone
        let first = table.register(viewer, Role::Viewer);

        // Assert: nothing yet
        assert!(first.is_empty());

        // Act: streamer registers later
        let second = table.register(streamer, Role::Streamer);

        // Assert: the waiting viewer is told immediately
        assert_eq!(second, vec![Delivery::text(viewer, READY)]);
    }

    #[test]
    fn test_viewer_after_streamer_gets_ready_on_register() {
        let mut table = PairingTable::new();
        let (streamer, viewer) = ids();
        table.register(streamer, Role::Streamer);

        let out = table.register(viewer, Role::Viewer);

        assert_eq!(out, vec![Delivery::text(viewer, READY)]);
    }

    #[test]
    fn test_new_viewer_evicts_previous() {
        let mut table = PairingTable::new();
        let (streamer, old_viewer) = ids();
        let new_viewer = Uuid::new_v4();
        table.register(streamer, Role::Streamer);
        table.register(old_viewer, Role::Viewer);

        let out = table.register(new_viewer, Role::Viewer);

        assert_eq!(
            out,
            vec![Delivery::close(old_viewer), Delivery::text(new_viewer, READY)]
        );
        assert_eq!(table.active_viewer(), Some(new_viewer));
    }

    #[test]
    fn test_offer_from_active_viewer_reaches_streamer_verbatim() {
        let mut table = PairingTable::new();
        let (streamer, viewer) = ids();
        table.register(streamer, Role::Streamer);
        table.register(viewer, Role::Viewer);
        let offer = r#"{"type":"offer","sdp":"v=0","extra":true}"#;

        let out = table.handle_text(viewer, offer).unwrap();

        assert_eq!(out, vec![Delivery::text(streamer, offer)]);
    }

    #[test]
    fn test_offer_from_evicted_viewer_is_dropped() {
        let mut table = PairingTable::new();
        let (streamer, old_viewer) = ids();
        table.register(streamer, Role::Streamer);
        table.register(old_viewer, Role::Viewer);
        table.register(Uuid::new_v4(), Role::Viewer);

        let out = table
            .handle_text(old_viewer, r#"{"type":"offer","sdp":"v=0"}"#)
            .unwrap();

        assert!(out.is_empty());
    }

    #[test]
    fn test_answer_goes_only_to_active_viewer() {
        let mut table = PairingTable::new();
        let (streamer, viewer) = ids();
        table.register(streamer, Role::Streamer);
        table.register(viewer, Role::Viewer);
        let answer = r#"{"type":"answer","sdp":"v=0"}"#;

        assert_eq!(
            table.handle_text(streamer, answer).unwrap(),
            vec![Delivery::text(viewer, answer)]
        );
        // A viewer cannot send an answer.
        assert!(table.handle_text(viewer, answer).unwrap().is_empty());
    }

    #[test]
    fn test_candidates_route_by_sender_role() {
        let mut table = PairingTable::new();
        let (streamer, viewer) = ids();
        table.register(streamer, Role::Streamer);
        table.register(viewer, Role::Viewer);
        let cand = r#"{"type":"ice-candidate","candidate":"c","sdpMLineIndex":0}"#;

        assert_eq!(
            table.handle_text(streamer, cand).unwrap(),
            vec![Delivery::text(viewer, cand)]
        );
        assert_eq!(
            table.handle_text(viewer, cand).unwrap(),
            vec![Delivery::text(streamer, cand)]
        );
    }

    #[test]
    fn test_offer_without_streamer_is_dropped() {
        let mut table = PairingTable::new();
        let viewer = Uuid::new_v4();
        table.register(viewer, Role::Viewer);

        let out = table
            .handle_text(viewer, r#"{"type":"offer","sdp":"v=0"}"#)
            .unwrap();

        assert!(out.is_empty());
    }

    #[test]
    fn test_streamer_disconnect_notifies_viewer() {
        let mut table = PairingTable::new();
        let (streamer, viewer) = ids();
        table.register(streamer, Role::Streamer);
        table.register(viewer, Role::Viewer);

        let out = table.disconnect(streamer);

        assert_eq!(out, vec![Delivery::text(viewer, GONE)]);
        assert_eq!(table.streamer(), None);
    }

    #[test]
    fn test_viewer_disconnect_is_silent() {
        let mut table = PairingTable::new();
        let (streamer, viewer) = ids();
        table.register(streamer, Role::Streamer);
        table.register(viewer, Role::Viewer);

        assert!(table.disconnect(viewer).is_empty());
        assert_eq!(table.active_viewer(), None);
    }

    #[test]
    fn test_unregistered_disconnect_is_noop() {
        let mut table = PairingTable::new();
        assert!(table.disconnect(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_register_without_role_is_error() {
        let mut table = PairingTable::new();
        let result = table.handle_text(Uuid::new_v4(), r#"{"type":"register"}"#);
        assert!(matches!(result, Err(RelayError::MissingRole)));
    }

    #[test]
    fn test_garbage_is_error_not_panic() {
        let mut table = PairingTable::new();
        assert!(matches!(
            table.handle_text(Uuid::new_v4(), "not json"),
            Err(RelayError::Malformed(_))
        ));
    }

    #[test]
    fn test_replacing_streamer_closes_old_and_readies_viewer() {
        let mut table = PairingTable::new();
        let (old_streamer, viewer) = ids();
        let new_streamer = Uuid::new_v4();
        table.register(old_streamer, Role::Streamer);
        table.register(viewer, Role::Viewer);

        let out = table.register(new_streamer, Role::Streamer);

        assert_eq!(
            out,
            vec![Delivery::close(old_streamer), Delivery::text(viewer, READY)]
        );
    }
}
