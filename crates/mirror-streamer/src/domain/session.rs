//! Session identity and lifecycle states.

use std::fmt;

/// Identifies one negotiated transport session.
///
/// Ids are allocated by the coordinator in increasing order and never
/// reused, so an event tagged with an old id can always be recognised as
/// stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle of the active session as seen by the coordinator.
///
/// ```text
/// Idle ──offer──▶ Negotiating ──connected──▶ Connected
///  ▲                  │                          │
///  └──── Closing ◀────┴──── failed / closed ─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Negotiating,
    Connected,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
        };
        f.write_str(s)
    }
}
