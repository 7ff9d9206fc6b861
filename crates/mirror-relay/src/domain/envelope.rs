//! The routing envelope: the only part of a signaling message the relay reads.
//!
//! Offers, answers and candidates are forwarded as the exact text that
//! arrived, so fields the relay does not know about (for example a browser's
//! `usernameFragment`) survive the trip.  To route a frame the relay only needs
//! its `type`, and for `register` the `role`.

use serde::Deserialize;

use mirror_core::Role;

/// Minimal view of an inbound signaling frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl Envelope {
    /// Parses the envelope out of a text frame, ignoring every other field.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
