//! Encoding and decoding helpers for the JSON wire formats.
//!
//! The functions here are the only place where raw bytes or text become
//! typed messages.  Callers get a [`ProtocolError`] for anything malformed and
//! decide for themselves whether to log and drop (the usual policy) or fail.

use thiserror::Error;

use super::{BridgeCommand, BridgeReply, InputMessage, SignalMessage};

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not valid JSON for the expected message type.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload was not valid UTF-8.
    #[error("message is not valid UTF-8")]
    NotUtf8,

    /// A coordinate was NaN or infinite.
    #[error("coordinate {axis} is not a finite number")]
    NonFiniteCoordinate { axis: &'static str },
}

/// Decodes a data-channel payload into an [`InputMessage`].
///
/// Coordinates must be finite.  Values slightly outside `[0, 1]` (a drag that
/// leaves the video element) are clamped onto the frame edge.
///
/// # Errors
///
/// Returns [`ProtocolError`] for non-UTF-8 bytes, invalid JSON, an unknown
/// `type`, or a non-finite coordinate.
pub fn decode_input(payload: &[u8]) -> Result<InputMessage, ProtocolError> {
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8)?;
    let mut msg: InputMessage = serde_json::from_str(text.trim())?;

    if !msg.x.is_finite() {
        return Err(ProtocolError::NonFiniteCoordinate { axis: "x" });
    }
    if !msg.y.is_finite() {
        return Err(ProtocolError::NonFiniteCoordinate { axis: "y" });
    }
    msg.x = msg.x.clamp(0.0, 1.0);
    msg.y = msg.y.clamp(0.0, 1.0);
    Ok(msg)
}

/// Encodes a bridge command as a single newline-terminated line.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_bridge_line(command: &BridgeCommand) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(command)?;
    line.push('\n');
    Ok(line)
}

/// Decodes one line of bridge output.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the line is not a reply object.
pub fn decode_bridge_reply(line: &str) -> Result<BridgeReply, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Decodes a signaling text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] for invalid JSON or an unknown `type`.
pub fn decode_signal(text: &str) -> Result<SignalMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes a signaling message as a text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_signal(msg: &SignalMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gesture::GesturePhase;

    #[test]
    fn test_decode_input_accepts_trailing_newline() {
        let msg = decode_input(b"{\"type\":\"move\",\"x\":0.1,\"y\":0.2}\n").unwrap();
        assert_eq!(msg.phase, GesturePhase::Move);
    }

    #[test]
    fn test_decode_input_clamps_out_of_range() {
        let msg = decode_input(br#"{"type":"move","x":1.2,"y":-0.1}"#).unwrap();
        assert_eq!(msg.x, 1.0);
        assert_eq!(msg.y, 0.0);
    }

    #[test]
    fn test_decode_input_rejects_garbage() {
        assert!(matches!(
            decode_input(b"not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_input_rejects_invalid_utf8() {
        assert!(matches!(
            decode_input(&[0xff, 0xfe, 0xfd]),
            Err(ProtocolError::NotUtf8)
        ));
    }

    #[test]
    fn test_encode_bridge_line_is_newline_terminated() {
        let line = encode_bridge_line(&BridgeCommand::Tap { x: 1.0, y: 2.0 }).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_decode_bridge_reply_trims_whitespace() {
        let reply = decode_bridge_reply("  {\"ok\":true}\r\n").unwrap();
        assert!(reply.ok);
    }

    #[test]
    fn test_decode_signal_rejects_missing_type() {
        assert!(decode_signal(r#"{"sdp":"v=0"}"#).is_err());
    }
}
