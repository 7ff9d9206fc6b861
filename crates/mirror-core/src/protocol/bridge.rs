//! Injection bridge protocol, newline-delimited JSON over the bridge
//! process's stdin/stdout.
//!
//! Streamer → bridge (one command per line, device points):
//!
//! ```json
//! {"type":"tap","x":195.0,"y":422.0}
//! {"type":"swipe","x1":39.0,"y1":84.4,"x2":351.0,"y2":759.6,"duration":0.3}
//! ```
//!
//! Bridge → streamer (one reply per line):
//!
//! ```json
//! {"ok":true,"status":"ready"}      first line, once the bridge is alive
//! {"ok":true}                       command delivered
//! {"ok":false,"error":"..."}        command failed
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::gesture::InputPrimitive;

/// A command written to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BridgeCommand {
    Tap {
        x: f64,
        y: f64,
    },
    Swipe {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        /// Seconds.
        duration: f64,
    },
}

impl From<&InputPrimitive> for BridgeCommand {
    fn from(primitive: &InputPrimitive) -> Self {
        match primitive {
            InputPrimitive::Tap { at } => BridgeCommand::Tap { x: at.x, y: at.y },
            InputPrimitive::Swipe { from, to, duration } => BridgeCommand::Swipe {
                x1: from.x,
                y1: from.y,
                x2: to.x,
                y2: to.y,
                duration: duration.as_secs_f64(),
            },
        }
    }
}

/// A line printed by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeReply {
    /// `true` for the readiness line the bridge prints on startup.
    pub fn is_ready(&self) -> bool {
        self.ok && self.status.as_deref() == Some("ready")
    }
}
