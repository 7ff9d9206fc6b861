//! Data-channel input messages, viewer → streamer.
//!
//! One JSON object per data-channel message:
//!
//! ```json
//! {"type":"down","x":0.25,"y":0.5}
//! {"type":"move","x":0.30,"y":0.5}
//! {"type":"up","x":0.30,"y":0.5}
//! ```
//!
//! `x` and `y` are fractions of the rendered video frame.

use serde::{Deserialize, Serialize};

use crate::domain::gesture::GesturePhase;

/// A single pointer event in viewer-normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(rename = "type")]
    pub phase: GesturePhase,
    pub x: f64,
    pub y: f64,
}
