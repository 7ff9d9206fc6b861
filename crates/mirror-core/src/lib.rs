//! # mirror-core
//!
//! Shared library for Sim-Mirror containing the JSON wire protocols, the
//! device geometry model and the gesture classification rules.
//!
//! This crate is used by both the streamer and the signaling relay.
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! Sim-Mirror streams the display of a virtual device (a simulator) to a
//! remote viewer and relays the viewer's touch gestures back to the device.
//! Three processes take part:
//!
//! - the **streamer**, which runs next to the device, pushes video and
//!   injects input;
//! - the **relay**, which pairs one streamer with one active viewer and
//!   forwards negotiation messages between them;
//! - the **viewer**, usually a browser.
//!
//! This crate (`mirror-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – The three JSON "languages" spoken on the wire:
//!   signaling messages (relay), input messages (viewer data channel) and
//!   bridge commands (streamer → injection bridge).
//!
//! - **`domain`** – Pure business logic with no I/O.  The most important
//!   pieces are [`DeviceGeometry`], which maps viewer-normalized coordinates
//!   into device points, and [`GestureTracker`], which turns a stream of
//!   `down`/`move`/`up` events into tap or swipe primitives.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mirror_core::DeviceGeometry` instead of the full module path.
pub use domain::geometry::{ChromeCorrection, DeviceGeometry, GeometryError};
pub use domain::gesture::{
    GesturePhase, GestureState, GestureTracker, InputPrimitive, Point, SWIPE_DURATION,
    TAP_THRESHOLD,
};
pub use protocol::codec::ProtocolError;
pub use protocol::{BridgeCommand, BridgeReply, InputMessage, Role, SignalMessage};
