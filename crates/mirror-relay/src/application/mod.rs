//! Application layer for mirror-relay.
//!
//! Decides which connection receives which frame.  The decisions are returned
//! as [`Delivery`] values so the WebSocket server can carry them out and the
//! rules can be tested without any sockets.

pub mod pairing;

pub use pairing::{ConnectionId, Delivery, Outbound, PairingTable, RelayError};
