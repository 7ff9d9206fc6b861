//! Infrastructure layer for mirror-relay.
//!
//! Owns every socket: binds the listener, performs the WebSocket upgrade,
//! runs one task per connection and executes the deliveries decided by the
//! application layer.

pub mod ws_server;

pub use ws_server::{run_server, serve};
