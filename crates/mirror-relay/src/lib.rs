//! mirror-relay library crate.
//!
//! The relay is the rendezvous point between one streamer and one viewer.
//! It never looks inside session descriptions or candidates; it only decides
//! who receives each message.
//!
//! # Architecture
//!
//! ```text
//! Streamer (JSON over WebSocket)        Viewer (JSON over WebSocket)
//!         ↕                                     ↕
//! [mirror-relay]
//!   ├── domain/           RelayConfig, routing envelope
//!   ├── application/      PairingTable: who is paired, who gets what
//!   └── infrastructure/
//!         └── ws_server/  WebSocket accept loop (tokio-tungstenite)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` decides deliveries but never touches a socket.
//! - `infrastructure` owns sockets, tasks and the shutdown flag.

/// Domain layer: configuration and message envelope types.
pub mod domain;

/// Application layer: pairing and routing decisions.
pub mod application;

/// Infrastructure layer: WebSocket server.
pub mod infrastructure;
