//! mirror-streamer library crate.
//!
//! The streamer runs next to the simulator.  It keeps one transport session
//! with the active viewer alive, pushes frames into it, and turns the
//! viewer's pointer gestures into taps and swipes on the device.
//!
//! # Architecture
//!
//! ```text
//!   signaling relay ──▶ SessionCoordinator ──▶ transport engine
//!         ▲                │   ▲                   │
//!         └── answer/ICE ──┘   └── events ─────────┘
//!
//!   capture ──▶ FramePump ──▶ frame forwarder ──▶ transport.push_frame
//!
//!   data channel ──▶ CoordinateMapper ──▶ BridgeSupervisor ──▶ bridge stdin
//! ```
//!
//! - `domain` holds configuration and plain data types (no async, no I/O).
//! - `application` holds the four core components and the trait seams they
//!   talk through (`TransportFactory`, `FrameSource`, `DeviceQuery`,
//!   `BridgeLauncher`).
//! - `infrastructure` implements those seams against real tools: the relay
//!   WebSocket, `xcrun simctl`, `idb` and the bridge child process.
//!
//! # Concurrency model (for beginners)
//!
//! Every mutable entity has exactly one owner:
//!
//! | Entity          | Owner                                  |
//! |-----------------|----------------------------------------|
//! | Session         | coordinator task                       |
//! | GestureState    | coordinator task (inside the mapper)   |
//! | DeviceGeometry  | bridge supervisor (published by watch) |
//! | BridgeChannel   | bridge supervisor                      |
//! | cached Frame    | frame pump                             |
//!
//! Other components talk to an owner through channels, never by reaching
//! into its state.

/// Domain layer: configuration, frames and session identifiers.
pub mod domain;

/// Application layer: pump, mapper, supervisor, coordinator.
pub mod application;

/// Infrastructure layer: relay client, device tools, bridge process, capture.
pub mod infrastructure;

mod sync;
