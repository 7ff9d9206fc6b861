//! Infrastructure layer for mirror-streamer.
//!
//! Implements the application seams against the outside world:
//!
//! - [`signaling_client`]: WebSocket connection to the relay.
//! - [`simctl`]: device discovery and screenshots via `xcrun simctl` / `idb`.
//! - [`bridge_process`]: the injection bridge child process.
//! - [`transport`]: the transport factory used when no engine is linked.
//! - [`mock`]: in-memory doubles for every seam, used by tests.

pub mod bridge_process;
pub mod mock;
pub mod signaling_client;
pub mod simctl;
pub mod transport;

pub use bridge_process::ProcessBridgeLauncher;
pub use signaling_client::SignalingClient;
pub use simctl::{SimctlDeviceQuery, SimctlScreenshot};
pub use transport::UnavailableTransportFactory;
