//! Domain layer for mirror-streamer.
//!
//! Plain data types only.  Nothing here spawns tasks or touches the OS
//! apart from reading the config file.

pub mod config;
pub mod frame;
pub mod session;

pub use config::{load_config, ConfigError, StreamerConfig};
pub use frame::Frame;
pub use session::{SessionId, SessionState};
