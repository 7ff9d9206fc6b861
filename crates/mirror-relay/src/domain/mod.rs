//! Domain layer for mirror-relay.
//!
//! Pure types only: the relay's runtime configuration and the minimal
//! envelope the relay reads from each message to route it.

pub mod config;
pub mod envelope;

pub use config::RelayConfig;
pub use envelope::Envelope;
