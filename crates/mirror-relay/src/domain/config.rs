//! Relay configuration types.
//!
//! [`RelayConfig`] is built once in `main.rs` from CLI arguments and then
//! handed to the server.  Keeping it a plain struct makes the server easy to
//! start from integration tests with an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the signaling relay.
///
/// # Example
///
/// ```rust
/// use mirror_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8765);
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.
    ///
    /// `0.0.0.0` accepts streamers and viewers from the LAN; `127.0.0.1`
    /// restricts the relay to the local machine.
    pub bind_addr: SocketAddr,

    /// How often the accept loop wakes up to check the shutdown flag.
    pub shutdown_poll: Duration,
}

impl Default for RelayConfig {
    /// | Field           | Default          |
    /// |-----------------|------------------|
    /// | bind_addr       | `0.0.0.0:8765`   |
    /// | shutdown_poll   | 200 ms           |
    fn default() -> Self {
        Self {
            // Compile-time constant address; the parse cannot fail.
            bind_addr: "0.0.0.0:8765".parse().unwrap(),
            shutdown_poll: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_8765() {
        assert_eq!(RelayConfig::default().bind_addr.port(), 8765);
    }

    #[test]
    fn test_default_binds_all_interfaces() {
        assert!(RelayConfig::default().bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_shutdown_poll_is_200ms() {
        assert_eq!(
            RelayConfig::default().shutdown_poll,
            Duration::from_millis(200)
        );
    }
}
