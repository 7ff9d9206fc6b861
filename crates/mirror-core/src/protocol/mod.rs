//! Protocol module containing the three JSON wire formats and their codec.
//!
//! | Module      | Link                          | Direction             |
//! |-------------|-------------------------------|-----------------------|
//! | `signaling` | WebSocket to the relay        | both                  |
//! | `input`     | transport data channel        | viewer → streamer     |
//! | `bridge`    | injection bridge stdin/stdout | streamer ⇄ bridge     |

pub mod bridge;
pub mod codec;
pub mod input;
pub mod signaling;

pub use bridge::{BridgeCommand, BridgeReply};
pub use codec::ProtocolError;
pub use input::InputMessage;
pub use signaling::{Role, SignalMessage};
