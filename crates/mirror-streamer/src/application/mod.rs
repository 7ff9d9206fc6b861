//! Application layer for mirror-streamer.
//!
//! The four core components and the trait seams they depend on.  Nothing
//! here runs an external tool or opens a socket; those live behind the
//! traits and are implemented in `infrastructure`.

pub mod coordinate_mapper;
pub mod device_query;
pub mod frame_pump;
pub mod injection_supervisor;
pub mod session_coordinator;
pub mod streamer;
pub mod transport;

pub use coordinate_mapper::CoordinateMapper;
pub use device_query::{BootedDevice, DeviceQuery, DeviceQueryError};
pub use frame_pump::{CaptureError, FrameClock, FramePump, FrameSource};
pub use injection_supervisor::{
    BridgeError, BridgeIo, BridgeLauncher, BridgeStatus, BridgeSupervisor, SupervisorSettings,
};
pub use session_coordinator::{CoordinatorEvent, SessionCoordinator};
pub use streamer::{run_streamer, StreamerHandle, StreamerPorts};
pub use transport::{
    ConnectionState, IceCandidate, TransportError, TransportEvent, TransportEvents,
    TransportFactory, TransportSession,
};
