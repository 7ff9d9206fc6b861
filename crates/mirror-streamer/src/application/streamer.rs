//! Wires the core components together and starts their tasks.
//!
//! ```text
//!            ┌────────────── StreamerHandle ───────────────┐
//! on_frame ──┼─▶ FramePump ──▶ frame queue ──▶ forwarder ──┼─▶ active transport
//! events() ──┼─▶ SessionCoordinator ──▶ outbound signals ──┼─▶ relay client
//!            └─────────────── BridgeSupervisor ────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use mirror_core::SignalMessage;

use super::coordinate_mapper::CoordinateMapper;
use super::device_query::DeviceQuery;
use super::frame_pump::{FrameClock, FramePump, FrameSource};
use super::injection_supervisor::{BridgeLauncher, BridgeSupervisor, SupervisorSettings};
use super::session_coordinator::{
    ActiveTransport, CoordinatorDeps, CoordinatorEvent, SessionCoordinator,
};
use super::transport::TransportFactory;
use crate::domain::{Frame, SessionState, StreamerConfig};

/// Implementations of every external seam.
pub struct StreamerPorts {
    pub transport: Arc<dyn TransportFactory>,
    pub frames: Arc<dyn FrameSource>,
    pub devices: Arc<dyn DeviceQuery>,
    pub launcher: Arc<dyn BridgeLauncher>,
    /// Clock used for pump timestamps; share it with the capture path.
    pub clock: FrameClock,
}

/// Handle to a running streamer core.
pub struct StreamerHandle {
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    frames: mpsc::Sender<Frame>,
    pump: FramePump,
    bridge: BridgeSupervisor,
    state: watch::Receiver<SessionState>,
    coordinator: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl StreamerHandle {
    /// Sender for signaling messages and transport callbacks.
    pub fn events(&self) -> mpsc::UnboundedSender<CoordinatorEvent> {
        self.events.clone()
    }

    /// Capture callback: a genuine frame from the screen.
    ///
    /// Never blocks; the frame is dropped if the transport is behind.
    pub fn on_frame(&self, frame: Frame) {
        self.pump.on_real_frame(&frame);
        if self.frames.try_send(frame).is_err() {
            debug!("frame queue full; capture frame dropped");
        }
    }

    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn bridge(&self) -> &BridgeSupervisor {
        &self.bridge
    }

    pub fn pump(&self) -> &FramePump {
        &self.pump
    }

    /// Stops the pump and bridge, closes any session and waits for the
    /// coordinator to finish.
    pub async fn shutdown(self) {
        self.pump.stop();
        self.bridge.shutdown();
        let _ = self.events.send(CoordinatorEvent::Shutdown);
        let _ = self.coordinator.await;
        self.forwarder.abort();
        info!("streamer core stopped");
    }
}

/// Builds the core from `config` and `ports` and starts it.
///
/// Returns the handle and the stream of messages destined for the relay.
/// Must be called from within a Tokio runtime.
pub fn run_streamer(
    config: &StreamerConfig,
    ports: StreamerPorts,
) -> (StreamerHandle, mpsc::UnboundedReceiver<SignalMessage>) {
    let bridge = BridgeSupervisor::new(
        ports.devices,
        ports.launcher,
        SupervisorSettings {
            chrome: config.chrome.correction(),
            ready_timeout: config.bridge.ready_timeout(),
            queue_depth: config.bridge.queue_depth,
        },
    );

    let (frames_tx, frames_rx) = mpsc::channel(config.pump.frame_queue_depth);
    let pump = FramePump::new(
        ports.frames,
        frames_tx.clone(),
        config.pump.interval(),
        ports.clock,
    );

    let mapper = CoordinateMapper::new(
        bridge.geometry(),
        config.input.tap_threshold,
        config.input.swipe_duration(),
    );

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let coordinator = SessionCoordinator::new(
        CoordinatorDeps {
            factory: ports.transport,
            pump: pump.clone(),
            bridge: bridge.clone(),
            mapper,
            outbound: outbound_tx,
        },
        config.session.bandwidth_sample_interval(),
    );

    let events = coordinator.events();
    let state = coordinator.subscribe_state();
    let forwarder = tokio::spawn(forward_frames(frames_rx, coordinator.active_transport()));
    let coordinator = tokio::spawn(coordinator.run());

    pump.start();
    bridge.request_resolve();

    (
        StreamerHandle {
            events,
            frames: frames_tx,
            pump,
            bridge,
            state,
            coordinator,
            forwarder,
        },
        outbound_rx,
    )
}

/// Pushes queued frames into whichever transport is currently connected.
async fn forward_frames(mut frames: mpsc::Receiver<Frame>, active: watch::Receiver<ActiveTransport>) {
    while let Some(frame) = frames.recv().await {
        let transport = active.borrow().clone();
        match transport {
            Some(transport) => transport.push_frame(&frame),
            None => debug!("no connected session; frame of {} bytes dropped", frame.len()),
        }
    }
}
