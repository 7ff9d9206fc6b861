//! Shared harness for the streamer integration tests.
//!
//! Starts the full core through [`run_streamer`] with in-memory doubles for
//! every external seam, and offers helpers to drive a viewer session.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};
use tokio::sync::mpsc;

use mirror_core::SignalMessage;
use mirror_streamer::application::{
    run_streamer, ConnectionState, CoordinatorEvent, FrameClock, StreamerHandle, StreamerPorts,
};
use mirror_streamer::domain::{SessionState, StreamerConfig};
use mirror_streamer::infrastructure::mock::{
    FixedDeviceQuery, MockFrameSource, MockTransport, MockTransportFactory, PipeBridgeLauncher,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub handle: StreamerHandle,
    pub outbound: mpsc::UnboundedReceiver<SignalMessage>,
    pub transport: Arc<MockTransportFactory>,
    pub launcher: Arc<PipeBridgeLauncher>,
    pub frames: Arc<MockFrameSource>,
}

/// A 390 x 844 pt device, a bridge that reports ready at once and a
/// screenshot source that returns a small fixed image.
pub fn start(config: StreamerConfig, transport: MockTransportFactory) -> Harness {
    let transport = Arc::new(transport);
    let launcher = Arc::new(PipeBridgeLauncher::ready());
    let frames = Arc::new(MockFrameSource::with_image(vec![0x89, b'P', b'N', b'G']));

    let ports = StreamerPorts {
        transport: transport.clone(),
        frames: frames.clone(),
        devices: Arc::new(FixedDeviceQuery::booted("SIM-1", 390.0, 844.0)),
        launcher: launcher.clone(),
        clock: FrameClock::new(),
    };
    let (handle, outbound) = run_streamer(&config, ports);

    Harness {
        handle,
        outbound,
        transport,
        launcher,
        frames,
    }
}

impl Harness {
    pub fn signal(&self, msg: SignalMessage) {
        self.handle
            .events()
            .send(CoordinatorEvent::Signal(msg))
            .unwrap();
    }

    pub fn offer(&self, sdp: &str) {
        self.signal(SignalMessage::Offer { sdp: sdp.into() });
    }

    pub async fn next_outbound(&mut self) -> SignalMessage {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("no outbound signaling message")
            .expect("outbound channel closed")
    }

    pub async fn wait_state(&self, want: SessionState) {
        let mut state = self.handle.session_state();
        tokio::time::timeout(WAIT, state.wait_for(|s| *s == want))
            .await
            .unwrap_or_else(|_| panic!("session never reached {want}"))
            .unwrap();
    }

    /// Waits until the bridge has been launched `count` times in total and
    /// the latest launch is `Ready`.
    pub async fn wait_bridge_ready(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.launcher.launches() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("bridge not launched");

        let mut status = self.handle.bridge().subscribe_status();
        tokio::time::timeout(WAIT, status.wait_for(|s| s.is_ready()))
            .await
            .expect("bridge never ready")
            .unwrap();
    }

    /// Offers, receives the answer and reports the transport connected.
    /// Returns the session's transport.
    pub async fn connect_viewer(&mut self, sdp: &str) -> Arc<MockTransport> {
        self.offer(sdp);
        match self.next_outbound().await {
            SignalMessage::Answer { .. } => {}
            other => panic!("expected answer, got {other:?}"),
        }
        let transport = self.transport.session(self.transport.opened() - 1);
        transport.emit_state(ConnectionState::Connected);
        self.wait_state(SessionState::Connected).await;
        transport
    }
}

/// Reader over what the streamer wrote to a bridge's stdin.
pub fn bridge_lines(stdin_far: DuplexStream) -> Lines<BufReader<DuplexStream>> {
    BufReader::new(stdin_far).lines()
}

pub async fn next_bridge_command(
    lines: &mut Lines<BufReader<DuplexStream>>,
) -> serde_json::Value {
    let line = tokio::time::timeout(WAIT, lines.next_line())
        .await
        .expect("no bridge command")
        .unwrap()
        .expect("bridge stdin closed");
    serde_json::from_str(&line).unwrap()
}

pub fn assert_close(actual: &serde_json::Value, expected: f64) {
    let actual = actual.as_f64().expect("not a number");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
