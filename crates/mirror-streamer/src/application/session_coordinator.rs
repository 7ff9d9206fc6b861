//! Session coordinator: owns the single active transport session.
//!
//! The coordinator is an actor.  Everything that can change session state
//! arrives as a [`CoordinatorEvent`] on one channel and is handled to
//! completion before the next event is looked at:
//!
//! | Source                | Event                                   |
//! |-----------------------|-----------------------------------------|
//! | signaling relay       | `Signal(offer / ice-candidate)`         |
//! | transport engine      | `Transport { session, LocalCandidate }` |
//! |                       | `Transport { session, ConnectionState }`|
//! |                       | `Transport { session, DataMessage }`    |
//! | negotiation task      | `AnswerReady { session, result }`       |
//!
//! # Session lifecycle
//!
//! ```text
//! Idle ──offer──▶ Negotiating ──Connected──▶ Connected
//!   ▲                 │                          │
//!   └──── Closing ◀───┴─ failed / disconnected ──┘
//! ```
//!
//! A new offer always tears the current session down first: negotiation task
//! aborted, bandwidth sampler aborted, frames unhooked, transport closed
//! exactly once.  Only then is the new session opened.
//!
//! # Ordering
//!
//! `create_answer` runs on its own task so the actor keeps serving events
//! while the engine works.  Until the answer has been sent, local candidates
//! are held back and remote candidates are buffered; both queues are flushed
//! the moment the answer goes out.  Events tagged with any session other
//! than the current one are stale and ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use mirror_core::protocol::codec::decode_input;
use mirror_core::SignalMessage;

use super::coordinate_mapper::CoordinateMapper;
use super::frame_pump::FramePump;
use super::injection_supervisor::BridgeSupervisor;
use super::transport::{
    ConnectionState, IceCandidate, TransportError, TransportEvent, TransportEvents,
    TransportFactory, TransportSession,
};
use crate::domain::{SessionId, SessionState};

/// The transport currently allowed to receive frames.
pub type ActiveTransport = Option<Arc<dyn TransportSession>>;

/// Everything the coordinator reacts to.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// A message from the signaling relay.
    Signal(SignalMessage),
    /// A transport engine callback.
    Transport {
        session: SessionId,
        event: TransportEvent,
    },
    /// The negotiation task for `session` finished.
    AnswerReady {
        session: SessionId,
        result: Result<String, TransportError>,
    },
    /// Tear down and stop the actor.
    Shutdown,
}

/// Collaborators handed to the coordinator.
pub struct CoordinatorDeps {
    pub factory: Arc<dyn TransportFactory>,
    pub pump: FramePump,
    pub bridge: BridgeSupervisor,
    pub mapper: CoordinateMapper,
    /// Messages for the signaling relay.
    pub outbound: mpsc::UnboundedSender<SignalMessage>,
}

struct ActiveSession {
    id: SessionId,
    transport: Arc<dyn TransportSession>,
    state: SessionState,
    created_at: Instant,
    has_sent_answer: bool,
    pending_local: Vec<IceCandidate>,
    pending_remote: Vec<IceCandidate>,
    negotiation: Option<JoinHandle<()>>,
    sampler: Option<JoinHandle<()>>,
}

/// The session-owning actor.  Build with [`new`](Self::new), then drive
/// with [`run`](Self::run).
pub struct SessionCoordinator {
    factory: Arc<dyn TransportFactory>,
    pump: FramePump,
    bridge: BridgeSupervisor,
    mapper: CoordinateMapper,
    outbound: mpsc::UnboundedSender<SignalMessage>,
    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
    state_tx: watch::Sender<SessionState>,
    active_tx: watch::Sender<ActiveTransport>,
    sample_interval: Duration,
    session: Option<ActiveSession>,
    last_id: u64,
}

impl SessionCoordinator {
    pub fn new(deps: CoordinatorDeps, sample_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (active_tx, _) = watch::channel(None);
        Self {
            factory: deps.factory,
            pump: deps.pump,
            bridge: deps.bridge,
            mapper: deps.mapper,
            outbound: deps.outbound,
            events_tx,
            events_rx,
            state_tx,
            active_tx,
            sample_interval,
            session: None,
            last_id: 0,
        }
    }

    /// Sender for posting events to this coordinator.
    pub fn events(&self) -> mpsc::UnboundedSender<CoordinatorEvent> {
        self.events_tx.clone()
    }

    /// Observes the session state.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Observes which transport (if any) should receive frames.
    pub fn active_transport(&self) -> watch::Receiver<ActiveTransport> {
        self.active_tx.subscribe()
    }

    /// Processes events until [`CoordinatorEvent::Shutdown`].
    pub async fn run(mut self) {
        info!("session coordinator running");
        while let Some(event) = self.events_rx.recv().await {
            match event {
                CoordinatorEvent::Shutdown => break,
                CoordinatorEvent::Signal(msg) => self.on_signal(msg).await,
                CoordinatorEvent::AnswerReady { session, result } => {
                    self.on_answer_ready(session, result)
                }
                CoordinatorEvent::Transport { session, event } => {
                    if self.current_id() == Some(session) {
                        self.on_transport_event(event);
                    } else {
                        debug!("{session}: stale transport event dropped");
                    }
                }
            }
        }
        self.teardown("coordinator shutting down");
        info!("session coordinator stopped");
    }

    // ── Signaling ─────────────────────────────────────────────────────────────

    async fn on_signal(&mut self, msg: SignalMessage) {
        match msg {
            SignalMessage::Offer { sdp } => self.on_offer(sdp).await,
            SignalMessage::IceCandidate { .. } => {
                if let Some(candidate) = IceCandidate::from_signal(&msg) {
                    self.on_remote_candidate(candidate);
                }
            }
            other => debug!("ignoring '{}' from relay", other.kind()),
        }
    }

    async fn on_offer(&mut self, sdp: String) {
        self.teardown("superseded by a new offer");

        self.last_id += 1;
        let id = SessionId(self.last_id);
        info!("{id}: offer received ({} bytes of SDP)", sdp.len());

        let events = TransportEvents::new(id, self.events_tx.clone());
        let transport = match self.factory.open(id, events).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!("{id}: cannot open transport, offer rejected: {e}");
                return;
            }
        };

        let negotiation = {
            let transport = Arc::clone(&transport);
            let events_tx = self.events_tx.clone();
            tokio::spawn(async move {
                let result = transport.create_answer(&sdp).await;
                let _ = events_tx.send(CoordinatorEvent::AnswerReady {
                    session: id,
                    result,
                });
            })
        };

        self.session = Some(ActiveSession {
            id,
            transport,
            state: SessionState::Negotiating,
            created_at: Instant::now(),
            has_sent_answer: false,
            pending_local: Vec::new(),
            pending_remote: Vec::new(),
            negotiation: Some(negotiation),
            sampler: None,
        });
        self.publish(SessionState::Negotiating);
    }

    fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        let Some(session) = self.session.as_mut() else {
            debug!("remote candidate with no session dropped");
            return;
        };

        if session.has_sent_answer {
            add_remote_candidate(session.id, &session.transport, candidate);
        } else {
            session.pending_remote.push(candidate);
        }
    }

    fn on_answer_ready(&mut self, id: SessionId, result: Result<String, TransportError>) {
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            debug!("{id}: answer for superseded session dropped");
            return;
        };
        session.negotiation = None;

        let answer = match result {
            Ok(answer) => answer,
            Err(e) => {
                warn!("{id}: negotiation failed: {e}");
                self.teardown("negotiation failed");
                return;
            }
        };

        info!("{id}: sending answer ({} bytes of SDP)", answer.len());
        let _ = self.outbound.send(SignalMessage::Answer { sdp: answer });
        session.has_sent_answer = true;

        for candidate in session.pending_local.drain(..) {
            let _ = self.outbound.send(candidate.into_signal());
        }
        for candidate in session.pending_remote.drain(..) {
            add_remote_candidate(id, &session.transport, candidate);
        }
    }

    // ── Transport callbacks ───────────────────────────────────────────────────

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate),
            TransportEvent::ConnectionState(state) => self.on_connection_state(state),
            TransportEvent::DataMessage(bytes) => self.on_data_message(&bytes),
        }
    }

    fn on_local_candidate(&mut self, candidate: IceCandidate) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.has_sent_answer {
            let _ = self.outbound.send(candidate.into_signal());
        } else {
            session.pending_local.push(candidate);
        }
    }

    fn on_connection_state(&mut self, state: ConnectionState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let id = session.id;

        if state.is_terminal() {
            info!("{id}: transport reported {state:?}");
            self.teardown("transport ended");
            return;
        }

        if state != ConnectionState::Connected || session.state != SessionState::Negotiating {
            debug!("{id}: transport state {state:?}");
            return;
        }

        session.state = SessionState::Connected;
        self.active_tx
            .send_replace(Some(Arc::clone(&session.transport)));
        session.sampler = Some(spawn_bandwidth_sampler(
            id,
            Arc::clone(&session.transport),
            self.sample_interval,
        ));
        info!(
            "{id}: connected after {:?}",
            session.created_at.elapsed()
        );
        self.publish(SessionState::Connected);

        // The pump may have stopped long before the viewer could see video.
        self.pump.replay_last();
        // The device behind the bridge may have changed since startup.
        self.bridge.request_resolve();
    }

    fn on_data_message(&mut self, bytes: &[u8]) {
        let msg = match decode_input(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("malformed input message dropped: {e}");
                return;
            }
        };

        let Some(primitive) = self.mapper.handle_message(&msg) else {
            return;
        };

        match self.bridge.send(&primitive) {
            Ok(()) => debug!("queued {primitive:?} for the bridge"),
            Err(e) => warn!("input dropped: {e}"),
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn current_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    fn publish(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    /// Closes the current session, if any.  The transport is closed exactly
    /// once because the session is taken out of `self` first.
    fn teardown(&mut self, reason: &str) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.publish(SessionState::Closing);

        if let Some(task) = session.negotiation {
            task.abort();
        }
        if let Some(task) = session.sampler {
            task.abort();
        }
        self.active_tx.send_replace(None);
        session.transport.close();
        self.mapper.reset();

        info!(
            "{}: closed ({reason}) after {:?}",
            session.id,
            session.created_at.elapsed()
        );
        self.publish(SessionState::Idle);
    }
}

fn add_remote_candidate(id: SessionId, transport: &Arc<dyn TransportSession>, candidate: IceCandidate) {
    let transport = Arc::clone(transport);
    tokio::spawn(async move {
        if let Err(e) = transport.add_remote_candidate(candidate).await {
            debug!("{id}: remote candidate rejected: {e}");
        }
    });
}

/// Outbound rate in kbit/s for `bytes` sent over `elapsed`.
pub fn kbit_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    bytes as f64 * 8.0 / 1000.0 / elapsed.as_secs_f64()
}

fn spawn_bandwidth_sampler(
    id: SessionId,
    transport: Arc<dyn TransportSession>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut last_bytes = transport.bytes_sent();
        let mut last_at = Instant::now();
        loop {
            ticker.tick().await;
            let bytes = transport.bytes_sent();
            let rate = kbit_per_sec(bytes.saturating_sub(last_bytes), last_at.elapsed());
            info!("{id}: outbound {rate:.1} kbit/s");
            last_bytes = bytes;
            last_at = Instant::now();
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::frame_pump::FrameClock;
    use crate::application::injection_supervisor::SupervisorSettings;
    use crate::infrastructure::mock::{
        FixedDeviceQuery, MockFrameSource, MockTransportFactory, PipeBridgeLauncher,
    };
    use mirror_core::{SWIPE_DURATION, TAP_THRESHOLD};

    struct Harness {
        events: mpsc::UnboundedSender<CoordinatorEvent>,
        outbound: mpsc::UnboundedReceiver<SignalMessage>,
        state: watch::Receiver<SessionState>,
        factory: Arc<MockTransportFactory>,
    }

    fn start(factory: MockTransportFactory) -> Harness {
        let factory = Arc::new(factory);
        let bridge = BridgeSupervisor::new(
            Arc::new(FixedDeviceQuery::no_device()),
            Arc::new(PipeBridgeLauncher::ready()),
            SupervisorSettings::default(),
        );
        let (frames_tx, _frames_rx) = mpsc::channel(4);
        let pump = FramePump::new(
            Arc::new(MockFrameSource::failing()),
            frames_tx,
            Duration::from_millis(500),
            FrameClock::new(),
        );
        let mapper = CoordinateMapper::new(bridge.geometry(), TAP_THRESHOLD, SWIPE_DURATION);
        let (outbound_tx, outbound) = mpsc::unbounded_channel();

        let coordinator = SessionCoordinator::new(
            CoordinatorDeps {
                factory: Arc::clone(&factory) as Arc<dyn TransportFactory>,
                pump,
                bridge,
                mapper,
                outbound: outbound_tx,
            },
            Duration::from_secs(2),
        );
        let events = coordinator.events();
        let state = coordinator.subscribe_state();
        tokio::spawn(coordinator.run());

        Harness {
            events,
            outbound,
            state,
            factory,
        }
    }

    fn offer(sdp: &str) -> CoordinatorEvent {
        CoordinatorEvent::Signal(SignalMessage::Offer { sdp: sdp.into() })
    }

    fn remote_candidate(c: &str) -> CoordinatorEvent {
        CoordinatorEvent::Signal(SignalMessage::IceCandidate {
            candidate: c.into(),
            sdp_m_line_index: 0,
            sdp_mid: None,
        })
    }

    async fn wait_state(h: &mut Harness, want: SessionState) {
        tokio::time::timeout(Duration::from_secs(1), h.state.wait_for(|s| *s == want))
            .await
            .expect("state not reached")
            .unwrap();
    }

    async fn next_outbound(h: &mut Harness) -> SignalMessage {
        tokio::time::timeout(Duration::from_secs(1), h.outbound.recv())
            .await
            .expect("no outbound message")
            .unwrap()
    }

    #[tokio::test]
    async fn test_offer_produces_answer() {
        // Arrange
        let mut h = start(MockTransportFactory::new());

        // Act
        h.events.send(offer("v=0 offer")).unwrap();

        // Assert
        assert_eq!(
            next_outbound(&mut h).await,
            SignalMessage::Answer {
                sdp: "answer-to:v=0 offer".into()
            }
        );
        wait_state(&mut h, SessionState::Negotiating).await;
    }

    #[tokio::test]
    async fn test_local_candidates_wait_for_answer() {
        // Arrange: answers are held until released
        let factory = MockTransportFactory::gated();
        let gate = factory.gate();
        let mut h = start(factory);
        h.events.send(offer("v=0")).unwrap();
        wait_state(&mut h, SessionState::Negotiating).await;
        let session = h.factory.session(0);

        // Act: a local candidate fires before the answer exists
        session.emit_local_candidate("candidate:early");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.outbound.try_recv().is_err());
        gate.notify_one();

        // Assert: answer first, then the held-back candidate
        assert!(matches!(
            next_outbound(&mut h).await,
            SignalMessage::Answer { .. }
        ));
        match next_outbound(&mut h).await {
            SignalMessage::IceCandidate { candidate, .. } => {
                assert_eq!(candidate, "candidate:early")
            }
            other => panic!("expected candidate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_candidates_buffer_until_answer() {
        let factory = MockTransportFactory::gated();
        let gate = factory.gate();
        let mut h = start(factory);
        h.events.send(offer("v=0")).unwrap();
        wait_state(&mut h, SessionState::Negotiating).await;

        h.events.send(remote_candidate("candidate:r1")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let session = h.factory.session(0);
        assert!(session.remote_candidates().is_empty());

        gate.notify_one();
        next_outbound(&mut h).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(session.remote_candidates(), vec!["candidate:r1".to_string()]);
    }

    #[tokio::test]
    async fn test_candidate_without_session_is_dropped() {
        let h = start(MockTransportFactory::new());

        h.events.send(remote_candidate("candidate:orphan")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(h.factory.opened(), 0);
        assert_eq!(*h.state.borrow(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_negotiation_failure_returns_to_idle() {
        // Arrange
        let mut h = start(MockTransportFactory::failing_answers());

        // Act
        h.events.send(offer("v=0")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Assert
        wait_state(&mut h, SessionState::Idle).await;
        assert_eq!(h.factory.opened(), 1);
        assert_eq!(h.factory.session(0).close_count(), 1);
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unavailable_engine_rejects_offer_and_stays_idle() {
        let h = start(MockTransportFactory::unavailable());

        h.events.send(offer("v=0")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*h.state.borrow(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_connected_then_disconnected_cycles_to_idle() {
        let mut h = start(MockTransportFactory::new());
        h.events.send(offer("v=0")).unwrap();
        next_outbound(&mut h).await;
        let session = h.factory.session(0);

        session.emit_state(ConnectionState::Connected);
        wait_state(&mut h, SessionState::Connected).await;

        session.emit_state(ConnectionState::Disconnected);
        wait_state(&mut h, SessionState::Idle).await;
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bandwidth_sampling_runs_only_while_connected() {
        // Arrange
        let mut h = start(MockTransportFactory::new());
        h.events.send(offer("v=0")).unwrap();
        next_outbound(&mut h).await;
        let session = h.factory.session(0);
        assert_eq!(session.bytes_sent_reads(), 0);

        // Act: connect and let one sample interval pass
        session.emit_state(ConnectionState::Connected);
        wait_state(&mut h, SessionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let reads_at_connect = session.bytes_sent_reads();
        session.add_bytes_sent(250_000);
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        // Assert: the counter was sampled on the interval
        assert!(reads_at_connect >= 1);
        assert!(session.bytes_sent_reads() > reads_at_connect);

        // Act: disconnect and wait two more intervals
        session.emit_state(ConnectionState::Disconnected);
        wait_state(&mut h, SessionState::Idle).await;
        let reads_at_disconnect = session.bytes_sent_reads();
        tokio::time::sleep(Duration::from_millis(4_500)).await;

        // Assert: sampling stopped with the session
        assert_eq!(session.bytes_sent_reads(), reads_at_disconnect);
    }

    #[tokio::test]
    async fn test_events_from_superseded_session_are_ignored() {
        // Arrange: session 1 replaced by session 2
        let mut h = start(MockTransportFactory::new());
        h.events.send(offer("first")).unwrap();
        next_outbound(&mut h).await;
        h.events.send(offer("second")).unwrap();
        next_outbound(&mut h).await;
        let stale = h.factory.session(0);

        // Act: the old engine keeps firing callbacks
        stale.emit_state(ConnectionState::Connected);
        stale.emit_local_candidate("candidate:stale");
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Assert
        assert_eq!(*h.state.borrow(), SessionState::Negotiating);
        assert!(h.outbound.try_recv().is_err());
        assert_eq!(stale.close_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_data_message_keeps_session() {
        let mut h = start(MockTransportFactory::new());
        h.events.send(offer("v=0")).unwrap();
        next_outbound(&mut h).await;
        let session = h.factory.session(0);
        session.emit_state(ConnectionState::Connected);
        wait_state(&mut h, SessionState::Connected).await;

        session.emit_data(b"{not json");
        session.emit_data(br#"{"type":"down","x":0.5,"y":0.5}"#);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*h.state.borrow(), SessionState::Connected);
        assert_eq!(session.close_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_active_session() {
        let mut h = start(MockTransportFactory::new());
        h.events.send(offer("v=0")).unwrap();
        next_outbound(&mut h).await;

        h.events.send(CoordinatorEvent::Shutdown).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(h.factory.session(0).close_count(), 1);
    }

    #[test]
    fn test_kbit_per_sec() {
        assert_eq!(kbit_per_sec(250_000, Duration::from_secs(2)), 1000.0);
        assert_eq!(kbit_per_sec(1_000, Duration::ZERO), 0.0);
    }
}
