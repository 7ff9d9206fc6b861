//! Frame liveness pump.
//!
//! A screen that is not changing produces no capture callbacks, so a viewer
//! joining while the simulator sits idle would otherwise stare at a black
//! video element.  The pump covers that gap: until the first real frame
//! arrives it emits a frame every interval, either by re-stamping the cached
//! one or by taking a one-shot screenshot.
//!
//! ```text
//! start() ──▶ tick ──▶ tick ──▶ tick ──▶ on_real_frame() ──▶ (stopped)
//!              │        │        │
//!          capture   re-emit  re-emit
//! ```
//!
//! The pump runs on its own task and only ever `try_send`s into the frame
//! queue, so neither the capture path nor the transport can be blocked by it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::Frame;
use crate::sync::relock;

/// Errors from a one-shot capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture tool could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The capture tool ran but reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Reading the captured image failed.
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The capture produced no image data.
    #[error("capture produced an empty image")]
    Empty,
}

/// Produces a single frame on demand.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Captures one frame of the current screen.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] if no frame could be produced.
    async fn capture_once(&self) -> Result<Frame, CaptureError>;
}

/// Monotonic presentation clock shared by capture and pump.
///
/// Built on [`tokio::time::Instant`] so paused-time tests see consistent
/// timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    origin: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time since the clock was created.  Never decreases.
    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Default)]
struct PumpState {
    cached: Option<Frame>,
    real_seen: bool,
    task: Option<JoinHandle<()>>,
}

struct PumpShared {
    source: Arc<dyn FrameSource>,
    output: mpsc::Sender<Frame>,
    interval: Duration,
    clock: FrameClock,
    state: Mutex<PumpState>,
}

impl PumpShared {
    fn lock(&self) -> MutexGuard<'_, PumpState> {
        relock(&self.state)
    }

    fn emit(&self, frame: Frame) -> bool {
        match self.output.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("frame queue full; pump frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    async fn tick(&self) {
        let cached = {
            let state = self.lock();
            if state.real_seen {
                return;
            }
            state.cached.clone()
        };

        let frame = match cached {
            Some(frame) => frame.restamped(self.clock.now()),
            None => match self.source.capture_once().await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("on-demand capture failed, retrying next tick: {e}");
                    return;
                }
            },
        };

        let mut state = self.lock();
        // A real frame may have landed while the capture was in flight.
        if state.real_seen {
            return;
        }
        state.cached = Some(frame.clone());
        drop(state);

        if self.emit(frame) {
            debug!("pump emitted keep-alive frame");
        }
    }
}

/// Emits keep-alive frames until the first real frame arrives.
///
/// Cheap to clone; clones share one pump.
#[derive(Clone)]
pub struct FramePump {
    shared: Arc<PumpShared>,
}

impl FramePump {
    pub fn new(
        source: Arc<dyn FrameSource>,
        output: mpsc::Sender<Frame>,
        interval: Duration,
        clock: FrameClock,
    ) -> Self {
        Self {
            shared: Arc::new(PumpShared {
                source,
                output,
                interval,
                clock,
                state: Mutex::new(PumpState::default()),
            }),
        }
    }

    /// Begins a new pump cycle.  The first tick fires immediately.
    ///
    /// Restarting a running pump replaces its timer.  The cached frame is
    /// kept.  Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut state = self.shared.lock();
        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.real_seen = false;

        let shared = Arc::clone(&self.shared);
        state.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shared.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                shared.tick().await;
            }
        }));
        info!("frame pump started ({:?} interval)", self.shared.interval);
    }

    /// Cancels the timer.  Fire-and-forget.
    pub fn stop(&self) {
        if let Some(task) = self.shared.lock().task.take() {
            task.abort();
            debug!("frame pump stopped");
        }
    }

    /// Records a genuine capture frame.
    ///
    /// The frame becomes the replay cache.  The first call in a cycle ends
    /// the pump for that cycle.
    pub fn on_real_frame(&self, frame: &Frame) {
        let mut state = self.shared.lock();
        state.cached = Some(frame.clone());
        if !state.real_seen {
            state.real_seen = true;
            if let Some(task) = state.task.take() {
                task.abort();
                info!("first real frame received; frame pump stopped");
            }
        }
    }

    /// Re-emits the cached frame with a fresh timestamp.
    ///
    /// Returns `false` when nothing is cached yet.
    pub fn replay_last(&self) -> bool {
        let frame = match self.shared.lock().cached.as_ref() {
            Some(frame) => frame.restamped(self.shared.clock.now()),
            None => {
                warn!("no cached frame to replay");
                return false;
            }
        };
        self.shared.emit(frame)
    }

    /// `true` while the timer task is alive.
    pub fn is_running(&self) -> bool {
        self.shared
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed frame, or fails the first `failures` calls.
    struct CountingSource {
        calls: AtomicUsize,
        failures: usize,
    }

    impl CountingSource {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
            })
        }
    }

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn capture_once(&self) -> Result<Frame, CaptureError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(CaptureError::Empty);
            }
            Ok(Frame::new(vec![0xAB; 16], Duration::ZERO))
        }
    }

    fn pump_with(source: Arc<CountingSource>) -> (FramePump, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(16);
        let pump = FramePump::new(source, tx, Duration::from_millis(500), FrameClock::new());
        (pump, rx)
    }

    /// Lets spawned tasks run without moving the paused clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_frame_is_emitted_immediately() {
        // Arrange
        let source = CountingSource::new(0);
        let (pump, mut rx) = pump_with(Arc::clone(&source));

        // Act
        pump.start();
        settle().await;

        // Assert
        let frame = rx.try_recv().expect("frame within the first tick");
        assert_eq!(frame.len(), 16);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_reemits_cached_frame_at_interval() {
        let source = CountingSource::new(0);
        let (pump, mut rx) = pump_with(Arc::clone(&source));

        pump.start();
        settle().await;
        let first = rx.try_recv().unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        let second = rx.try_recv().unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        let third = rx.try_recv().unwrap();

        // Only the first tick captures; later ticks reuse the cache.
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.data, &second.data));
        assert!(second.timestamp > first.timestamp);
        assert!(third.timestamp > second.timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_capture_is_retried_next_tick() {
        // Arrange: first capture fails
        let source = CountingSource::new(1);
        let (pump, mut rx) = pump_with(Arc::clone(&source));

        // Act
        pump.start();
        settle().await;

        // Assert: nothing yet, pump still alive
        assert!(rx.try_recv().is_err());
        assert!(pump.is_running());

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert!(rx.try_recv().is_ok());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_frame_stops_pump_for_good() {
        // Arrange
        let source = CountingSource::new(0);
        let (pump, mut rx) = pump_with(source);
        pump.start();
        settle().await;
        rx.try_recv().unwrap();

        // Act
        pump.on_real_frame(&Frame::new(vec![1u8; 4], Duration::from_millis(100)));
        pump.on_real_frame(&Frame::new(vec![2u8; 4], Duration::from_millis(133)));

        // Assert: no pump-sourced frame in the next several intervals
        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(500)).await;
            settle().await;
            assert!(rx.try_recv().is_err());
        }
        assert!(!pump.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_last_uses_latest_real_frame() {
        let source = CountingSource::new(0);
        let (pump, mut rx) = pump_with(source);

        pump.on_real_frame(&Frame::new(vec![7u8; 3], Duration::from_millis(10)));
        tokio::time::advance(Duration::from_millis(40)).await;

        assert!(pump.replay_last());
        let replayed = rx.try_recv().unwrap();
        assert_eq!(&*replayed.data, &[7u8, 7, 7]);
        assert!(replayed.timestamp >= Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_without_cache_is_noop() {
        let (pump, mut rx) = pump_with(CountingSource::new(0));
        assert!(!pump.replay_last());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let source = CountingSource::new(0);
        let (pump, mut rx) = pump_with(source);
        pump.start();
        settle().await;
        rx.try_recv().unwrap();

        pump.stop();
        tokio::time::advance(Duration::from_millis(1500)).await;
        settle().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_without_blocking() {
        // Arrange: capacity-one queue that nobody drains
        let (tx, mut rx) = mpsc::channel(1);
        let pump = FramePump::new(
            CountingSource::new(0),
            tx,
            Duration::from_millis(500),
            FrameClock::new(),
        );

        // Act
        pump.start();
        settle().await;
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(500)).await;
            settle().await;
        }

        // Assert: one frame queued, the pump kept ticking
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(pump.is_running());
    }
}
