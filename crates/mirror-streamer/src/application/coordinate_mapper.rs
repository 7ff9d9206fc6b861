//! Coordinate mapper: viewer pointer events → device input primitives.
//!
//! Combines the current [`DeviceGeometry`] snapshot (owned by the bridge
//! supervisor and observed through a watch channel) with a
//! [`GestureTracker`] that is owned here, on the coordinator's task.

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use mirror_core::{
    DeviceGeometry, GesturePhase, GestureTracker, InputMessage, InputPrimitive, Point,
};

/// Maps normalized viewer input into device-space primitives.
pub struct CoordinateMapper {
    geometry: watch::Receiver<DeviceGeometry>,
    tracker: GestureTracker,
}

impl CoordinateMapper {
    pub fn new(
        geometry: watch::Receiver<DeviceGeometry>,
        tap_threshold: f64,
        swipe_duration: Duration,
    ) -> Self {
        Self {
            geometry,
            tracker: GestureTracker::new(tap_threshold, swipe_duration),
        }
    }

    /// Converts normalized coordinates to device points, or `None` while the
    /// geometry is unresolved.
    pub fn map_point(&self, normalized_x: f64, normalized_y: f64) -> Option<Point> {
        self.geometry.borrow().map(normalized_x, normalized_y)
    }

    /// Feeds one pointer event into the gesture tracker.
    ///
    /// Returns the completed primitive on an `up` that closes a gesture.
    /// Events arriving while the geometry is unresolved are dropped without
    /// touching the gesture in progress.
    pub fn handle(
        &mut self,
        phase: GesturePhase,
        normalized_x: f64,
        normalized_y: f64,
    ) -> Option<InputPrimitive> {
        let Some(point) = self.map_point(normalized_x, normalized_y) else {
            debug!("geometry unresolved; {phase:?} event dropped");
            return None;
        };

        match phase {
            GesturePhase::Down => {
                self.tracker.down(point);
                None
            }
            GesturePhase::Move => {
                self.tracker.move_to(point);
                None
            }
            GesturePhase::Up => {
                self.tracker.move_to(point);
                self.tracker.up()
            }
        }
    }

    /// Convenience wrapper for a decoded data-channel message.
    pub fn handle_message(&mut self, msg: &InputMessage) -> Option<InputPrimitive> {
        self.handle(msg.phase, msg.x, msg.y)
    }

    /// Drops any gesture in progress, e.g. when its session ends.
    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    pub fn gesture_in_progress(&self) -> bool {
        self.tracker.current().is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
