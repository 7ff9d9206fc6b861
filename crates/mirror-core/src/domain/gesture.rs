//! Single-pointer gesture accumulation and tap/swipe classification.
//!
//! Viewers interact with a rendered video frame using a mouse or a finger.
//! Each interaction arrives as a `down`, zero or more `move`s, and an `up`.
//! [`GestureTracker`] collapses that sequence into exactly one
//! [`InputPrimitive`]:
//!
//! ```text
//! down(p0) ─ move(p1) ─ … ─ move(pn) ─ up
//!                                       │
//!        distance(p0, pn) <  threshold  ├─▶ Tap   at p0
//!        distance(p0, pn) >= threshold  └─▶ Swipe p0 → pn
//! ```
//!
//! Small unintentional drags during a tap stay below the threshold and are
//! still delivered as taps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Movement below this many device points classifies a gesture as a tap.
pub const TAP_THRESHOLD: f64 = 10.0;

/// Fixed duration given to every emitted swipe.
pub const SWIPE_DURATION: Duration = Duration::from_millis(300);

/// A position in device space (logical points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Pointer phase reported by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GesturePhase {
    Down,
    Move,
    Up,
}

/// A discrete input action to be injected into the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputPrimitive {
    Tap { at: Point },
    Swipe { from: Point, to: Point, duration: Duration },
}

/// An in-progress gesture.
///
/// Only exists between a `down` and its `up`, so the down point is always
/// present while a gesture is being tracked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureState {
    pub down_point: Point,
    pub last_move_point: Option<Point>,
}

impl GestureState {
    /// The point the gesture ends at: the last move, or the down point if the
    /// pointer never moved.
    pub fn end_point(&self) -> Point {
        self.last_move_point.unwrap_or(self.down_point)
    }
}

/// Accumulates pointer events into tap and swipe primitives.
///
/// Holds at most one [`GestureState`] (single-pointer model).
#[derive(Debug, Clone)]
pub struct GestureTracker {
    current: Option<GestureState>,
    tap_threshold: f64,
    swipe_duration: Duration,
}

impl Default for GestureTracker {
    fn default() -> Self {
        Self::new(TAP_THRESHOLD, SWIPE_DURATION)
    }
}

impl GestureTracker {
    pub fn new(tap_threshold: f64, swipe_duration: Duration) -> Self {
        Self {
            current: None,
            tap_threshold,
            swipe_duration,
        }
    }

    /// The gesture currently in progress, if any.
    pub fn current(&self) -> Option<&GestureState> {
        self.current.as_ref()
    }

    /// Starts a new gesture at `point`, discarding any stale one.
    pub fn down(&mut self, point: Point) {
        self.current = Some(GestureState {
            down_point: point,
            last_move_point: None,
        });
    }

    /// Records a move.  Ignored when no gesture is in progress.
    pub fn move_to(&mut self, point: Point) {
        if let Some(state) = self.current.as_mut() {
            state.last_move_point = Some(point);
        }
    }

    /// Completes the gesture and classifies it.
    ///
    /// Returns `None` for a stray `up` with no preceding `down`.  The gesture
    /// state is cleared in every case.
    pub fn up(&mut self) -> Option<InputPrimitive> {
        let state = self.current.take()?;
        Some(classify(
            state.down_point,
            state.end_point(),
            self.tap_threshold,
            self.swipe_duration,
        ))
    }

    /// Drops any in-progress gesture without emitting anything.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Classifies a completed gesture from its start and end points.
///
/// Strictly less than `tap_threshold` is a tap; a distance exactly at the
/// threshold is a swipe.
pub fn classify(down: Point, end: Point, tap_threshold: f64, duration: Duration) -> InputPrimitive {
    if down.distance_to(&end) < tap_threshold {
        InputPrimitive::Tap { at: down }
    } else {
        InputPrimitive::Swipe {
            from: down,
            to: end,
            duration,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
