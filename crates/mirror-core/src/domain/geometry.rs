//! Device geometry: the target device's logical screen size plus the optional
//! window-chrome correction.
//!
//! # Coordinate spaces
//!
//! ```text
//! Viewer space   normalized [0,1] fractions of the rendered video frame
//!       │
//!       │  DeviceGeometry::map()
//!       ▼
//! Device space   logical points, e.g. 390 × 844 for a 6.1" phone
//! ```
//!
//! When the captured video contains only the device display, mapping is a
//! plain scale.  When the capture includes the simulator window's title bar
//! (the "chrome"), the vertical axis must first be converted to window points,
//! shifted up by the title-bar height, and rescaled from content height to
//! screen height.
//!
//! # Invariant
//!
//! A [`DeviceGeometry`] is either fully unresolved (all zero, see
//! [`DeviceGeometry::UNRESOLVED`]) or fully valid (positive, finite width and
//! height).  The fields are private and [`DeviceGeometry::new`] is the only
//! way to build a resolved value, so a half-populated geometry can never reach
//! the coordinate mapper.

use thiserror::Error;

use super::gesture::Point;

/// Error returned when geometry values fail validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Width or height was zero, negative, or not a finite number.
    #[error("invalid screen size {width}x{height}: both dimensions must be positive")]
    InvalidScreenSize { width: f64, height: f64 },

    /// A chrome-correction value was out of range.
    #[error("invalid chrome correction: {0}")]
    InvalidChrome(String),
}

/// Vertical correction for video frames that include window chrome.
///
/// All values are in window points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromeCorrection {
    /// Height of the title bar above the device content.
    pub top_bar_offset: f64,
    /// Full window height, including the title bar.
    pub window_height: f64,
    /// Height of the device content area inside the window.
    pub content_height: f64,
}

impl ChromeCorrection {
    fn validate(&self) -> Result<(), GeometryError> {
        if !self.top_bar_offset.is_finite() || self.top_bar_offset < 0.0 {
            return Err(GeometryError::InvalidChrome(format!(
                "top_bar_offset must be >= 0, got {}",
                self.top_bar_offset
            )));
        }
        if !self.window_height.is_finite() || self.window_height <= 0.0 {
            return Err(GeometryError::InvalidChrome(format!(
                "window_height must be > 0, got {}",
                self.window_height
            )));
        }
        if !self.content_height.is_finite() || self.content_height <= 0.0 {
            return Err(GeometryError::InvalidChrome(format!(
                "content_height must be > 0, got {}",
                self.content_height
            )));
        }
        Ok(())
    }
}

/// Logical screen size of the target device plus optional chrome correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceGeometry {
    screen_width: f64,
    screen_height: f64,
    chrome: Option<ChromeCorrection>,
}

impl Default for DeviceGeometry {
    fn default() -> Self {
        Self::UNRESOLVED
    }
}

impl DeviceGeometry {
    /// The "nothing resolved yet" geometry.  [`map`](Self::map) always
    /// returns `None` for it.
    pub const UNRESOLVED: DeviceGeometry = DeviceGeometry {
        screen_width: 0.0,
        screen_height: 0.0,
        chrome: None,
    };

    /// Builds a validated geometry.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if either screen dimension is not a positive
    /// finite number, or if the chrome correction contains out-of-range values.
    pub fn new(
        screen_width: f64,
        screen_height: f64,
        chrome: Option<ChromeCorrection>,
    ) -> Result<Self, GeometryError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(screen_width) || !valid(screen_height) {
            return Err(GeometryError::InvalidScreenSize {
                width: screen_width,
                height: screen_height,
            });
        }
        if let Some(c) = &chrome {
            c.validate()?;
        }
        Ok(Self {
            screen_width,
            screen_height,
            chrome,
        })
    }

    pub fn screen_width(&self) -> f64 {
        self.screen_width
    }

    pub fn screen_height(&self) -> f64 {
        self.screen_height
    }

    pub fn chrome(&self) -> Option<ChromeCorrection> {
        self.chrome
    }

    /// `true` once a valid screen size has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.screen_width > 0.0 && self.screen_height > 0.0
    }

    /// Maps viewer-normalized coordinates into device points.
    ///
    /// Returns `None` while the geometry is unresolved.  The mapping is a pure
    /// function of the inputs and `self`.
    ///
    /// With chrome correction:
    ///
    /// ```text
    /// x = nx * screen_width
    /// y = max(0, (ny * window_height - top_bar_offset) * (screen_height / content_height))
    /// ```
    ///
    /// Without it, both axes are scaled directly.
    pub fn map(&self, normalized_x: f64, normalized_y: f64) -> Option<Point> {
        if !self.is_resolved() {
            return None;
        }

        let x = normalized_x * self.screen_width;
        let y = match &self.chrome {
            Some(c) => {
                let window_y = normalized_y * c.window_height - c.top_bar_offset;
                (window_y * (self.screen_height / c.content_height)).max(0.0)
            }
            None => normalized_y * self.screen_height,
        };

        Some(Point::new(x, y))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
