//! Domain entities for Sim-Mirror.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: no sockets, no processes, no timers.  Everything here can be
//! unit-tested on any platform without a device attached.
//!
//! - [`geometry`] – the device's logical screen size and the optional
//!   window-chrome correction applied when the video frame includes
//!   non-device pixels.
//! - [`gesture`] – single-pointer gesture accumulation and tap/swipe
//!   classification.

pub mod geometry;
pub mod gesture;
