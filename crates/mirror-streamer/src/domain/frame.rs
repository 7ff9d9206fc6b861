//! Video frames as seen by the core.

use std::sync::Arc;
use std::time::Duration;

/// An opaque image buffer plus its presentation timestamp.
///
/// The payload is reference-counted so the pump can keep its cached copy and
/// re-emit it without copying the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Arc<[u8]>,
    /// Time since the streamer's clock origin.
    pub timestamp: Duration,
}

impl Frame {
    pub fn new(data: impl Into<Arc<[u8]>>, timestamp: Duration) -> Self {
        Self {
            data: data.into(),
            timestamp,
        }
    }

    /// Same image, new timestamp.
    pub fn restamped(&self, timestamp: Duration) -> Self {
        Self {
            data: Arc::clone(&self.data),
            timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
