//! Camera frame container.
//!
//! A `Frame` is one timestamped image sample. It is immutable for the
//! duration of one processing pass and shared as `Arc<Frame>` so multiple
//! detectors can read it concurrently. Pixel bytes are private; detectors
//! read them through `pixels()` and must not retain the slice beyond a call.

use std::time::Duration;

/// One timestamped image sample from the frame source.
pub struct Frame {
    /// Private pixel data (row-major RGB).
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonically increasing per-source sequence number.
    pub sequence: u64,
    /// Monotonic capture timestamp, relative to source start.
    pub timestamp: Duration,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64, timestamp: Duration) -> Self {
        Self {
            pixels,
            width,
            height,
            sequence,
            timestamp,
        }
    }

    /// Read-only pixel access for detector implementations.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}
