//! Frame sources.
//!
//! Real deployments feed frames in from a platform capture layer through
//! `SessionController::deliver_frame`; the synthetic source here exists for
//! demos and tests, producing deterministic-cadence frames of gray noise.

use std::time::Duration;

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::Frame;
use crate::session::FrameSource;

/// Generates frames at a fixed logical cadence. Timestamps advance by one
/// frame interval per pull regardless of wall clock, so downstream
/// throttling and tracker aging are reproducible.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    sequence: u64,
    elapsed: Duration,
    available: bool,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            sequence: 0,
            elapsed: Duration::ZERO,
            available: true,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn frames_generated(&self) -> u64 {
        self.sequence
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn next_frame(&mut self) -> Result<Frame> {
        ensure!(self.available, "synthetic source marked unavailable");
        let len = self.width as usize * self.height as usize;
        let mut pixels = vec![0u8; len];
        for px in &mut pixels {
            *px = 96u8.saturating_add(self.rng.gen_range(0..64));
        }
        let frame = Frame::new(pixels, self.width, self.height, self.sequence, self.elapsed);
        self.sequence += 1;
        self.elapsed += self.frame_interval;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_advance_sequence_and_timestamp() {
        let mut source = SyntheticSource::new(8, 8, 30);
        let a = source.next_frame().unwrap();
        let b = source.next_frame().unwrap();
        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert!(b.timestamp > a.timestamp);
        assert_eq!(a.byte_len(), 64);
    }

    #[test]
    fn unavailable_source_refuses_frames() {
        let mut source = SyntheticSource::new(8, 8, 30).with_availability(false);
        assert!(!source.is_available());
        assert!(source.next_frame().is_err());
    }
}
