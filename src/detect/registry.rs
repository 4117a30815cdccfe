//! Thread-safe detector registry with a per-frame time budget.
//!
//! Detectors are wrapped in `Mutex` because `Detector::detect` takes
//! `&mut self`. Each frame, every enabled detector runs on its own thread;
//! results are collected until the budget elapses. A detector that errors or
//! overruns the budget contributes no observations for that frame and is
//! reported through a rate-limited warning.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::frame::Frame;

use super::detector::Detector;
use super::observation::{ObservationKind, RawObservation};

/// Observations from one frame, split by kind.
#[derive(Debug, Default)]
pub struct FrameObservations {
    pub hands: Vec<RawObservation>,
    pub quads: Vec<RawObservation>,
    pub texts: Vec<RawObservation>,
}

impl FrameObservations {
    fn push_all(&mut self, kind: ObservationKind, observations: Vec<RawObservation>) {
        let bucket = match kind {
            ObservationKind::Hand => &mut self.hands,
            ObservationKind::Quad => &mut self.quads,
            ObservationKind::Text => &mut self.texts,
        };
        // Malformed cross-kind output from a detector is dropped.
        bucket.extend(observations.into_iter().filter(|obs| obs.kind() == kind));
    }
}

struct Entry {
    name: &'static str,
    kind: ObservationKind,
    detector: Arc<Mutex<Box<dyn Detector>>>,
}

/// At most one warning per source per window; overflow is counted and
/// reported with the next emitted line.
struct RateLimitedWarn {
    window: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl RateLimitedWarn {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            suppressed: 0,
        }
    }

    fn warn(&mut self, name: &str, message: &str) {
        let now = Instant::now();
        let due = match self.last {
            Some(last) => now.duration_since(last) >= self.window,
            None => true,
        };
        if due {
            if self.suppressed > 0 {
                log::warn!(
                    "detector {}: {} ({} similar failures suppressed)",
                    name,
                    message,
                    self.suppressed
                );
            } else {
                log::warn!("detector {}: {}", name, message);
            }
            self.last = Some(now);
            self.suppressed = 0;
        } else {
            self.suppressed += 1;
        }
    }
}

const WARN_WINDOW: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct DetectorRegistry {
    entries: Vec<Entry>,
    warners: HashMap<&'static str, RateLimitedWarn>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector.
    pub fn register<D: Detector + 'static>(&mut self, detector: D) {
        self.register_boxed(Box::new(detector));
    }

    pub fn register_boxed(&mut self, detector: Box<dyn Detector>) {
        self.entries.push(Entry {
            name: detector.name(),
            kind: detector.kind(),
            detector: Arc::new(Mutex::new(detector)),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kinds(&self) -> HashSet<ObservationKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    /// Warm up detectors of the enabled kinds. Failures are fatal to start-up.
    pub fn warm_up(&mut self, enabled: &HashSet<ObservationKind>) -> Result<()> {
        for entry in self.entries.iter().filter(|e| enabled.contains(&e.kind)) {
            let mut guard = entry
                .detector
                .lock()
                .map_err(|_| anyhow!("detector {} mutex poisoned", entry.name))?;
            guard.warm_up()?;
        }
        Ok(())
    }

    /// Run every enabled detector against one frame, collecting results
    /// until the budget elapses. Never blocks past the budget: stragglers
    /// are abandoned and their observations discarded for this frame.
    pub fn run_frame(
        &mut self,
        frame: &Arc<Frame>,
        enabled: &HashSet<ObservationKind>,
        budget: Duration,
    ) -> FrameObservations {
        let mut observations = FrameObservations::default();
        let selected: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| enabled.contains(&e.kind))
            .collect();
        if selected.is_empty() {
            return observations;
        }

        let (tx, rx) = mpsc::channel();
        for entry in &selected {
            let detector = entry.detector.clone();
            let frame = frame.clone();
            let tx = tx.clone();
            let name = entry.name;
            let kind = entry.kind;
            std::thread::spawn(move || {
                let result = match detector.lock() {
                    Ok(mut guard) => guard.detect(&frame),
                    Err(_) => Err(anyhow!("mutex poisoned")),
                };
                let _ = tx.send((name, kind, result));
            });
        }
        drop(tx);

        let expected = selected.len();
        drop(selected);
        let deadline = Instant::now() + budget;
        let mut received = 0;
        while received < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((_, kind, Ok(list))) => {
                    received += 1;
                    observations.push_all(kind, list);
                }
                Ok((name, _, Err(err))) => {
                    received += 1;
                    self.warner(name).warn(name, &format!("failed: {err:#}"));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let missing = expected - received;
                    self.warner("frame-budget").warn(
                        "frame-budget",
                        &format!(
                            "{missing} detector(s) exceeded the {budget:?} frame budget; treating as no observation"
                        ),
                    );
                    break;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        observations
    }

    fn warner(&mut self, name: &'static str) -> &mut RateLimitedWarn {
        self.warners
            .entry(name)
            .or_insert_with(|| RateLimitedWarn::new(WARN_WINDOW))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Quad};

    struct FixedQuadDetector;

    impl Detector for FixedQuadDetector {
        fn name(&self) -> &'static str {
            "fixed-quad"
        }

        fn kind(&self) -> ObservationKind {
            ObservationKind::Quad
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawObservation>> {
            Ok(vec![RawObservation::Quadrilateral {
                quad: Quad::axis_aligned(Point::new(0.2, 0.2), 0.3, 0.3),
                confidence: 0.9,
            }])
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn kind(&self) -> ObservationKind {
            ObservationKind::Hand
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawObservation>> {
            Err(anyhow!("transient decode failure"))
        }
    }

    struct SlowDetector;

    impl Detector for SlowDetector {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn kind(&self) -> ObservationKind {
            ObservationKind::Hand
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawObservation>> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(vec![])
        }
    }

    fn test_frame(sequence: u64) -> Arc<Frame> {
        Arc::new(Frame::new(
            vec![0u8; 16],
            4,
            4,
            sequence,
            Duration::from_millis(sequence * 33),
        ))
    }

    fn all_kinds() -> HashSet<ObservationKind> {
        [
            ObservationKind::Hand,
            ObservationKind::Quad,
            ObservationKind::Text,
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn collects_observations_by_kind() {
        let mut registry = DetectorRegistry::new();
        registry.register(FixedQuadDetector);
        let obs = registry.run_frame(&test_frame(1), &all_kinds(), Duration::from_millis(500));
        assert_eq!(obs.quads.len(), 1);
        assert!(obs.hands.is_empty());
    }

    #[test]
    fn disabled_kinds_do_not_run() {
        let mut registry = DetectorRegistry::new();
        registry.register(FixedQuadDetector);
        let enabled: HashSet<ObservationKind> = [ObservationKind::Hand].into_iter().collect();
        let obs = registry.run_frame(&test_frame(1), &enabled, Duration::from_millis(500));
        assert!(obs.quads.is_empty());
    }

    #[test]
    fn failing_detector_contributes_nothing() {
        let mut registry = DetectorRegistry::new();
        registry.register(FixedQuadDetector);
        registry.register(FailingDetector);
        let obs = registry.run_frame(&test_frame(1), &all_kinds(), Duration::from_millis(500));
        assert_eq!(obs.quads.len(), 1);
        assert!(obs.hands.is_empty());
    }

    #[test]
    fn slow_detector_is_abandoned_at_the_budget() {
        let mut registry = DetectorRegistry::new();
        registry.register(SlowDetector);
        registry.register(FixedQuadDetector);
        let start = Instant::now();
        let obs = registry.run_frame(&test_frame(1), &all_kinds(), Duration::from_millis(20));
        assert!(start.elapsed() < Duration::from_millis(150));
        assert_eq!(obs.quads.len(), 1);
        assert!(obs.hands.is_empty());
    }

    #[test]
    fn rate_limited_warn_suppresses_repeats() {
        let mut warner = RateLimitedWarn::new(Duration::from_secs(60));
        warner.warn("d", "first");
        warner.warn("d", "second");
        warner.warn("d", "third");
        assert_eq!(warner.suppressed, 2);
    }
}
