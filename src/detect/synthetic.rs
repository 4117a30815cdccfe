//! Synthetic detectors and recognizers.
//!
//! These produce scripted observations without a real model, for the demo
//! binary and for integration tests. Geometry is generated, not inferred:
//! a synthetic hand lays its five fingers out on rays from the wrist, with
//! extended fingers straight and strictly lengthening away from the wrist
//! and curled fingers folded back past their proximal joint.

use std::collections::HashMap;

use anyhow::Result;
use rand::Rng;

use crate::frame::Frame;
use crate::geometry::{Point, Quad};

use super::detector::{Detector, TextCandidate, TextRecognizer};
use super::observation::{HandLandmarks, ObservationKind, RawObservation, LANDMARK_COUNT};

/// Build a synthetic hand around `center` with the given raised fingers
/// (thumb, index, middle, ring, pinky order).
pub fn hand_landmarks(center: Point, raised: [bool; 5]) -> HandLandmarks {
    let wrist = Point::new(center.x, center.y + 0.12);
    let mut points = [Point::default(); LANDMARK_COUNT];
    points[0] = wrist;

    // Fingers fan out over ~80 degrees around straight up.
    for (finger, &extended) in raised.iter().enumerate() {
        let angle = (-40.0 + 20.0 * finger as f32).to_radians();
        let dir = Point::new(angle.sin(), -angle.cos());
        let radii: [f32; 4] = if extended {
            // Strictly increasing wrist distance, collinear joints.
            [0.06, 0.10, 0.14, 0.18]
        } else {
            // Folded back: distal and tip closer to the wrist than the
            // proximal joint.
            [0.06, 0.09, 0.07, 0.05]
        };
        let base = 1 + finger * 4;
        for (j, r) in radii.iter().enumerate() {
            points[base + j] = Point::new(wrist.x + dir.x * r, wrist.y + dir.y * r);
        }
    }

    HandLandmarks::new(points)
}

fn jittered(p: Point, amplitude: f32) -> Point {
    if amplitude == 0.0 {
        return p;
    }
    let mut rng = rand::thread_rng();
    Point::new(
        p.x + rng.gen_range(-amplitude..=amplitude),
        p.y + rng.gen_range(-amplitude..=amplitude),
    )
}

// ----------------------------------------------------------------------------
// Scripted detector (tests)
// ----------------------------------------------------------------------------

/// Detector driven by a frame-sequence script. Frames without an entry
/// produce no observations.
pub struct ScriptedDetector {
    name: &'static str,
    kind: ObservationKind,
    script: HashMap<u64, Vec<RawObservation>>,
}

impl ScriptedDetector {
    pub fn new(name: &'static str, kind: ObservationKind) -> Self {
        Self {
            name,
            kind,
            script: HashMap::new(),
        }
    }

    pub fn at(mut self, sequence: u64, observations: Vec<RawObservation>) -> Self {
        self.script.insert(sequence, observations);
        self
    }

    pub fn over(mut self, sequences: std::ops::Range<u64>, observations: Vec<RawObservation>) -> Self {
        for sequence in sequences {
            self.script.insert(sequence, observations.clone());
        }
        self
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ObservationKind {
        self.kind
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawObservation>> {
        Ok(self.script.get(&frame.sequence).cloned().unwrap_or_default())
    }
}

// ----------------------------------------------------------------------------
// Demo detectors
// ----------------------------------------------------------------------------

/// Synthetic hand that cycles through raised-finger sets every `period`
/// frames, with positional jitter.
pub struct SyntheticHandDetector {
    center: Point,
    period: u64,
    jitter: f32,
}

const FINGER_SCRIPT: [[bool; 5]; 4] = [
    [false, false, false, false, false], // fist
    [false, true, false, false, false],  // point
    [false, true, true, false, false],   // peace
    [true, true, true, true, true],      // open palm
];

impl SyntheticHandDetector {
    pub fn new(center: Point, period: u64, jitter: f32) -> Self {
        Self {
            center,
            period,
            jitter,
        }
    }
}

impl Detector for SyntheticHandDetector {
    fn name(&self) -> &'static str {
        "synthetic-hand"
    }

    fn kind(&self) -> ObservationKind {
        ObservationKind::Hand
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawObservation>> {
        let step = (frame.sequence / self.period.max(1)) as usize % FINGER_SCRIPT.len();
        let center = jittered(self.center, self.jitter);
        Ok(vec![RawObservation::HandPose {
            landmarks: hand_landmarks(center, FINGER_SCRIPT[step]),
            chirality: None,
            confidence: 0.92,
        }])
    }
}

/// Synthetic paper grid: a stable square quad visible for a frame range.
pub struct SyntheticQuadDetector {
    quad: Quad,
    visible: std::ops::Range<u64>,
    jitter: f32,
}

impl SyntheticQuadDetector {
    pub fn new(quad: Quad, visible: std::ops::Range<u64>, jitter: f32) -> Self {
        Self {
            quad,
            visible,
            jitter,
        }
    }
}

impl Detector for SyntheticQuadDetector {
    fn name(&self) -> &'static str {
        "synthetic-quad"
    }

    fn kind(&self) -> ObservationKind {
        ObservationKind::Quad
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawObservation>> {
        if !self.visible.contains(&frame.sequence) {
            return Ok(vec![]);
        }
        let mut corners = self.quad.corners;
        for corner in &mut corners {
            *corner = jittered(*corner, self.jitter);
        }
        Ok(vec![RawObservation::Quadrilateral {
            quad: Quad::new(corners),
            confidence: 0.88,
        }])
    }
}

/// Deterministic digit recognizer: each region reads as a digit derived from
/// its centroid, so a stable grid reads the same digits every frame.
#[derive(Default)]
pub struct SyntheticTextRecognizer;

impl SyntheticTextRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl TextRecognizer for SyntheticTextRecognizer {
    fn recognize(&mut self, _frame: &Frame, region: &Quad) -> Result<Option<TextCandidate>> {
        let c = region.centroid();
        let digit = ((c.x * 13.0).floor() as i64 + (c.y * 17.0).floor() as i64).rem_euclid(10);
        Ok(Some(TextCandidate {
            text: digit.to_string(),
            confidence: 0.9,
        }))
    }
}

/// Recognizer backed by a closure, for tests that script per-cell reads.
pub struct FnRecognizer<F>(pub F);

impl<F> TextRecognizer for FnRecognizer<F>
where
    F: FnMut(&Frame, &Quad) -> Result<Option<TextCandidate>> + Send,
{
    fn recognize(&mut self, frame: &Frame, region: &Quad) -> Result<Option<TextCandidate>> {
        (self.0)(frame, region)
    }
}
