//! Per-frame detector output: untracked, immutable, identity-free.

use crate::geometry::{centroid, Point, Quad};

/// Number of hand landmarks: wrist plus four joints for each of five fingers.
pub const LANDMARK_COUNT: usize = 21;

/// Kinds of observation a detector can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Hand,
    Quad,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chirality {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerName {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl FingerName {
    pub const ALL: [FingerName; 5] = [
        FingerName::Thumb,
        FingerName::Index,
        FingerName::Middle,
        FingerName::Ring,
        FingerName::Pinky,
    ];

    /// Landmark index of this finger's base joint. Joints run base,
    /// proximal, distal, tip at consecutive indices.
    fn base_index(self) -> usize {
        match self {
            FingerName::Thumb => 1,
            FingerName::Index => 5,
            FingerName::Middle => 9,
            FingerName::Ring => 13,
            FingerName::Pinky => 17,
        }
    }
}

/// Hand pose as 21 normalized landmarks. Index 0 is the wrist; each finger
/// occupies four consecutive indices from base to tip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandLandmarks {
    pub points: [Point; LANDMARK_COUNT],
}

impl HandLandmarks {
    pub fn new(points: [Point; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn wrist(&self) -> Point {
        self.points[0]
    }

    /// Joints of one finger in base, proximal, distal, tip order.
    pub fn finger_joints(&self, finger: FingerName) -> [Point; 4] {
        let base = finger.base_index();
        [
            self.points[base],
            self.points[base + 1],
            self.points[base + 2],
            self.points[base + 3],
        ]
    }

    pub fn centroid(&self) -> Point {
        centroid(&self.points)
    }
}

/// One detector's untracked output for one frame. Produced fresh each frame,
/// never mutated, and carries no identity of its own.
#[derive(Clone, Debug, PartialEq)]
pub enum RawObservation {
    HandPose {
        landmarks: HandLandmarks,
        chirality: Option<Chirality>,
        confidence: f32,
    },
    Quadrilateral {
        quad: Quad,
        confidence: f32,
    },
    RecognizedText {
        text: String,
        bounds: Quad,
        confidence: f32,
    },
}

impl RawObservation {
    pub fn kind(&self) -> ObservationKind {
        match self {
            RawObservation::HandPose { .. } => ObservationKind::Hand,
            RawObservation::Quadrilateral { .. } => ObservationKind::Quad,
            RawObservation::RecognizedText { .. } => ObservationKind::Text,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            RawObservation::HandPose { confidence, .. }
            | RawObservation::Quadrilateral { confidence, .. }
            | RawObservation::RecognizedText { confidence, .. } => *confidence,
        }
    }

    /// Spatial anchor used for cross-frame matching.
    pub fn centroid(&self) -> Point {
        match self {
            RawObservation::HandPose { landmarks, .. } => landmarks.centroid(),
            RawObservation::Quadrilateral { quad, .. } => quad.centroid(),
            RawObservation::RecognizedText { bounds, .. } => bounds.centroid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finger_joints_cover_all_landmarks() {
        let mut points = [Point::default(); LANDMARK_COUNT];
        for (i, p) in points.iter_mut().enumerate() {
            p.x = i as f32;
        }
        let hand = HandLandmarks::new(points);
        let mut covered = vec![false; LANDMARK_COUNT];
        covered[0] = true; // wrist
        for finger in FingerName::ALL {
            for joint in hand.finger_joints(finger) {
                covered[joint.x as usize] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn observation_kind_matches_variant() {
        let quad = Quad::axis_aligned(Point::new(0.1, 0.1), 0.3, 0.3);
        let obs = RawObservation::Quadrilateral {
            quad,
            confidence: 0.9,
        };
        assert_eq!(obs.kind(), ObservationKind::Quad);
        assert!((obs.confidence() - 0.9).abs() < 1e-6);
        let c = obs.centroid();
        assert!((c.x - 0.25).abs() < 1e-6);
    }
}
