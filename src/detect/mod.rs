//! Detector boundary: per-frame, stateless-in-spirit observation producers.

mod detector;
mod observation;
mod registry;
pub mod synthetic;

pub use detector::{Detector, TextCandidate, TextRecognizer};
pub use observation::{
    Chirality, FingerName, HandLandmarks, ObservationKind, RawObservation, LANDMARK_COUNT,
};
pub use registry::{DetectorRegistry, FrameObservations};
