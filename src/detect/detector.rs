//! Detector traits.
//!
//! A `Detector` turns one frame into zero or more raw observations of a
//! single kind. Detectors hold no cross-frame tracking state; identity is
//! assigned downstream by the tracker.

use anyhow::Result;

use crate::frame::Frame;
use crate::geometry::Quad;

use super::observation::{ObservationKind, RawObservation};

/// Per-frame detector.
///
/// Implementations must treat the frame's pixel slice as read-only and
/// ephemeral, and should return an error (rather than block) when a frame
/// cannot be processed. A failed or slow frame simply contributes no
/// observations; the tracker's grace period absorbs the gap.
pub trait Detector: Send {
    /// Detector identifier for logs.
    fn name(&self) -> &'static str;

    /// The observation kind this detector produces.
    fn kind(&self) -> ObservationKind;

    /// Run detection on one frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawObservation>>;

    /// Optional warm-up hook, called once at session start.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A digit/text reading from one region.
#[derive(Clone, Debug, PartialEq)]
pub struct TextCandidate {
    pub text: String,
    pub confidence: f32,
}

/// Region-scoped text recognition, used by the grid classifier to read one
/// cell at a time. Kept separate from `Detector` so the classifier can call
/// it directly without a classifier-to-pipeline back-reference.
pub trait TextRecognizer: Send {
    /// Recognize text inside `region` of `frame`. `Ok(None)` means the
    /// region is empty or unreadable.
    fn recognize(&mut self, frame: &Frame, region: &Quad) -> Result<Option<TextCandidate>>;
}
