//! percept-kernel
//!
//! Real-time perception and event-tracking pipeline for camera-driven play:
//! frames in, typed gameplay events out.
//!
//! # Architecture
//!
//! One background worker processes frames for a session, strictly in arrival
//! order. Per frame: detectors run against the image under a time budget,
//! geometric observations pass a plausibility validator, the identity
//! tracker folds observations into long-lived tracked objects with
//! confirm/lose hysteresis, the classifier derives finger counts, gestures,
//! and grid-cell digits, and changed values fan out as events over bounded
//! per-subscriber channels. Slow consumers drop their own oldest events and
//! never stall detection.
//!
//! # Module Structure
//!
//! - `frame`: immutable camera frames
//! - `geometry`: points, quadrilaterals, and pure quad math
//! - `config`: session tuning surface and the daemon config loader
//! - `detect`: detector traits, registry with per-frame budget, synthetic detectors
//! - `validate`: stateless quadrilateral plausibility checks
//! - `track`: identity tracker (Candidate/Confirmed/Lost state machine)
//! - `classify`: finger/gesture/grid-cell features with change debouncing
//! - `publish`: bounded drop-oldest event fan-out
//! - `session`: lifecycle, throttling, and the frame worker
//! - `ingest`: synthetic frame source for demos and tests

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod classify;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod publish;
pub mod session;
pub mod track;
pub mod validate;

pub use config::SessionConfig;
pub use detect::{
    Chirality, Detector, FingerName, HandLandmarks, ObservationKind, RawObservation,
    TextCandidate, TextRecognizer,
};
pub use frame::Frame;
pub use geometry::{Point, Quad};
pub use publish::{EventBus, Subscription};
pub use session::{
    CaptureAuthorization, FrameSource, SessionController, SessionState, SessionStats, StaticGate,
};
pub use track::{IdentityTracker, TrackState, TrackedObject};
pub use validate::{validate_quad, QuadRejection, QuadValidatorConfig};

// -------------------- Identifiers --------------------

/// Stable opaque identity of a tracked object. Never reused within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedObjectId(u64);

impl TrackedObjectId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TrackedObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

/// Identity of a subscription, unique per event bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

// -------------------- Event Model --------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    HandDetected,
    HandLost,
    FingerCountChanged,
    GestureRecognized,
    GridDetected,
    GridLost,
    GridCellChanged,
}

impl EventType {
    /// Every event type, for subscribers that want the full stream.
    pub const ALL: [EventType; 7] = [
        EventType::HandDetected,
        EventType::HandLost,
        EventType::FingerCountChanged,
        EventType::GestureRecognized,
        EventType::GridDetected,
        EventType::GridLost,
        EventType::GridCellChanged,
    ];
}

/// Named gesture, recognized by exact raised-finger set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GestureTag {
    Fist,
    Point,
    Peace,
    ThumbsUp,
    OpenPalm,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    None,
    FingerCount { count: u8 },
    Gesture { gesture: GestureTag },
    GridCorners { corners: [Point; 4] },
    GridCell { row: u8, col: u8, value: Option<u8> },
}

/// Immutable pipeline output, emitted at most once per logical transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub object: TrackedObjectId,
    pub payload: EventPayload,
    /// Monotonic timestamp of the frame that produced the event.
    pub timestamp: Duration,
}

// -------------------- Lifecycle Errors --------------------

/// Errors surfaced by the session lifecycle. Transient per-frame detector
/// failures never reach this level; they are absorbed inside the worker.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("capture is not authorized")]
    NotAuthorized,
    #[error("frame source is unavailable")]
    SourceUnavailable,
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
    #[error("detector warm-up failed: {0}")]
    DetectorInit(String),
    #[error("session is busy ({0})")]
    Busy(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_to_json() {
        let event = Event {
            event_type: EventType::FingerCountChanged,
            object: TrackedObjectId::new(3),
            payload: EventPayload::FingerCount { count: 2 },
            timestamp: Duration::from_millis(99),
        };
        let json = serde_json::to_string(&event).expect("serialize event");
        assert!(json.contains("FingerCountChanged"));
        assert!(json.contains("\"count\":2"));
    }

    #[test]
    fn all_event_types_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for ty in EventType::ALL {
            assert!(seen.insert(ty));
        }
        assert_eq!(seen.len(), 7);
    }
}
