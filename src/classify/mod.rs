//! Feature classification and emission debouncing.
//!
//! Features are recomputed every frame from a confirmed object's geometry,
//! but an event fires only when the newly computed value differs from the
//! last value emitted for that object. This is a second debouncing layer on
//! top of the tracker's hysteresis: the tracker stops identity flicker, the
//! debouncer stops event storms from per-frame micro-variation.

pub mod grid;
pub mod hand;

use std::collections::HashMap;

use crate::{GestureTag, TrackedObjectId};

use grid::GridCells;
use hand::FingerSmoother;

pub use grid::read_cells;
pub use hand::{
    extended_fingers, finger_count, finger_extended, recognize_gesture,
    STRAIGHTNESS_THRESHOLD_DEG,
};

/// Per-object feature state: smoothing windows plus the last emitted value
/// of every feature. Owned by the pipeline, not the classifier, so emission
/// decisions stay downstream of feature computation.
pub struct FeatureDebouncer {
    smoothing_window: usize,
    smoothers: HashMap<TrackedObjectId, FingerSmoother>,
    last_counts: HashMap<TrackedObjectId, u8>,
    last_gestures: HashMap<TrackedObjectId, GestureTag>,
    last_cells: HashMap<TrackedObjectId, GridCells>,
}

impl FeatureDebouncer {
    pub fn new(smoothing_window: usize) -> Self {
        Self {
            smoothing_window,
            smoothers: HashMap::new(),
            last_counts: HashMap::new(),
            last_gestures: HashMap::new(),
            last_cells: HashMap::new(),
        }
    }

    /// Smooth a raw per-frame finger count through the object's window and
    /// return the count to emit, if it changed.
    pub fn update_finger_count(&mut self, id: TrackedObjectId, raw: u8) -> Option<u8> {
        let window = self.smoothing_window;
        let smoothed = self
            .smoothers
            .entry(id)
            .or_insert_with(|| FingerSmoother::new(window))
            .push(raw);
        if self.last_counts.get(&id) == Some(&smoothed) {
            return None;
        }
        self.last_counts.insert(id, smoothed);
        Some(smoothed)
    }

    /// Return the gesture to emit, if the object settled on a new named one.
    pub fn update_gesture(
        &mut self,
        id: TrackedObjectId,
        gesture: Option<GestureTag>,
    ) -> Option<GestureTag> {
        let gesture = gesture?;
        if self.last_gestures.get(&id) == Some(&gesture) {
            return None;
        }
        self.last_gestures.insert(id, gesture);
        Some(gesture)
    }

    /// Return the cell changes to emit. The first read of an object reports
    /// its non-empty cells; later reads report any difference.
    pub fn update_cells(
        &mut self,
        id: TrackedObjectId,
        cells: GridCells,
    ) -> Vec<(u8, u8, Option<u8>)> {
        let changes = match self.last_cells.get(&id) {
            Some(previous) => cells.diff(previous),
            None => cells.diff(&GridCells::empty(cells.size)),
        };
        self.last_cells.insert(id, cells);
        changes
    }

    /// Forget all state for a removed object.
    pub fn forget(&mut self, id: TrackedObjectId) {
        self.smoothers.remove(&id);
        self.last_counts.remove(&id);
        self.last_gestures.remove(&id);
        self.last_cells.remove(&id);
    }
}
