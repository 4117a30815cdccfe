//! Identity tracking with confirm/lose hysteresis.
//!
//! The tracker folds noisy per-frame observations into long-lived tracked
//! objects. Identity demands sustained evidence (K consecutive matches
//! before a Candidate is Confirmed) but tolerates occasional gaps once
//! granted (a Confirmed object survives unmatched frames for the loss grace
//! period). Candidates get no grace: one unmatched frame discards them.
//! Together the two thresholds remove single-frame flicker in both
//! directions without adding latency to confirmed objects.

use std::collections::VecDeque;
use std::time::Duration;

use crate::detect::{ObservationKind, RawObservation};
use crate::geometry::Point;
use crate::TrackedObjectId;

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Consecutive matched frames before a Candidate is Confirmed.
    pub confirmation_threshold: u32,
    /// How long a Confirmed object may go unmatched before it is Lost.
    pub loss_grace: Duration,
    /// How long a Lost object is kept for potential re-match before removal.
    pub removal_timeout: Duration,
    /// Maximum centroid distance (normalized units) for a match.
    pub match_distance: f32,
    /// Ring-buffer length of retained raw geometries per object.
    pub history_len: usize,
    /// Cap on simultaneously tracked hand objects.
    pub max_tracked_hands: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirmation_threshold: 3,
            loss_grace: Duration::from_millis(300),
            removal_timeout: Duration::from_secs(2),
            match_distance: 0.2,
            history_len: 8,
            max_tracked_hands: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    Candidate,
    Confirmed,
    Lost,
}

/// A persistent identity assembled from matching observations across frames.
#[derive(Clone, Debug)]
pub struct TrackedObject {
    id: TrackedObjectId,
    kind: ObservationKind,
    state: TrackState,
    last_matched_at: Duration,
    consecutive_matches: u32,
    /// Bounded ring buffer of recent raw geometries, newest last.
    history: VecDeque<RawObservation>,
}

impl TrackedObject {
    pub fn id(&self) -> TrackedObjectId {
        self.id
    }

    pub fn kind(&self) -> ObservationKind {
        self.kind
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn last_matched_at(&self) -> Duration {
        self.last_matched_at
    }

    pub fn consecutive_matches(&self) -> u32 {
        self.consecutive_matches
    }

    /// Most recent matched geometry.
    pub fn latest(&self) -> &RawObservation {
        self.history.back().expect("tracked object has history")
    }

    /// Recent geometries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &RawObservation> {
        self.history.iter()
    }

    fn centroid(&self) -> Point {
        self.latest().centroid()
    }

    fn push_history(&mut self, observation: RawObservation, history_len: usize) {
        while self.history.len() >= history_len.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(observation);
    }
}

/// State transition produced by one tracker update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Candidate reached the confirmation threshold, or a Lost object
    /// re-matched and was restored. Exactly one per transition.
    Detected(TrackedObjectId),
    /// Confirmed object exceeded the loss grace period.
    Lost(TrackedObjectId),
    /// Lost object aged out entirely; its identity is retired.
    Removed(TrackedObjectId),
}

pub struct IdentityTracker {
    cfg: TrackerConfig,
    objects: Vec<TrackedObject>,
    next_id: u64,
}

impl IdentityTracker {
    pub fn new(cfg: TrackerConfig) -> Self {
        Self {
            cfg,
            objects: Vec::new(),
            next_id: 0,
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter()
    }

    pub fn confirmed(&self, kind: ObservationKind) -> impl Iterator<Item = &TrackedObject> {
        self.objects
            .iter()
            .filter(move |o| o.kind == kind && o.state == TrackState::Confirmed)
    }

    pub fn object(&self, id: TrackedObjectId) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Fold one frame's observations of `kind` into the tracked set.
    /// Must be called once per processed frame per kind, even with no
    /// observations, so unmatched objects age correctly.
    pub fn update(
        &mut self,
        kind: ObservationKind,
        observations: Vec<RawObservation>,
        now: Duration,
    ) -> Vec<Transition> {
        let mut transitions = Vec::new();

        // Score every kind-eligible object against every observation, then
        // pair greedily, closest first, each side used at most once.
        let eligible: Vec<usize> = self
            .objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.kind == kind)
            .map(|(i, _)| i)
            .collect();

        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for &obj_idx in &eligible {
            let center = self.objects[obj_idx].centroid();
            for (obs_idx, obs) in observations.iter().enumerate() {
                let distance = center.distance(&obs.centroid());
                if distance <= self.cfg.match_distance {
                    pairs.push((obj_idx, obs_idx, distance));
                }
            }
        }
        pairs.sort_by(|a, b| a.2.total_cmp(&b.2));

        let mut object_matched = vec![false; self.objects.len()];
        let mut observation_used = vec![false; observations.len()];
        let mut assignments: Vec<(usize, usize)> = Vec::new();
        for (obj_idx, obs_idx, _) in pairs {
            if object_matched[obj_idx] || observation_used[obs_idx] {
                continue;
            }
            object_matched[obj_idx] = true;
            observation_used[obs_idx] = true;
            assignments.push((obj_idx, obs_idx));
        }

        // Matched objects: refresh history and advance the state machine.
        let mut observations: Vec<Option<RawObservation>> =
            observations.into_iter().map(Some).collect();
        for (obj_idx, obs_idx) in assignments {
            let observation = observations[obs_idx].take().expect("observation used once");
            let history_len = self.cfg.history_len;
            let threshold = self.cfg.confirmation_threshold;
            let object = &mut self.objects[obj_idx];
            object.push_history(observation, history_len);
            object.last_matched_at = now;
            object.consecutive_matches = object.consecutive_matches.saturating_add(1);
            match object.state {
                TrackState::Candidate => {
                    if object.consecutive_matches >= threshold {
                        object.state = TrackState::Confirmed;
                        transitions.push(Transition::Detected(object.id));
                    }
                }
                TrackState::Lost => {
                    // Re-match before removal restores the original identity.
                    object.state = TrackState::Confirmed;
                    transitions.push(Transition::Detected(object.id));
                }
                TrackState::Confirmed => {}
            }
        }

        // Unmatched objects: candidates die immediately, confirmed objects
        // get the grace period, lost objects age toward removal.
        let mut removed: Vec<TrackedObjectId> = Vec::new();
        for (idx, object) in self.objects.iter_mut().enumerate() {
            if object.kind != kind || object_matched[idx] {
                continue;
            }
            object.consecutive_matches = 0;
            let unmatched_for = now.saturating_sub(object.last_matched_at);
            match object.state {
                TrackState::Candidate => removed.push(object.id),
                TrackState::Confirmed => {
                    if unmatched_for > self.cfg.loss_grace {
                        object.state = TrackState::Lost;
                        transitions.push(Transition::Lost(object.id));
                    }
                }
                TrackState::Lost => {
                    if unmatched_for > self.cfg.loss_grace + self.cfg.removal_timeout {
                        removed.push(object.id);
                        transitions.push(Transition::Removed(object.id));
                    }
                }
            }
        }
        self.objects.retain(|o| !removed.contains(&o.id));

        // Leftover observations become new candidates.
        for observation in observations.into_iter().flatten() {
            if kind == ObservationKind::Hand
                && self
                    .objects
                    .iter()
                    .filter(|o| o.kind == ObservationKind::Hand)
                    .count()
                    >= self.cfg.max_tracked_hands
            {
                continue;
            }
            let id = TrackedObjectId::new(self.next_id);
            self.next_id += 1;
            let mut object = TrackedObject {
                id,
                kind,
                state: TrackState::Candidate,
                last_matched_at: now,
                consecutive_matches: 1,
                history: VecDeque::new(),
            };
            object.push_history(observation, self.cfg.history_len);
            if self.cfg.confirmation_threshold <= 1 {
                object.state = TrackState::Confirmed;
                transitions.push(Transition::Detected(id));
            }
            self.objects.push(object);
        }

        transitions
    }

    /// Drop every tracked object, returning the (id, kind) of each object
    /// that was Confirmed so the caller can emit its lost event. Used at
    /// session stop.
    pub fn drain(&mut self) -> Vec<(TrackedObjectId, ObservationKind)> {
        let confirmed = self
            .objects
            .iter()
            .filter(|o| o.state == TrackState::Confirmed)
            .map(|o| (o.id, o.kind))
            .collect();
        self.objects.clear();
        confirmed
    }
}
