//! Session lifecycle and the frame worker.
//!
//! A session is started against an authorization gate and a frame source,
//! runs one background worker that processes frames strictly in arrival
//! order, and stops by draining the tracker and closing every subscriber
//! channel. `deliver_frame` is the ingestion edge: it never blocks, and a
//! frame that arrives while the admission queue is full is skipped, not
//! queued.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;

use crate::classify::{self, FeatureDebouncer};
use crate::config::SessionConfig;
use crate::detect::{DetectorRegistry, ObservationKind, RawObservation, TextRecognizer};
use crate::frame::Frame;
use crate::publish::EventBus;
use crate::track::{IdentityTracker, Transition};
use crate::validate::validate_quad;
use crate::{Event, EventPayload, EventType, SessionError, TrackedObjectId};

// ----------------------------------------------------------------------------
// Capture gate and frame source
// ----------------------------------------------------------------------------

/// Permission gate consulted once per `start`. Denial is a hard error, never
/// a silent no-op session.
pub trait CaptureAuthorization: Send + Sync {
    fn capture_allowed(&self) -> bool;
}

/// Fixed-answer gate for embedding hosts that resolve permission upstream.
pub struct StaticGate(bool);

impl StaticGate {
    pub fn allowed() -> Self {
        Self(true)
    }

    pub fn denied() -> Self {
        Self(false)
    }
}

impl CaptureAuthorization for StaticGate {
    fn capture_allowed(&self) -> bool {
        self.0
    }
}

/// A producer of camera frames. Availability is checked at session start;
/// frame delivery itself goes through `SessionController::deliver_frame`.
pub trait FrameSource: Send {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn next_frame(&mut self) -> Result<Frame>;
}

// ----------------------------------------------------------------------------
// Session state and stats
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Monotonic counters shared between the ingestion edge, the worker, and
/// diagnostics readers.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_received: AtomicU64,
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    events_published: AtomicU64,
}

impl SessionStats {
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

struct Worker {
    handle: JoinHandle<(DetectorRegistry, Box<dyn TextRecognizer>)>,
    sender: SyncSender<Frame>,
    shutdown: Arc<AtomicBool>,
}

/// Owns the pipeline components across sessions and the worker thread of the
/// active one. Detectors and the text recognizer are moved into the worker
/// at start and handed back at stop, so a controller can be restarted.
pub struct SessionController {
    authorization: Arc<dyn CaptureAuthorization>,
    source: Arc<Mutex<dyn FrameSource>>,
    registry: Option<DetectorRegistry>,
    recognizer: Option<Box<dyn TextRecognizer>>,
    bus: Arc<EventBus>,
    stats: Arc<SessionStats>,
    state: Mutex<SessionState>,
    worker: Mutex<Option<Worker>>,
}

impl SessionController {
    pub fn new(
        authorization: Arc<dyn CaptureAuthorization>,
        source: Arc<Mutex<dyn FrameSource>>,
        registry: DetectorRegistry,
        recognizer: Box<dyn TextRecognizer>,
        channel_capacity: usize,
    ) -> Self {
        Self {
            authorization,
            source,
            registry: Some(registry),
            recognizer: Some(recognizer),
            bus: Arc::new(EventBus::new(channel_capacity)),
            stats: Arc::new(SessionStats::default()),
            state: Mutex::new(SessionState::Idle),
            worker: Mutex::new(None),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Idle)
    }

    /// Start a session. Returns without side effects on a failed
    /// precondition; calling start on an already running session is a no-op.
    pub fn start(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| SessionError::Busy("state lock poisoned"))?;
            match *state {
                SessionState::Running => return Ok(()),
                SessionState::Starting => return Err(SessionError::Busy("starting")),
                SessionState::Stopping => return Err(SessionError::Busy("stopping")),
                SessionState::Idle => *state = SessionState::Starting,
            }
        }

        let result = self.spin_up(config);
        if let Ok(mut state) = self.state.lock() {
            *state = if result.is_ok() {
                SessionState::Running
            } else {
                SessionState::Idle
            };
        }
        result
    }

    fn spin_up(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        config
            .validate()
            .map_err(|e| SessionError::InvalidConfig(e.to_string()))?;
        if !self.authorization.capture_allowed() {
            return Err(SessionError::NotAuthorized);
        }
        {
            let source = self
                .source
                .lock()
                .map_err(|_| SessionError::SourceUnavailable)?;
            if !source.is_available() {
                return Err(SessionError::SourceUnavailable);
            }
            log::info!("starting session against source {}", source.name());
        }

        let mut registry = self
            .registry
            .take()
            .ok_or(SessionError::Busy("detectors already in use"))?;
        let recognizer = match self.recognizer.take() {
            Some(r) => r,
            None => {
                self.registry = Some(registry);
                return Err(SessionError::Busy("recognizer already in use"));
            }
        };

        if let Err(err) = registry.warm_up(&config.enabled_detectors) {
            self.registry = Some(registry);
            self.recognizer = Some(recognizer);
            return Err(SessionError::DetectorInit(format!("{err:#}")));
        }

        let (sender, receiver) = mpsc::sync_channel::<Frame>(config.admission_depth);
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let bus = self.bus.clone();
            let stats = self.stats.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || {
                let mut pipeline = Pipeline::new(config, registry, recognizer, bus, stats);
                loop {
                    match receiver.recv_timeout(Duration::from_millis(50)) {
                        Ok(frame) => pipeline.process(frame),
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            if shutdown.load(Ordering::SeqCst) {
                                break;
                            }
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                }
                pipeline.finish()
            })
        };

        if let Ok(mut worker) = self.worker.lock() {
            *worker = Some(Worker {
                handle,
                sender,
                shutdown,
            });
        }
        Ok(())
    }

    /// Hand one frame to the worker. Returns `false` when the frame was
    /// skipped: no session running, or the admission queue is full. Never
    /// blocks.
    pub fn deliver_frame(&self, frame: Frame) -> bool {
        let worker = match self.worker.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        let Some(worker) = worker.as_ref() else {
            return false;
        };
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
        match worker.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.frames_skipped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Stop the session: join the worker, emit a lost event for every still
    /// confirmed object, close all subscriber channels. Idempotent.
    pub fn stop(&mut self) {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(worker) = worker else {
            return;
        };
        if let Ok(mut state) = self.state.lock() {
            *state = SessionState::Stopping;
        }
        worker.shutdown.store(true, Ordering::SeqCst);
        drop(worker.sender);
        match worker.handle.join() {
            Ok((registry, recognizer)) => {
                self.registry = Some(registry);
                self.recognizer = Some(recognizer);
            }
            Err(_) => log::error!("frame worker panicked; controller cannot be restarted"),
        }
        if let Ok(mut state) = self.state.lock() {
            *state = SessionState::Idle;
        }
        log::info!(
            "session stopped: {} received, {} processed, {} skipped, {} events",
            self.stats.frames_received(),
            self.stats.frames_processed(),
            self.stats.frames_skipped(),
            self.stats.events_published()
        );
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Frame pipeline (worker-owned)
// ----------------------------------------------------------------------------

struct Pipeline {
    cfg: SessionConfig,
    registry: DetectorRegistry,
    recognizer: Box<dyn TextRecognizer>,
    tracker: IdentityTracker,
    debouncer: FeatureDebouncer,
    bus: Arc<EventBus>,
    stats: Arc<SessionStats>,
    enabled: HashSet<ObservationKind>,
    last_processed: Option<Duration>,
}

impl Pipeline {
    fn new(
        cfg: SessionConfig,
        registry: DetectorRegistry,
        recognizer: Box<dyn TextRecognizer>,
        bus: Arc<EventBus>,
        stats: Arc<SessionStats>,
    ) -> Self {
        let tracker = IdentityTracker::new(cfg.tracker_config());
        let debouncer = FeatureDebouncer::new(cfg.smoothing_window);
        let enabled = cfg.enabled_detectors.clone();
        Self {
            cfg,
            registry,
            recognizer,
            tracker,
            debouncer,
            bus,
            stats,
            enabled,
            last_processed: None,
        }
    }

    fn process(&mut self, frame: Frame) {
        // Throttle on frame timestamps, not wall clock, so replayed streams
        // behave the same as live ones.
        if let Some(last) = self.last_processed {
            if frame.timestamp.saturating_sub(last) < self.cfg.processing_interval {
                self.stats.frames_skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.last_processed = Some(frame.timestamp);

        let now = frame.timestamp;
        let frame = Arc::new(frame);
        let observations = self
            .registry
            .run_frame(&frame, &self.enabled, self.cfg.detector_budget);

        let quads: Vec<RawObservation> = observations
            .quads
            .into_iter()
            .filter(|obs| match obs {
                RawObservation::Quadrilateral { quad, confidence } => {
                    match validate_quad(&self.cfg.quad, quad, *confidence) {
                        Ok(()) => true,
                        Err(rejection) => {
                            log::debug!("quad rejected: {rejection}");
                            false
                        }
                    }
                }
                _ => false,
            })
            .collect();

        let mut events = Vec::new();
        let hand_transitions = self.tracker.update(ObservationKind::Hand, observations.hands, now);
        self.transition_events(hand_transitions, now, &mut events);
        let quad_transitions = self.tracker.update(ObservationKind::Quad, quads, now);
        self.transition_events(quad_transitions, now, &mut events);

        self.classify_hands(now, &mut events);
        self.classify_grids(&frame, now, &mut events);

        for event in &events {
            self.bus.publish(event);
        }
        self.stats
            .events_published
            .fetch_add(events.len() as u64, Ordering::Relaxed);
        self.stats.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn transition_events(
        &mut self,
        transitions: Vec<Transition>,
        now: Duration,
        events: &mut Vec<Event>,
    ) {
        for transition in transitions {
            match transition {
                Transition::Detected(id) => {
                    let Some(object) = self.tracker.object(id) else {
                        continue;
                    };
                    let (event_type, payload) = match object.kind() {
                        ObservationKind::Hand => (EventType::HandDetected, EventPayload::None),
                        ObservationKind::Quad => {
                            let payload = match object.latest() {
                                RawObservation::Quadrilateral { quad, .. } => {
                                    EventPayload::GridCorners {
                                        corners: quad.corners,
                                    }
                                }
                                _ => EventPayload::None,
                            };
                            (EventType::GridDetected, payload)
                        }
                        ObservationKind::Text => continue,
                    };
                    events.push(Event {
                        event_type,
                        object: id,
                        payload,
                        timestamp: now,
                    });
                }
                Transition::Lost(id) => {
                    let Some(object) = self.tracker.object(id) else {
                        continue;
                    };
                    let event_type = match object.kind() {
                        ObservationKind::Hand => EventType::HandLost,
                        ObservationKind::Quad => EventType::GridLost,
                        ObservationKind::Text => continue,
                    };
                    events.push(Event {
                        event_type,
                        object: id,
                        payload: EventPayload::None,
                        timestamp: now,
                    });
                }
                Transition::Removed(id) => {
                    self.debouncer.forget(id);
                }
            }
        }
    }

    fn classify_hands(&mut self, now: Duration, events: &mut Vec<Event>) {
        let hands: Vec<(TrackedObjectId, [bool; 5])> = self
            .tracker
            .confirmed(ObservationKind::Hand)
            .filter_map(|object| match object.latest() {
                RawObservation::HandPose { landmarks, .. } => {
                    Some((object.id(), classify::extended_fingers(landmarks)))
                }
                _ => None,
            })
            .collect();
        for (id, extended) in hands {
            let raw_count = extended.iter().filter(|&&f| f).count() as u8;
            if let Some(count) = self.debouncer.update_finger_count(id, raw_count) {
                events.push(Event {
                    event_type: EventType::FingerCountChanged,
                    object: id,
                    payload: EventPayload::FingerCount { count },
                    timestamp: now,
                });
            }
            let gesture = classify::recognize_gesture(&extended);
            if let Some(gesture) = self.debouncer.update_gesture(id, gesture) {
                events.push(Event {
                    event_type: EventType::GestureRecognized,
                    object: id,
                    payload: EventPayload::Gesture { gesture },
                    timestamp: now,
                });
            }
        }
    }

    fn classify_grids(&mut self, frame: &Frame, now: Duration, events: &mut Vec<Event>) {
        if !self.enabled.contains(&ObservationKind::Text) {
            return;
        }
        let grids: Vec<(TrackedObjectId, crate::geometry::Quad)> = self
            .tracker
            .confirmed(ObservationKind::Quad)
            .filter_map(|object| match object.latest() {
                RawObservation::Quadrilateral { quad, .. } => Some((object.id(), *quad)),
                _ => None,
            })
            .collect();
        for (id, quad) in grids {
            let cells = classify::read_cells(
                frame,
                &quad,
                self.cfg.grid_size,
                self.recognizer.as_mut(),
                self.cfg.min_cell_confidence,
            );
            for (row, col, value) in self.debouncer.update_cells(id, cells) {
                events.push(Event {
                    event_type: EventType::GridCellChanged,
                    object: id,
                    payload: EventPayload::GridCell { row, col, value },
                    timestamp: now,
                });
            }
        }
    }

    /// Teardown: every still-confirmed object gets its lost event, then the
    /// bus closes so subscribers observe end-of-stream.
    fn finish(mut self) -> (DetectorRegistry, Box<dyn TextRecognizer>) {
        let timestamp = self.last_processed.unwrap_or(Duration::ZERO);
        let mut published = 0u64;
        for (id, kind) in self.tracker.drain() {
            let event_type = match kind {
                ObservationKind::Hand => EventType::HandLost,
                ObservationKind::Quad => EventType::GridLost,
                ObservationKind::Text => continue,
            };
            self.bus.publish(&Event {
                event_type,
                object: id,
                payload: EventPayload::None,
                timestamp,
            });
            published += 1;
        }
        self.stats
            .events_published
            .fetch_add(published, Ordering::Relaxed);
        self.bus.close_all();
        (self.registry, self.recognizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::synthetic::SyntheticTextRecognizer;
    use crate::ingest::SyntheticSource;

    fn controller(gate: StaticGate, available: bool) -> SessionController {
        let source = SyntheticSource::new(32, 32, 30).with_availability(available);
        SessionController::new(
            Arc::new(gate),
            Arc::new(Mutex::new(source)),
            DetectorRegistry::new(),
            Box::new(SyntheticTextRecognizer::new()),
            8,
        )
    }

    #[test]
    fn denied_gate_blocks_start() {
        let mut c = controller(StaticGate::denied(), true);
        let err = c.start(SessionConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::NotAuthorized));
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn unavailable_source_blocks_start() {
        let mut c = controller(StaticGate::allowed(), false);
        let err = c.start(SessionConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::SourceUnavailable));
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn invalid_config_blocks_start() {
        let mut c = controller(StaticGate::allowed(), true);
        let mut cfg = SessionConfig::default();
        cfg.confirmation_threshold = 0;
        let err = c.start(cfg).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let mut c = controller(StaticGate::allowed(), true);
        c.start(SessionConfig::default()).expect("first start");
        c.start(SessionConfig::default()).expect("second start is a no-op");
        assert_eq!(c.state(), SessionState::Running);
        c.stop();
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn deliver_without_session_is_skipped() {
        let c = controller(StaticGate::allowed(), true);
        let frame = Frame::new(vec![0; 4], 2, 2, 0, Duration::ZERO);
        assert!(!c.deliver_frame(frame));
    }

    #[test]
    fn stop_is_idempotent_and_allows_restart() {
        let mut c = controller(StaticGate::allowed(), true);
        c.start(SessionConfig::default()).expect("start");
        c.stop();
        c.stop();
        c.start(SessionConfig::default()).expect("restart");
        c.stop();
    }
}
