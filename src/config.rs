//! Session configuration.
//!
//! `SessionConfig` is the per-`start` tuning surface. Every field has a
//! default; invalid combinations are rejected by `validate()` before any
//! processing begins. `PerceptdConfig` is the daemon-side loader: a JSON
//! config file named by `PERCEPT_CONFIG`, with environment overrides.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::detect::ObservationKind;
use crate::track::TrackerConfig;
use crate::validate::QuadValidatorConfig;

const DEFAULT_PROCESSING_INTERVAL_MS: u64 = 33;
const DEFAULT_CONFIRMATION_THRESHOLD: u32 = 3;
const DEFAULT_LOSS_GRACE_MS: u64 = 300;
const DEFAULT_REMOVAL_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_DETECTOR_BUDGET_MS: u64 = 50;
const DEFAULT_GRID_SIZE: usize = 3;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Detector kinds to run this session.
    pub enabled_detectors: HashSet<ObservationKind>,
    pub max_tracked_hands: usize,
    /// Minimum interval between processed frames; faster arrivals are
    /// skipped. Zero disables throttling.
    pub processing_interval: Duration,
    /// Consecutive matches before a candidate is confirmed (K).
    pub confirmation_threshold: u32,
    /// Unmatched time a confirmed object survives before it is lost (T).
    pub loss_grace: Duration,
    /// Additional unmatched time before a lost object is removed.
    pub removal_timeout: Duration,
    /// Maximum centroid distance for cross-frame matching.
    pub match_distance: f32,
    /// Geometry ring-buffer length per tracked object.
    pub geometry_history: usize,
    /// Finger-count majority-vote window per object; 1 disables smoothing.
    pub smoothing_window: usize,
    /// Grid subdivision (N x N).
    pub grid_size: usize,
    /// Minimum recognition confidence for a grid-cell digit.
    pub min_cell_confidence: f32,
    pub quad: QuadValidatorConfig,
    /// Per-frame time budget shared by the detector pass.
    pub detector_budget: Duration,
    /// Per-subscriber delivery queue capacity.
    pub channel_capacity: usize,
    /// Frame admission queue depth between producer and worker.
    pub admission_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled_detectors: [
                ObservationKind::Hand,
                ObservationKind::Quad,
                ObservationKind::Text,
            ]
            .into_iter()
            .collect(),
            max_tracked_hands: 2,
            processing_interval: Duration::from_millis(DEFAULT_PROCESSING_INTERVAL_MS),
            confirmation_threshold: DEFAULT_CONFIRMATION_THRESHOLD,
            loss_grace: Duration::from_millis(DEFAULT_LOSS_GRACE_MS),
            removal_timeout: Duration::from_millis(DEFAULT_REMOVAL_TIMEOUT_MS),
            match_distance: 0.2,
            geometry_history: 8,
            smoothing_window: 3,
            grid_size: DEFAULT_GRID_SIZE,
            min_cell_confidence: 0.5,
            quad: QuadValidatorConfig::default(),
            detector_budget: Duration::from_millis(DEFAULT_DETECTOR_BUDGET_MS),
            channel_capacity: 64,
            admission_depth: 4,
        }
    }
}

impl SessionConfig {
    /// Reject invalid tunings before any processing begins.
    pub fn validate(&self) -> Result<()> {
        if self.enabled_detectors.is_empty() {
            return Err(anyhow!("at least one detector kind must be enabled"));
        }
        if self.confirmation_threshold == 0 {
            return Err(anyhow!("confirmation threshold must be at least 1"));
        }
        if self.loss_grace.is_zero() {
            return Err(anyhow!("loss grace period must be greater than zero"));
        }
        if self.removal_timeout.is_zero() {
            return Err(anyhow!("removal timeout must be greater than zero"));
        }
        if !(self.match_distance > 0.0) {
            return Err(anyhow!("match distance must be positive"));
        }
        if self.geometry_history == 0 {
            return Err(anyhow!("geometry history must hold at least one entry"));
        }
        if self.smoothing_window == 0 {
            return Err(anyhow!("smoothing window must be at least 1 (1 = raw counts)"));
        }
        if self.grid_size == 0 || self.grid_size > 16 {
            return Err(anyhow!("grid size must be between 1 and 16"));
        }
        if self.max_tracked_hands == 0 {
            return Err(anyhow!("max tracked hands must be at least 1"));
        }
        if self.detector_budget.is_zero() {
            return Err(anyhow!("detector budget must be greater than zero"));
        }
        if self.channel_capacity == 0 || self.admission_depth == 0 {
            return Err(anyhow!("queue capacities must be at least 1"));
        }
        Ok(())
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            confirmation_threshold: self.confirmation_threshold,
            loss_grace: self.loss_grace,
            removal_timeout: self.removal_timeout,
            match_distance: self.match_distance,
            history_len: self.geometry_history,
            max_tracked_hands: self.max_tracked_hands,
        }
    }
}

// ----------------------------------------------------------------------------
// Daemon configuration (file + env)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct PerceptdConfigFile {
    session: Option<SessionConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    processing_interval_ms: Option<u64>,
    confirmation_threshold: Option<u32>,
    loss_grace_ms: Option<u64>,
    removal_timeout_ms: Option<u64>,
    max_tracked_hands: Option<usize>,
    smoothing_window: Option<usize>,
    grid_size: Option<usize>,
    quad: Option<QuadValidatorConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct PerceptdConfig {
    pub session: SessionConfig,
    pub source_width: u32,
    pub source_height: u32,
    pub source_fps: u32,
}

impl PerceptdConfig {
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("PERCEPT_CONFIG").ok().as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => PerceptdConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.session.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PerceptdConfigFile) -> Self {
        let mut session = SessionConfig::default();
        if let Some(s) = file.session {
            if let Some(ms) = s.processing_interval_ms {
                session.processing_interval = Duration::from_millis(ms);
            }
            if let Some(k) = s.confirmation_threshold {
                session.confirmation_threshold = k;
            }
            if let Some(ms) = s.loss_grace_ms {
                session.loss_grace = Duration::from_millis(ms);
            }
            if let Some(ms) = s.removal_timeout_ms {
                session.removal_timeout = Duration::from_millis(ms);
            }
            if let Some(n) = s.max_tracked_hands {
                session.max_tracked_hands = n;
            }
            if let Some(n) = s.smoothing_window {
                session.smoothing_window = n;
            }
            if let Some(n) = s.grid_size {
                session.grid_size = n;
            }
            if let Some(quad) = s.quad {
                session.quad = quad;
            }
        }
        let source = file.source.unwrap_or_default();
        Self {
            session,
            source_width: source.width.unwrap_or(640),
            source_height: source.height.unwrap_or(480),
            source_fps: source.fps.unwrap_or(30),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("PERCEPT_PROCESSING_INTERVAL_MS") {
            let ms: u64 = value
                .parse()
                .map_err(|_| anyhow!("PERCEPT_PROCESSING_INTERVAL_MS must be an integer"))?;
            self.session.processing_interval = Duration::from_millis(ms);
        }
        if let Ok(value) = std::env::var("PERCEPT_CONFIRMATION_THRESHOLD") {
            self.session.confirmation_threshold = value
                .parse()
                .map_err(|_| anyhow!("PERCEPT_CONFIRMATION_THRESHOLD must be an integer"))?;
        }
        if let Ok(value) = std::env::var("PERCEPT_LOSS_GRACE_MS") {
            let ms: u64 = value
                .parse()
                .map_err(|_| anyhow!("PERCEPT_LOSS_GRACE_MS must be an integer"))?;
            self.session.loss_grace = Duration::from_millis(ms);
        }
        if let Ok(value) = std::env::var("PERCEPT_MAX_TRACKED_HANDS") {
            self.session.max_tracked_hands = value
                .parse()
                .map_err(|_| anyhow!("PERCEPT_MAX_TRACKED_HANDS must be an integer"))?;
        }
        if let Ok(value) = std::env::var("PERCEPT_SOURCE_FPS") {
            self.source_fps = value
                .parse()
                .map_err(|_| anyhow!("PERCEPT_SOURCE_FPS must be an integer"))?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PerceptdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
