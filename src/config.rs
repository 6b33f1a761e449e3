//! Engine Configuration
//!
//! Every tunable of the synchronization engine in one serializable struct.
//! Missing JSON fields fall back to their defaults.

use crate::clock::{
    TickIntervals, DEFAULT_BOUNDARY_CHECK_INTERVAL_MS, DEFAULT_SEEK_PLAYBACK_INTERVAL_MS,
    DEFAULT_SYNC_INTERVAL_MS,
};
use crate::rate_ladder::{RateLadder, DEFAULT_RATES};
use crate::{PlaysyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default drift tolerance in milliseconds
pub const DEFAULT_DRIFT_THRESHOLD_MS: f64 = 50.0;

/// Default rate magnitude above which playback becomes seek-driven
pub const DEFAULT_FAKE_PLAYBACK_CUTOFF: f32 = 4.0;

/// Synchronization engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of the drift-correction sync tick
    pub sync_interval_ms: u64,
    /// Period of the region boundary tick
    pub boundary_check_interval_ms: u64,
    /// Period of the tick that drives seek-driven playback
    pub seek_playback_interval_ms: u64,
    /// Drift tolerated before a stream is set to the clock
    pub drift_threshold_ms: f64,
    /// Multiply the threshold by `|rate|` when shuttling faster than 1x
    pub scale_threshold_with_rate: bool,
    /// `|rate|` above which streams are driven by seeks
    pub fake_playback_cutoff: f32,
    /// Drive every reverse rate by seeks, for backends without native reverse
    pub seek_driven_reverse: bool,
    /// Shuttle ladder
    pub rate_ladder: Vec<f32>,
    /// Jog step when no frame rate is known; `None` makes such jogs a no-op
    pub jog_fallback_step_ms: Option<i64>,
    /// Frames per coarse jog
    pub coarse_jog_frames: u32,
    /// Frames per extra-coarse jog
    pub extra_coarse_jog_frames: u32,
}

impl SyncConfig {
    /// Tight synchronization for backends that seek cheaply.
    /// Sync every 500 ms, one frame (33 ms) of tolerated drift.
    pub fn responsive() -> Self {
        SyncConfig {
            sync_interval_ms: 500,
            drift_threshold_ms: 33.0,
            ..Self::default()
        }
    }

    /// Loose synchronization for backends whose seeks are slow or imprecise.
    /// Sync every 1.5 s, 1.5 s of tolerated drift.
    pub fn lenient() -> Self {
        SyncConfig {
            sync_interval_ms: 1500,
            drift_threshold_ms: 1500.0,
            ..Self::default()
        }
    }

    /// Check every field for a usable value
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_ms == 0 {
            return Err(PlaysyncError::ConfigError("sync_interval_ms must be > 0".into()));
        }
        if self.boundary_check_interval_ms == 0 {
            return Err(PlaysyncError::ConfigError(
                "boundary_check_interval_ms must be > 0".into(),
            ));
        }
        if self.seek_playback_interval_ms == 0 {
            return Err(PlaysyncError::ConfigError(
                "seek_playback_interval_ms must be > 0".into(),
            ));
        }
        if !self.drift_threshold_ms.is_finite() || self.drift_threshold_ms < 0.0 {
            return Err(PlaysyncError::ConfigError(format!(
                "drift_threshold_ms must be a non-negative number, got {}",
                self.drift_threshold_ms
            )));
        }
        if !self.fake_playback_cutoff.is_finite() || self.fake_playback_cutoff <= 0.0 {
            return Err(PlaysyncError::ConfigError(format!(
                "fake_playback_cutoff must be > 0, got {}",
                self.fake_playback_cutoff
            )));
        }
        if self.rate_ladder.is_empty() {
            return Err(PlaysyncError::ConfigError("rate_ladder is empty".into()));
        }
        if let Some(bad) = self.rate_ladder.iter().find(|r| !r.is_finite()) {
            return Err(PlaysyncError::ConfigError(format!(
                "rate_ladder contains non-finite rate {}",
                bad
            )));
        }
        if !self.rate_ladder.iter().any(|r| *r == 0.0) {
            return Err(PlaysyncError::ConfigError("rate_ladder must contain 0".into()));
        }
        if let Some(step) = self.jog_fallback_step_ms {
            if step <= 0 {
                return Err(PlaysyncError::ConfigError(format!(
                    "jog_fallback_step_ms must be > 0, got {}",
                    step
                )));
            }
        }
        if self.coarse_jog_frames == 0 || self.extra_coarse_jog_frames == 0 {
            return Err(PlaysyncError::ConfigError("jog frame multipliers must be > 0".into()));
        }
        Ok(())
    }

    /// Build the shuttle ladder
    pub fn ladder(&self) -> Result<RateLadder> {
        RateLadder::new(&self.rate_ladder)
            .ok_or_else(|| PlaysyncError::ConfigError("rate_ladder has no finite rates".into()))
    }

    /// Ticker periods
    pub fn tick_intervals(&self) -> TickIntervals {
        TickIntervals {
            sync: Duration::from_millis(self.sync_interval_ms),
            boundary_check: Some(Duration::from_millis(self.boundary_check_interval_ms)),
            seek_playback: Some(Duration::from_millis(self.seek_playback_interval_ms)),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Serialize as indented JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            boundary_check_interval_ms: DEFAULT_BOUNDARY_CHECK_INTERVAL_MS,
            seek_playback_interval_ms: DEFAULT_SEEK_PLAYBACK_INTERVAL_MS,
            drift_threshold_ms: DEFAULT_DRIFT_THRESHOLD_MS,
            scale_threshold_with_rate: true,
            fake_playback_cutoff: DEFAULT_FAKE_PLAYBACK_CUTOFF,
            seek_driven_reverse: false,
            rate_ladder: DEFAULT_RATES.to_vec(),
            jog_fallback_step_ms: None,
            coarse_jog_frames: 5,
            extra_coarse_jog_frames: 10,
        }
    }
}
