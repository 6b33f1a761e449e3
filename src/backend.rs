//! Simulated Stream Backend
//!
//! An in-process [`Stream`] with its own clock. It plays with a configurable
//! speed error (drift) and can be told to fail commands, which makes it handy
//! for demos and for exercising the synchronizer without real decoders.

use crate::stream::{Stream, StreamError, StreamResult};
use crate::time_source::{SystemTimeSource, TimeSource};
use std::sync::Arc;

/// Settings of a [`SimulatedStream`]
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedStreamConfig {
    /// Display name used in logs
    pub name: String,
    /// Timeline offset of local 0
    pub offset: i64,
    /// Media length in milliseconds
    pub duration: i64,
    /// Nominal frame rate (0 for audio)
    pub frames_per_second: f32,
    /// Own speed relative to the requested rate; 1.0 plays exactly
    pub drift_factor: f64,
    /// Whether single-frame stepping is supported
    pub step_enabled: bool,
}

impl SimulatedStreamConfig {
    /// A video stream playing without drift
    pub fn video(name: &str, duration: i64, frames_per_second: f32) -> Self {
        SimulatedStreamConfig {
            name: name.to_string(),
            offset: 0,
            duration,
            frames_per_second,
            drift_factor: 1.0,
            step_enabled: true,
        }
    }

    /// An audio stream (no frames, no stepping)
    pub fn audio(name: &str, duration: i64) -> Self {
        SimulatedStreamConfig {
            name: name.to_string(),
            offset: 0,
            duration,
            frames_per_second: 0.0,
            drift_factor: 1.0,
            step_enabled: false,
        }
    }
}

/// In-process stream driven by a [`TimeSource`]
pub struct SimulatedStream {
    config: SimulatedStreamConfig,
    time_source: Arc<dyn TimeSource>,
    /// Local position as of `anchor_wall`
    position: f64,
    anchor_wall: f64,
    rate: f32,
    playing: bool,
    failing: bool,
}

impl SimulatedStream {
    /// Create a stopped stream at local 0 reading the system clock
    pub fn new(config: SimulatedStreamConfig) -> Self {
        Self::with_time_source(config, Arc::new(SystemTimeSource::new()))
    }

    /// Create a stopped stream at local 0 reading `time_source`
    pub fn with_time_source(
        config: SimulatedStreamConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let anchor_wall = time_source.now_ms();
        SimulatedStream {
            config,
            time_source,
            position: 0.0,
            anchor_wall,
            rate: 1.0,
            playing: false,
            failing: false,
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Make every subsequent command fail (or succeed again)
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Change the speed error
    pub fn set_drift_factor(&mut self, drift_factor: f64) {
        self.settle();
        self.config.drift_factor = drift_factor;
    }

    fn check(&self, what: &str) -> StreamResult<()> {
        if self.failing {
            return Err(StreamError::Backend(format!(
                "{}: {} failed (simulated)",
                self.config.name, what
            )));
        }
        Ok(())
    }

    fn projected(&self) -> f64 {
        let mut position = self.position;
        if self.playing {
            let elapsed = self.time_source.now_ms() - self.anchor_wall;
            position += elapsed * f64::from(self.rate) * self.config.drift_factor;
        }
        position.clamp(0.0, self.config.duration as f64)
    }

    /// Fold elapsed playback into the stored position
    fn settle(&mut self) {
        self.position = self.projected();
        self.anchor_wall = self.time_source.now_ms();
    }

    fn place(&mut self, local_ms: i64) {
        self.position = local_ms.clamp(0, self.config.duration) as f64;
        self.anchor_wall = self.time_source.now_ms();
    }
}

impl Stream for SimulatedStream {
    fn play(&mut self) -> StreamResult<()> {
        self.check("play")?;
        self.settle();
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) -> StreamResult<()> {
        self.check("stop")?;
        self.settle();
        self.playing = false;
        Ok(())
    }

    fn seek_to(&mut self, local_ms: i64) -> StreamResult<()> {
        self.check("seek")?;
        self.place(local_ms);
        Ok(())
    }

    fn set_current_time(&mut self, local_ms: i64) -> StreamResult<()> {
        self.check("set_current_time")?;
        self.place(local_ms);
        Ok(())
    }

    fn current_time(&self) -> i64 {
        self.projected() as i64
    }

    fn set_rate(&mut self, rate: f32) -> StreamResult<()> {
        self.check("set_rate")?;
        self.settle();
        self.rate = rate;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn offset(&self) -> i64 {
        self.config.offset
    }

    fn set_offset(&mut self, offset: i64) {
        self.config.offset = offset;
    }

    fn duration(&self) -> i64 {
        self.config.duration
    }

    fn frames_per_second(&self) -> f32 {
        self.config.frames_per_second
    }

    fn is_step_enabled(&self) -> bool {
        self.config.step_enabled && self.config.frames_per_second > 0.0
    }

    fn step_forward(&mut self) -> StreamResult<()> {
        if !self.is_step_enabled() {
            return Err(StreamError::Unsupported("step_forward"));
        }
        self.check("step_forward")?;
        self.settle();
        let frame = 1000.0 / f64::from(self.config.frames_per_second);
        self.place((self.position + frame).floor() as i64);
        Ok(())
    }

    fn step_backward(&mut self) -> StreamResult<()> {
        if !self.is_step_enabled() {
            return Err(StreamError::Unsupported("step_backward"));
        }
        self.check("step_backward")?;
        self.settle();
        let frame = 1000.0 / f64::from(self.config.frames_per_second);
        self.place((self.position - frame).ceil() as i64);
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedStream")
            .field("config", &self.config)
            .field("position", &self.projected())
            .field("rate", &self.rate)
            .field("playing", &self.playing)
            .field("failing", &self.failing)
            .finish()
    }
}
