//! Stream Bindings
//!
//! A [`StreamBinding`] pairs an attached [`Stream`] with where it sits on the
//! shared timeline and a mirror of its playing flag. Every command goes
//! through the binding so a failing stream is logged and counted in one place
//! and never leaves the binding half-updated.

use crate::stream::{Stream, StreamId, StreamResult};
use crate::PlaysyncError;
use log::{debug, warn};

/// How a binding advances while the clock runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// The stream plays natively and is corrected on drift
    #[default]
    Native,
    /// Native playback is off; the stream is moved by repeated seeks
    SeekDriven,
}

/// Per-binding command counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingStats {
    /// Commands sent to the stream, successful or not
    pub commands_issued: u64,
    /// Drift corrections issued (`set_current_time` on a sync tick)
    pub corrections: u64,
    /// Commands the stream rejected
    pub failures: u64,
}

/// An attached stream and its placement on the timeline
pub struct StreamBinding {
    id: StreamId,
    stream: Box<dyn Stream>,
    offset: i64,
    duration: i64,
    assumed_frame_rate: f32,
    is_playing: bool,
    mode: PlaybackMode,
    stats: BindingStats,
}

impl StreamBinding {
    /// Bind a stream, reading offset, duration and frame rate from it.
    ///
    /// Fails for a negative duration or a non-finite or negative frame rate.
    pub fn new(id: StreamId, stream: Box<dyn Stream>) -> crate::Result<Self> {
        let duration = stream.duration();
        if duration < 0 {
            return Err(PlaysyncError::InvalidStream(format!(
                "{} reports negative duration {}",
                id, duration
            )));
        }
        let fps = stream.frames_per_second();
        if !fps.is_finite() || fps < 0.0 {
            return Err(PlaysyncError::InvalidStream(format!(
                "{} reports invalid frame rate {}",
                id, fps
            )));
        }

        Ok(StreamBinding {
            id,
            offset: stream.offset(),
            is_playing: stream.is_playing(),
            stream,
            duration,
            assumed_frame_rate: fps,
            mode: PlaybackMode::Native,
            stats: BindingStats::default(),
        })
    }

    /// Stream identifier
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Timeline time of the stream's local 0
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Media length in milliseconds
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Timeline time one past the last local millisecond
    pub fn end(&self) -> i64 {
        self.offset.saturating_add(self.duration)
    }

    /// Frame rate reported at attach time
    pub fn frame_rate(&self) -> f32 {
        self.assumed_frame_rate
    }

    /// Last known playing state
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Current playback mode
    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Command counters
    pub fn stats(&self) -> BindingStats {
        self.stats
    }

    /// The bound stream
    pub fn stream(&self) -> &dyn Stream {
        self.stream.as_ref()
    }

    /// Mutable access to the bound stream, bypassing the counters
    pub fn stream_mut(&mut self) -> &mut dyn Stream {
        self.stream.as_mut()
    }

    /// Give the stream back, consuming the binding
    pub fn into_stream(self) -> Box<dyn Stream> {
        self.stream
    }

    /// Whether `time` falls in `[offset, offset + duration)`
    pub fn contains(&self, time: f64) -> bool {
        time >= self.offset as f64 && time < self.end() as f64
    }

    /// Whether `time` falls in `[offset, offset + duration]`, the end included
    pub fn spans(&self, time: f64) -> bool {
        time >= self.offset as f64 && time <= self.end() as f64
    }

    /// Local time for a timeline time, clamped to `[0, duration]`
    pub fn local_time(&self, time: f64) -> i64 {
        let local = (time - self.offset as f64).floor();
        local.clamp(0.0, self.duration as f64) as i64
    }

    /// Move the binding and the stream on the timeline
    pub fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
        self.stream.set_offset(offset);
    }

    pub(crate) fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode != mode {
            debug!("sync: {} switched to {:?} playback", self.id, mode);
            self.mode = mode;
        }
    }

    /// Re-read the playing flag from the stream
    pub fn refresh(&mut self) {
        self.is_playing = self.stream.is_playing();
    }

    fn command<F>(&mut self, what: &str, f: F) -> bool
    where
        F: FnOnce(&mut dyn Stream) -> StreamResult<()>,
    {
        self.stats.commands_issued += 1;
        match f(self.stream.as_mut()) {
            Ok(()) => true,
            Err(e) => {
                self.stats.failures += 1;
                warn!("sync: {} failed {}: {}", self.id, what, e);
                false
            }
        }
    }

    /// Start native playback
    pub fn play(&mut self) -> bool {
        let ok = self.command("play", |s| s.play());
        if ok {
            self.is_playing = true;
        }
        ok
    }

    /// Halt native playback
    pub fn stop(&mut self) -> bool {
        let ok = self.command("stop", |s| s.stop());
        if ok {
            self.is_playing = false;
        }
        ok
    }

    /// Seek to a local time
    pub fn seek_to(&mut self, local_ms: i64) -> bool {
        self.command("seek", |s| s.seek_to(local_ms))
    }

    /// Set the local time precisely
    pub fn set_current_time(&mut self, local_ms: i64) -> bool {
        self.command("set_current_time", |s| s.set_current_time(local_ms))
    }

    /// Set the native rate
    pub fn set_rate(&mut self, rate: f32) -> bool {
        self.command("set_rate", |s| s.set_rate(rate))
    }

    /// Native single-frame step forward
    pub fn step_forward(&mut self) -> bool {
        self.command("step_forward", |s| s.step_forward())
    }

    /// Native single-frame step backward
    pub fn step_backward(&mut self) -> bool {
        self.command("step_backward", |s| s.step_backward())
    }

    pub(crate) fn record_correction(&mut self) {
        self.stats.corrections += 1;
    }
}

impl std::fmt::Debug for StreamBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBinding")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("duration", &self.duration)
            .field("assumed_frame_rate", &self.assumed_frame_rate)
            .field("is_playing", &self.is_playing)
            .field("mode", &self.mode)
            .field("stats", &self.stats)
            .finish()
    }
}
