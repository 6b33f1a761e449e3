//! Shared fixtures for the integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use playsync::{
    Driver, ManualTimeSource, PlaybackOrchestrator, Stream, StreamError, StreamResult, SyncConfig,
    TimeSource,
};
use std::sync::Arc;

/// One command received by a [`RecordingStream`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    Play,
    Stop,
    SeekTo(i64),
    SetCurrentTime(i64),
    SetRate(f32),
    StepForward,
    StepBackward,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Count calls matching a predicate
pub fn count(calls: &CallLog, pred: impl Fn(&Call) -> bool) -> usize {
    calls.lock().iter().filter(|c| pred(c)).count()
}

/// Stream that records every command and, while playing, advances with a
/// manual time source
pub struct RecordingStream {
    calls: CallLog,
    time: ManualTimeSource,
    position: f64,
    anchor: f64,
    rate: f32,
    playing: bool,
    offset: i64,
    duration: i64,
    fps: f32,
    /// Ignore time commands and never advance
    pub pinned: bool,
    /// Fail every command
    pub failing: bool,
    pub step_enabled: bool,
}

impl RecordingStream {
    pub fn new(time: &ManualTimeSource, offset: i64, duration: i64, fps: f32) -> (Self, CallLog) {
        let calls = CallLog::default();
        let stream = RecordingStream {
            calls: Arc::clone(&calls),
            anchor: time.now_ms(),
            time: time.clone(),
            position: 0.0,
            rate: 1.0,
            playing: false,
            offset,
            duration,
            fps,
            pinned: false,
            failing: false,
            step_enabled: false,
        };
        (stream, calls)
    }

    fn projected(&self) -> f64 {
        if self.playing && !self.pinned {
            self.position + (self.time.now_ms() - self.anchor) * f64::from(self.rate)
        } else {
            self.position
        }
    }

    fn record(&mut self, call: Call) -> StreamResult<()> {
        self.calls.lock().push(call);
        if self.failing {
            return Err(StreamError::Backend("recording stream told to fail".into()));
        }
        self.position = self.projected();
        self.anchor = self.time.now_ms();
        match call {
            Call::Play => self.playing = true,
            Call::Stop => self.playing = false,
            Call::SetRate(rate) => self.rate = rate,
            Call::SeekTo(t) | Call::SetCurrentTime(t) if !self.pinned => self.position = t as f64,
            _ => {}
        }
        Ok(())
    }
}

impl Stream for RecordingStream {
    fn play(&mut self) -> StreamResult<()> {
        self.record(Call::Play)
    }

    fn stop(&mut self) -> StreamResult<()> {
        self.record(Call::Stop)
    }

    fn seek_to(&mut self, local_ms: i64) -> StreamResult<()> {
        self.record(Call::SeekTo(local_ms))
    }

    fn set_current_time(&mut self, local_ms: i64) -> StreamResult<()> {
        self.record(Call::SetCurrentTime(local_ms))
    }

    fn current_time(&self) -> i64 {
        self.projected().round() as i64
    }

    fn set_rate(&mut self, rate: f32) -> StreamResult<()> {
        self.record(Call::SetRate(rate))
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn offset(&self) -> i64 {
        self.offset
    }

    fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    fn duration(&self) -> i64 {
        self.duration
    }

    fn frames_per_second(&self) -> f32 {
        self.fps
    }

    fn is_step_enabled(&self) -> bool {
        self.step_enabled
    }

    fn step_forward(&mut self) -> StreamResult<()> {
        self.record(Call::StepForward)
    }

    fn step_backward(&mut self) -> StreamResult<()> {
        self.record(Call::StepBackward)
    }
}

/// Manually driven orchestrator with default settings
pub fn manual_orchestrator() -> (PlaybackOrchestrator, ManualTimeSource) {
    manual_orchestrator_with(SyncConfig::default())
}

/// Manually driven orchestrator with the given settings
pub fn manual_orchestrator_with(config: SyncConfig) -> (PlaybackOrchestrator, ManualTimeSource) {
    let time = ManualTimeSource::new();
    let orchestrator =
        PlaybackOrchestrator::with_time_source(config, Driver::Manual, Arc::new(time.clone()))
            .expect("valid configuration");
    (orchestrator, time)
}
