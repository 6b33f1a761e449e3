//! External Stream Interface
//!
//! A [`Stream`] is an independently clocked media source (a video or audio
//! decoder) driven by the synchronizer. Decoding, frame accuracy and native
//! rate support are the backend's business; the engine only issues time and
//! rate commands and reads back where the stream thinks it is.
//!
//! Backends are picked at a single construction point by the host and handed
//! over as `Box<dyn Stream>`.

use std::fmt;

/// Opaque identifier of an attached stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Failure reported by a stream backend
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// The backend rejected or failed the command
    #[error("Backend error: {0}")]
    Backend(String),

    /// The backend does not implement this command
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// IO error from the underlying media source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<String> for StreamError {
    fn from(msg: String) -> Self {
        StreamError::Backend(msg)
    }
}

impl From<&str> for StreamError {
    fn from(msg: &str) -> Self {
        StreamError::Backend(msg.to_string())
    }
}

/// Result type for stream commands
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Media stream driven by the master clock.
///
/// All times are in the stream's local milliseconds: local 0 is the first
/// frame of the media, regardless of where the stream sits on the shared
/// timeline (see [`Stream::offset`]).
///
/// Commands may block on slow I/O. They are never issued while the master
/// clock's lock is held.
pub trait Stream: Send {
    /// Start native playback at the current local time
    fn play(&mut self) -> StreamResult<()>;

    /// Halt native playback, keeping the position
    fn stop(&mut self) -> StreamResult<()>;

    /// Jump to a local time, typically fast and approximate
    fn seek_to(&mut self, local_ms: i64) -> StreamResult<()>;

    /// Set the current local time precisely (used for drift correction and jogs)
    fn set_current_time(&mut self, local_ms: i64) -> StreamResult<()>;

    /// Local time the stream reports right now
    fn current_time(&self) -> i64;

    /// Set the native playback rate
    fn set_rate(&mut self, rate: f32) -> StreamResult<()>;

    /// Whether native playback is running
    fn is_playing(&self) -> bool;

    /// Timeline time at which local 0 is anchored
    fn offset(&self) -> i64;

    /// Move the stream on the shared timeline
    fn set_offset(&mut self, offset: i64);

    /// Length of the media in milliseconds
    fn duration(&self) -> i64;

    /// Nominal frame rate; 0 for streams without frames (audio)
    fn frames_per_second(&self) -> f32;

    /// Whether [`Stream::step_forward`]/[`Stream::step_backward`] are frame exact
    fn is_step_enabled(&self) -> bool {
        false
    }

    /// Advance exactly one frame
    fn step_forward(&mut self) -> StreamResult<()> {
        Err(StreamError::Unsupported("step_forward"))
    }

    /// Go back exactly one frame
    fn step_backward(&mut self) -> StreamResult<()> {
        Err(StreamError::Unsupported("step_backward"))
    }
}

/// Recording stream for unit tests
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// One command received by a [`MockStream`]
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub(crate) enum Call {
        Play,
        Stop,
        SeekTo(i64),
        SetCurrentTime(i64),
        SetRate(f32),
        StepForward,
        StepBackward,
    }

    pub(crate) type CallLog = Arc<Mutex<Vec<Call>>>;

    pub(crate) struct MockStream {
        pub calls: CallLog,
        pub playing: bool,
        pub local: i64,
        pub offset: i64,
        pub duration: i64,
        pub fps: f32,
        /// Ignore time commands; `current_time` stays put
        pub pinned: bool,
        /// Fail every command
        pub failing: bool,
        pub step_enabled: bool,
    }

    impl MockStream {
        pub(crate) fn new(offset: i64, duration: i64, fps: f32) -> (Self, CallLog) {
            let calls = CallLog::default();
            let stream = MockStream {
                calls: Arc::clone(&calls),
                playing: false,
                local: 0,
                offset,
                duration,
                fps,
                pinned: false,
                failing: false,
                step_enabled: false,
            };
            (stream, calls)
        }

        fn record(&mut self, call: Call) -> StreamResult<()> {
            self.calls.lock().push(call);
            if self.failing {
                return Err(StreamError::Backend("mock failure".into()));
            }
            match call {
                Call::Play => self.playing = true,
                Call::Stop => self.playing = false,
                Call::SeekTo(t) | Call::SetCurrentTime(t) if !self.pinned => self.local = t,
                Call::StepForward if !self.pinned => self.local += 1,
                Call::StepBackward if !self.pinned => self.local -= 1,
                _ => {}
            }
            Ok(())
        }
    }

    impl Stream for MockStream {
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
            self.local
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
}
