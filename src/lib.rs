//! Playback Synchronization Engine
//!
//! Keeps any number of independently clocked media streams (video and audio
//! decoders) aligned to one logical timeline. A master clock owns the
//! position and signed rate; a synchronizer starts, stops and resyncs each
//! stream against it; an orchestrator maps transport buttons onto both.
//!
//! # Features
//! - Variable-rate and reverse playback with a discrete shuttle ladder (1/32x to 32x)
//! - Periodic drift correction with a rate-scaled threshold
//! - Seek-driven playback above the rate a decoder can play natively
//! - Frame-exact jogging sized from the fastest attached stream
//! - Region-of-interest bounded playback
//! - Isolation of misbehaving streams: errors are logged, never propagated
//!
//! # Crate feature flags
//! - `simulated-backend` (default): in-process [`backend::SimulatedStream`]
//! - `cli` (opt-in): the `playsync` demo binary (enables `env_logger`)
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "simulated-backend")]
//! # {
//! use playsync::backend::{SimulatedStream, SimulatedStreamConfig};
//! use playsync::{Driver, PlaybackOrchestrator, SyncConfig};
//!
//! let orchestrator = PlaybackOrchestrator::new(SyncConfig::default(), Driver::Threaded).unwrap();
//! let video = SimulatedStream::new(SimulatedStreamConfig::video("camera", 60_000, 30.0));
//! orchestrator.attach_stream(Box::new(video)).unwrap();
//! orchestrator.play();
//! orchestrator.shuttle_forward(); // 2x
//! orchestrator.pause();
//! orchestrator.jog_forward(); // one frame, 33 ms
//! # }
//! ```
//!
//! ## Manual driving (deterministic)
//! ```
//! use playsync::{Driver, ManualTimeSource, PlaybackOrchestrator, SyncConfig, TickKind};
//! use std::sync::Arc;
//!
//! let time = ManualTimeSource::new();
//! let orchestrator = PlaybackOrchestrator::with_time_source(
//!     SyncConfig::default(),
//!     Driver::Manual,
//!     Arc::new(time.clone()),
//! )
//! .unwrap();
//! orchestrator.play();
//! time.advance(2000.0);
//! orchestrator.tick(TickKind::Sync);
//! orchestrator.process_pending();
//! assert_eq!(orchestrator.current_time(), 2000.0);
//! ```

#![warn(missing_docs)]

pub mod clock; // Master Clock & Ticker
pub mod config; // Engine Configuration
pub mod frame_rate; // Jog Step Sizing
pub mod orchestrator; // Transport Façade
pub mod rate_ladder; // Shuttle Rates
pub mod stream; // External Stream Interface
pub mod sync; // Stream Synchronization
pub mod time_source; // Wall-Clock Sources

#[cfg(feature = "simulated-backend")]
pub mod backend; // In-Process Stream Backend

/// Error types for synchronization engine operations
#[derive(thiserror::Error, Debug)]
pub enum PlaysyncError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A stream reported unusable properties at attach time
    #[error("Invalid stream: {0}")]
    InvalidStream(String),

    /// No stream with this id is attached
    #[error("Unknown stream: {0}")]
    UnknownStream(StreamId),

    /// IO error from filesystem or thread spawning
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for PlaysyncError {
    /// Converts a String into `PlaysyncError::Other`.
    ///
    /// Prefer a specific variant (`ConfigError`, `InvalidStream`) where one fits.
    fn from(msg: String) -> Self {
        PlaysyncError::Other(msg)
    }
}

impl From<&str> for PlaysyncError {
    /// Converts a string slice into `PlaysyncError::Other`.
    fn from(msg: &str) -> Self {
        PlaysyncError::Other(msg.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, PlaysyncError>;

// Public API exports
pub use clock::{
    ChannelListener, ClockEvent, ClockListener, ClockSnapshot, ClockState, MasterClock,
    TickIntervals, TickKind,
};
pub use config::SyncConfig;
pub use frame_rate::FrameRateAggregator;
pub use orchestrator::{Driver, JogStride, PlaybackOrchestrator, TransportState};
pub use rate_ladder::{RateLadder, DEFAULT_RATES};
pub use stream::{Stream, StreamError, StreamId, StreamResult};
pub use sync::{BindingStats, PlaybackMode, StreamBinding, Synchronizer};
pub use time_source::{ManualTimeSource, SystemTimeSource, TimeSource};
