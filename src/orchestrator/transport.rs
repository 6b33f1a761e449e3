//! Transport State
//!
//! The user-facing playback state plus the pure arithmetic behind shuttle
//! and jog buttons.

use crate::config::SyncConfig;
use crate::rate_ladder::RateLadder;

/// What the transport is doing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportState {
    /// Clock stopped
    Stopped,
    /// Playing at a rate chosen with play/pause
    Playing(f32),
    /// Shuttling backwards; the index is the ladder position of the rate
    ShuttleReverse(usize),
    /// Shuttling forwards; the index is the ladder position of the rate
    ShuttleForward(usize),
}

impl TransportState {
    /// Shuttle state for a ladder rate; `Stopped` for 0 or an off-ladder rate
    pub fn shuttle(ladder: &RateLadder, rate: f32) -> Self {
        match ladder.index_of(rate) {
            Some(index) if rate > 0.0 => TransportState::ShuttleForward(index),
            Some(index) if rate < 0.0 => TransportState::ShuttleReverse(index),
            _ => TransportState::Stopped,
        }
    }

    /// Rate this state plays at
    pub fn rate(&self, ladder: &RateLadder) -> f32 {
        match *self {
            TransportState::Stopped => 0.0,
            TransportState::Playing(rate) => rate,
            TransportState::ShuttleForward(index) | TransportState::ShuttleReverse(index) => {
                ladder.rates().get(index).copied().unwrap_or(0.0)
            }
        }
    }

    /// Whether the state is one of the shuttle states
    pub fn is_shuttling(&self) -> bool {
        matches!(
            self,
            TransportState::ShuttleForward(_) | TransportState::ShuttleReverse(_)
        )
    }
}

/// Size of one jog press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JogStride {
    /// One frame
    #[default]
    Frame,
    /// Coarse jog (shift held)
    Coarse,
    /// Extra-coarse jog (ctrl held)
    ExtraCoarse,
}

impl JogStride {
    /// Number of frames this stride covers
    pub fn frames(&self, config: &SyncConfig) -> u32 {
        match self {
            JogStride::Frame => 1,
            JogStride::Coarse => config.coarse_jog_frames,
            JogStride::ExtraCoarse => config.extra_coarse_jog_frames,
        }
    }
}

/// Mutable transport bookkeeping owned by the orchestrator
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    /// Mode while the clock runs; reported as `Stopped` when it does not
    pub mode: TransportState,
    /// Rate to resume at after pause
    pub pause_rate: Option<f32>,
    /// User region of interest; `None` follows the attached streams
    pub region_of_interest: Option<(i64, i64)>,
}

impl Transport {
    pub fn new() -> Self {
        Transport {
            mode: TransportState::Stopped,
            pause_rate: None,
            region_of_interest: None,
        }
    }
}

/// Signed move of a jog of `frames` frames of `step` ms from `time`.
///
/// Jogs land on frame markers (multiples of `step`). From a time between
/// markers, the nearest marker in the jog direction counts as the first frame.
pub fn jog_delta(time: i64, step: i64, frames: u32, forward: bool) -> i64 {
    let frames = i64::from(frames.max(1));
    let step = step.max(1);
    let phase = time.rem_euclid(step);
    if forward {
        if phase == 0 {
            frames * step
        } else {
            frames * step - phase
        }
    } else if phase == 0 {
        -frames * step
    } else {
        -phase - (frames - 1) * step
    }
}
