//! Frame Rate Aggregation
//!
//! Tracks the nominal frame rate of every attached stream plus one optional
//! user override, and derives the single effective rate that sizes a jog step.
//! The periodic sync path never consults it.

use crate::stream::StreamId;
use std::collections::HashMap;

/// Milliseconds per second, the numerator of a jog step
const MS_PER_SECOND: f64 = 1000.0;

/// Per-stream frame rates plus an optional user override
#[derive(Debug, Clone, Default)]
pub struct FrameRateAggregator {
    per_stream: HashMap<StreamId, f32>,
    user_override: Option<f32>,
}

impl FrameRateAggregator {
    /// Create an empty aggregator (effective rate 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the nominal rate of a stream
    pub fn add_stream(&mut self, id: StreamId, fps: f32) {
        self.per_stream.insert(id, fps);
    }

    /// Forget a stream. Unknown ids are ignored.
    pub fn remove_stream(&mut self, id: StreamId) {
        self.per_stream.remove(&id);
    }

    /// Set the user-entered step rate; it wins over every stream rate.
    ///
    /// A negative or non-finite rate is refused and drops any previous
    /// override. Returns whether the override was taken.
    pub fn set_user_override(&mut self, fps: f32) -> bool {
        if !fps.is_finite() || fps < 0.0 {
            self.user_override = None;
            return false;
        }
        self.user_override = Some(fps);
        true
    }

    /// Drop the user override
    pub fn clear_user_override(&mut self) {
        self.user_override = None;
    }

    /// Current user override, if any
    pub fn user_override(&self) -> Option<f32> {
        self.user_override
    }

    /// Nominal rate registered for `id`
    pub fn stream_rate(&self, id: StreamId) -> Option<f32> {
        self.per_stream.get(&id).copied()
    }

    /// Number of registered streams
    pub fn stream_count(&self) -> usize {
        self.per_stream.len()
    }

    /// The override if present, else the highest stream rate, else 0
    pub fn effective_rate(&self) -> f32 {
        if let Some(fps) = self.user_override {
            return fps;
        }
        self.per_stream.values().copied().fold(0.0, f32::max)
    }

    /// True when the effective rate is within machine epsilon of 0
    pub fn is_zero(&self) -> bool {
        self.effective_rate().abs() <= f32::EPSILON
    }

    /// Length of one frame in whole milliseconds, `None` when jogging is undefined
    pub fn step_ms(&self) -> Option<i64> {
        if self.is_zero() {
            return None;
        }
        let step = (MS_PER_SECOND / f64::from(self.effective_rate().abs())).floor() as i64;
        // Rates above 1000 fps would round to 0 ms, which never moves the clock
        Some(step.max(1))
    }
}
