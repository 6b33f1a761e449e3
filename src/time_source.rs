//! Wall-Clock Sources
//!
//! The master clock reads wall time in exactly one place, the elapsed-time
//! flush. [`TimeSource`] is that seam: [`SystemTimeSource`] reads a monotonic
//! clock, [`ManualTimeSource`] is advanced by hand.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Monotonic wall time in milliseconds since an arbitrary origin
pub trait TimeSource: Send + Sync {
    /// Current wall time in milliseconds
    fn now_ms(&self) -> f64;
}

/// Monotonic system clock
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Create a source whose origin is now
    pub fn new() -> Self {
        SystemTimeSource {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven time source.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// give another to the clock.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<Mutex<f64>>,
}

impl ManualTimeSource {
    /// Create a source at time 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ms`
    pub fn advance(&self, ms: f64) {
        *self.now.lock() += ms;
    }

    /// Jump to an absolute time
    pub fn set(&self, ms: f64) {
        *self.now.lock() = ms;
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> f64 {
        *self.now.lock()
    }
}
