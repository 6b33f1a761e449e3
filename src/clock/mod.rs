//! Master Clock
//!
//! Owns the logical playback position, the signed rate and the running flag
//! of one timeline. Wall time enters the model in a single place, the
//! elapsed-time flush:
//!
//! ```text
//! time += running ? rate * (now - last_wall) : 0
//! last_wall = now
//! ```
//!
//! Everything else is logical-time arithmetic. Every public method and the
//! periodic tick run under one lock per clock. Listeners are notified while
//! that lock is held; see [`ClockListener`] for the reentrancy hazard.
//!
//! The clock never clamps itself to its region. Whoever consumes the
//! boundary-check or sync events does that by calling [`MasterClock::stop`]
//! followed by [`MasterClock::force_time`].

mod event;
mod ticker;

pub use event::{ChannelListener, ClockEvent, ClockListener, TickKind};
pub use ticker::{
    TickIntervals, DEFAULT_BOUNDARY_CHECK_INTERVAL_MS, DEFAULT_SEEK_PLAYBACK_INTERVAL_MS,
    DEFAULT_SYNC_INTERVAL_MS,
};

use crate::time_source::{SystemTimeSource, TimeSource};
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use ticker::Ticker;

/// Raw state of a clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    /// Logical position in milliseconds as of the last flush
    pub time: f64,
    /// Signed playback rate; 0 behaves like stopped
    pub rate: f32,
    /// Whether wall time advances the position
    pub running: bool,
    /// Region start
    pub min_time: i64,
    /// Region end
    pub max_time: i64,
    /// Wall time of the last flush (time source milliseconds)
    pub last_wall: f64,
}

impl Default for ClockState {
    fn default() -> Self {
        ClockState {
            time: 0.0,
            rate: 1.0,
            running: false,
            min_time: 0,
            max_time: i64::MAX,
            last_wall: 0.0,
        }
    }
}

/// Consistent view of a clock at one instant, with time projected to "now"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSnapshot {
    /// Logical position in milliseconds
    pub time: f64,
    /// Signed playback rate
    pub rate: f32,
    /// Whether the clock is running
    pub running: bool,
    /// Region start
    pub min_time: i64,
    /// Region end
    pub max_time: i64,
}

impl ClockSnapshot {
    /// Position truncated to whole milliseconds
    pub fn time_ms(&self) -> i64 {
        self.time as i64
    }

    /// Whether the position lies inside `[min_time, max_time]`
    pub fn in_region(&self) -> bool {
        self.time >= self.min_time as f64 && self.time <= self.max_time as f64
    }

    /// Clamp a time into the region
    pub fn clamp_to_region(&self, time: f64) -> f64 {
        time.clamp(self.min_time as f64, self.max_time as f64)
    }
}

/// Handle returned by [`MasterClock::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Inner {
    state: ClockState,
    rate_bounds: Option<(f32, f32)>,
}

/// State shared with the ticker thread
struct ClockShared {
    inner: Mutex<Inner>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ClockListener>)>>,
    next_listener: AtomicU64,
    time_source: Arc<dyn TimeSource>,
}

impl ClockShared {
    fn dispatch(&self, event: ClockEvent) {
        for (_, listener) in self.listeners.read().iter() {
            listener.on_clock_event(event);
        }
    }

    fn flush(&self, state: &mut ClockState) {
        let now = self.time_source.now_ms();
        if state.running {
            state.time += f64::from(state.rate) * (now - state.last_wall);
        }
        state.last_wall = now;
    }

    fn start_locked(&self, state: &mut ClockState) {
        if state.running {
            return;
        }
        state.last_wall = self.time_source.now_ms();
        state.running = true;
        debug!("clock: started at {:.1} ms, rate {}", state.time, state.rate);
        self.dispatch(ClockEvent::Started(state.time));
    }

    fn stop_locked(&self, state: &mut ClockState) {
        if !state.running {
            return;
        }
        self.flush(state);
        state.running = false;
        debug!("clock: stopped at {:.1} ms", state.time);
        self.dispatch(ClockEvent::Stopped(state.time));
    }

    fn tick(&self, kind: TickKind) {
        let mut inner = self.inner.lock();
        let state = &mut inner.state;
        self.flush(state);
        let time = state.time;
        trace!("clock: {:?} tick at {:.1} ms", kind, time);
        match kind {
            TickKind::Sync => self.dispatch(ClockEvent::Sync(time)),
            TickKind::BoundaryCheck if state.running => {
                self.dispatch(ClockEvent::BoundaryCheck(time))
            }
            TickKind::SeekPlayback if state.running => {
                self.dispatch(ClockEvent::SeekPlayback(time))
            }
            _ => {}
        }
    }

    fn project(&self, state: &ClockState) -> f64 {
        if state.running {
            state.time + f64::from(state.rate) * (self.time_source.now_ms() - state.last_wall)
        } else {
            state.time
        }
    }
}

fn sanitize_rate(rate: f32, bounds: Option<(f32, f32)>) -> f32 {
    if !rate.is_finite() {
        warn!("clock: rejected non-finite rate {}, using 0", rate);
        return 0.0;
    }
    match bounds {
        Some((lo, hi)) if rate < lo || rate > hi => {
            let clamped = rate.clamp(lo, hi);
            warn!("clock: rate {} outside [{}, {}], clamped to {}", rate, lo, hi, clamped);
            clamped
        }
        _ => rate,
    }
}

/// Authoritative timeline clock.
///
/// All methods take `&self`; the clock is internally synchronized and can be
/// shared between the thread issuing user actions and its own ticker.
pub struct MasterClock {
    shared: Arc<ClockShared>,
    ticker: Mutex<Option<Ticker>>,
}

impl MasterClock {
    /// Create a stopped clock at time 0, rate 1, reading the system clock
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource::new()))
    }

    /// Create a clock reading wall time from `time_source`
    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        let state = ClockState {
            last_wall: time_source.now_ms(),
            ..ClockState::default()
        };
        MasterClock {
            shared: Arc::new(ClockShared {
                inner: Mutex::new(Inner {
                    state,
                    rate_bounds: None,
                }),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                time_source,
            }),
            ticker: Mutex::new(None),
        }
    }

    /// Clamp every finite rate passed to [`MasterClock::set_rate`] into `[min, max]`
    pub fn with_rate_bounds(self, min: f32, max: f32) -> Self {
        self.set_rate_bounds(min, max);
        self
    }

    /// Change the rate bounds; bounds are swapped if given in reverse order
    pub fn set_rate_bounds(&self, min: f32, max: f32) {
        let bounds = if min <= max { (min, max) } else { (max, min) };
        self.shared.inner.lock().rate_bounds = Some(bounds);
    }

    /// Transition to running and emit `Started`. No-op if already running.
    pub fn start(&self) {
        let mut inner = self.shared.inner.lock();
        self.shared.start_locked(&mut inner.state);
    }

    /// Flush elapsed time, transition to stopped and emit `Stopped`.
    /// No-op if already stopped.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        self.shared.stop_locked(&mut inner.state);
    }

    /// Start if stopped, stop if running
    pub fn toggle(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state.running {
            self.shared.stop_locked(&mut inner.state);
        } else {
            self.shared.start_locked(&mut inner.state);
        }
    }

    /// Change the rate.
    ///
    /// Elapsed time is flushed at the old rate first, then `RateChanged` is
    /// emitted, then the clock starts (non-negligible rate) or stops (rate
    /// within epsilon of 0). Non-finite rates become 0.
    pub fn set_rate(&self, rate: f32) {
        let mut inner = self.shared.inner.lock();
        let rate = sanitize_rate(rate, inner.rate_bounds);
        let state = &mut inner.state;
        self.shared.flush(state);
        state.rate = rate;
        debug!("clock: rate set to {}", rate);
        self.shared.dispatch(ClockEvent::RateChanged(rate));
        if rate.abs() < f32::EPSILON {
            self.shared.stop_locked(state);
        } else {
            self.shared.start_locked(state);
        }
    }

    /// Overwrite the position without flushing. Streams catch up on the next tick.
    pub fn set_time(&self, time: f64) {
        let mut inner = self.shared.inner.lock();
        inner.state.time = time;
        inner.state.last_wall = self.shared.time_source.now_ms();
    }

    /// Overwrite the position and emit `ForceSync` so streams follow at once
    pub fn force_time(&self, time: f64) {
        let mut inner = self.shared.inner.lock();
        inner.state.time = time;
        inner.state.last_wall = self.shared.time_source.now_ms();
        debug!("clock: forced to {:.1} ms", time);
        self.shared.dispatch(ClockEvent::ForceSync(time));
    }

    /// Move the position by `delta` milliseconds, no start/stop side effect
    pub fn step_time(&self, delta: f64) {
        let mut inner = self.shared.inner.lock();
        self.shared.flush(&mut inner.state);
        inner.state.time += delta;
    }

    /// Run one tick of the given kind by hand.
    ///
    /// Flushes elapsed time. `Sync` is always emitted; `BoundaryCheck` and
    /// `SeekPlayback` only while running.
    pub fn tick(&self, kind: TickKind) {
        self.shared.tick(kind);
    }

    /// Set the active region; bounds are swapped if given in reverse order
    pub fn set_region(&self, min_time: i64, max_time: i64) {
        let (min_time, max_time) = if min_time <= max_time {
            (min_time, max_time)
        } else {
            (max_time, min_time)
        };
        let mut inner = self.shared.inner.lock();
        inner.state.min_time = min_time;
        inner.state.max_time = max_time;
        debug!("clock: region [{}, {}]", min_time, max_time);
    }

    /// Region start
    pub fn min_time(&self) -> i64 {
        self.shared.inner.lock().state.min_time
    }

    /// Region end
    pub fn max_time(&self) -> i64 {
        self.shared.inner.lock().state.max_time
    }

    /// Clamp a time into the active region
    pub fn to_range(&self, time: f64) -> f64 {
        let inner = self.shared.inner.lock();
        time.clamp(inner.state.min_time as f64, inner.state.max_time as f64)
    }

    /// Current position, projected to now if running
    pub fn get_time(&self) -> f64 {
        let inner = self.shared.inner.lock();
        self.shared.project(&inner.state)
    }

    /// Current rate
    pub fn get_rate(&self) -> f32 {
        self.shared.inner.lock().state.rate
    }

    /// Whether the clock is stopped
    pub fn is_stopped(&self) -> bool {
        !self.shared.inner.lock().state.running
    }

    /// Consistent projected view of time, rate, running flag and region
    pub fn snapshot(&self) -> ClockSnapshot {
        let inner = self.shared.inner.lock();
        let state = &inner.state;
        ClockSnapshot {
            time: self.shared.project(state),
            rate: state.rate,
            running: state.running,
            min_time: state.min_time,
            max_time: state.max_time,
        }
    }

    /// Raw state as of the last flush
    pub fn state(&self) -> ClockState {
        self.shared.inner.lock().state
    }

    /// Register a listener; it receives every event from now on
    pub fn add_listener(&self, listener: Arc<dyn ClockListener>) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.write().push((id, listener));
        id
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.read().len()
    }

    /// Spawn the periodic ticker, replacing a running one
    pub fn start_ticker(&self, intervals: TickIntervals) -> crate::Result<()> {
        let mut slot = self.ticker.lock();
        if let Some(mut old) = slot.take() {
            old.stop();
        }

        let weak: Weak<ClockShared> = Arc::downgrade(&self.shared);
        let ticker = Ticker::spawn("playsync-clock", intervals, move |kind| match weak.upgrade() {
            Some(shared) => {
                shared.tick(kind);
                true
            }
            None => false,
        })
        .map_err(|e| {
            log::error!("clock: failed to spawn ticker thread: {}", e);
            e
        })?;

        debug!("clock: ticker started ({:?})", intervals);
        *slot = Some(ticker);
        Ok(())
    }

    /// Stop and join the periodic ticker. No-op if none is running.
    pub fn stop_ticker(&self) {
        if let Some(mut ticker) = self.ticker.lock().take() {
            ticker.stop();
            debug!("clock: ticker stopped");
        }
    }

    /// Whether a periodic ticker is running
    pub fn is_ticking(&self) -> bool {
        self.ticker.lock().is_some()
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MasterClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterClock")
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .field("ticking", &self.is_ticking())
            .finish()
    }
}
