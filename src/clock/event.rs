//! Clock Events and Listeners
//!
//! Every observable change of the master clock is one [`ClockEvent`]. A
//! listener receives them through a single dispatch method; the per-kind
//! callbacks are conveniences reached from its default body.

use crossbeam_channel::Sender;

/// Notification emitted by the master clock. Times are logical milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    /// Periodic sync tick; streams may be resynchronized
    Sync(f64),
    /// High-frequency tick while running; region bounds should be checked
    BoundaryCheck(f64),
    /// High-frequency tick while running; seek-driven playback advances
    SeekPlayback(f64),
    /// Time was forced; every stream must follow immediately
    ForceSync(f64),
    /// Clock went from stopped to running
    Started(f64),
    /// Clock went from running to stopped
    Stopped(f64),
    /// Rate changed (emitted before any implied start/stop)
    RateChanged(f32),
}

impl ClockEvent {
    /// Logical time carried by the event, `None` for rate changes
    pub fn time(&self) -> Option<f64> {
        match *self {
            ClockEvent::Sync(t)
            | ClockEvent::BoundaryCheck(t)
            | ClockEvent::SeekPlayback(t)
            | ClockEvent::ForceSync(t)
            | ClockEvent::Started(t)
            | ClockEvent::Stopped(t) => Some(t),
            ClockEvent::RateChanged(_) => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ClockEvent::Sync(_) => "sync",
            ClockEvent::BoundaryCheck(_) => "boundary-check",
            ClockEvent::SeekPlayback(_) => "seek-playback",
            ClockEvent::ForceSync(_) => "force-sync",
            ClockEvent::Started(_) => "started",
            ClockEvent::Stopped(_) => "stopped",
            ClockEvent::RateChanged(_) => "rate-changed",
        }
    }
}

/// Periodic tick kinds driven by the clock's ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickKind {
    /// Low-frequency drift-correction tick
    Sync,
    /// High-frequency region boundary tick
    BoundaryCheck,
    /// High-frequency tick for seek-driven playback
    SeekPlayback,
}

/// Receiver of clock events.
///
/// Events are delivered while the clock's lock is held. A listener must
/// return quickly and must not call back into the clock that notified it:
/// doing so deadlocks. Forward the event somewhere else (see
/// [`ChannelListener`]) if it needs to drive the clock.
pub trait ClockListener: Send + Sync {
    /// Single dispatch point. The default routes to the per-kind callbacks.
    fn on_clock_event(&self, event: ClockEvent) {
        match event {
            ClockEvent::Sync(t) | ClockEvent::ForceSync(t) => self.on_sync(t),
            ClockEvent::Started(t) => self.on_start(t),
            ClockEvent::Stopped(t) => self.on_stop(t),
            ClockEvent::RateChanged(r) => self.on_rate_change(r),
            ClockEvent::BoundaryCheck(_) | ClockEvent::SeekPlayback(_) => {}
        }
    }

    /// Periodic or forced sync
    fn on_sync(&self, _time_ms: f64) {}

    /// Clock started
    fn on_start(&self, _time_ms: f64) {}

    /// Clock stopped
    fn on_stop(&self, _time_ms: f64) {}

    /// Rate changed
    fn on_rate_change(&self, _rate: f32) {}
}

impl<F> ClockListener for F
where
    F: Fn(ClockEvent) + Send + Sync,
{
    fn on_clock_event(&self, event: ClockEvent) {
        self(event)
    }
}

/// Listener that forwards every event into a channel.
///
/// Lets a consumer on another thread react to events, including by calling
/// back into the clock, without re-entering it from the callback.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: Sender<ClockEvent>,
}

impl ChannelListener {
    /// Wrap a sender
    pub fn new(sender: Sender<ClockEvent>) -> Self {
        ChannelListener { sender }
    }
}

impl ClockListener for ChannelListener {
    fn on_clock_event(&self, event: ClockEvent) {
        // A dropped receiver means nobody is interested any more
        let _ = self.sender.send(event);
    }
}
