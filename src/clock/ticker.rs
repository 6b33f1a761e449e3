//! Periodic Ticker
//!
//! One background thread per clock that fires a set of fixed-rate schedules.
//! Shutdown is signalled by dropping a channel sender, which wakes the
//! thread out of its deadline wait immediately.

use super::event::TickKind;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default sync tick interval in milliseconds
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 2000;

/// Default boundary-check tick interval in milliseconds
pub const DEFAULT_BOUNDARY_CHECK_INTERVAL_MS: u64 = 100;

/// Default seek-playback tick interval in milliseconds (about 32 frames per second)
pub const DEFAULT_SEEK_PLAYBACK_INTERVAL_MS: u64 = 31;

/// Intervals of the three tick kinds. `None` disables a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickIntervals {
    /// Sync tick period
    pub sync: Duration,
    /// Boundary-check tick period
    pub boundary_check: Option<Duration>,
    /// Seek-playback tick period
    pub seek_playback: Option<Duration>,
}

impl TickIntervals {
    /// Only the sync tick
    pub fn sync_only(sync: Duration) -> Self {
        TickIntervals {
            sync,
            boundary_check: None,
            seek_playback: None,
        }
    }

    fn schedules(&self) -> Vec<(TickKind, Duration)> {
        let mut out = vec![(TickKind::Sync, self.sync)];
        if let Some(interval) = self.boundary_check {
            out.push((TickKind::BoundaryCheck, interval));
        }
        if let Some(interval) = self.seek_playback {
            out.push((TickKind::SeekPlayback, interval));
        }
        // A zero period would spin
        out.retain(|(_, interval)| !interval.is_zero());
        out
    }
}

impl Default for TickIntervals {
    fn default() -> Self {
        TickIntervals {
            sync: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
            boundary_check: Some(Duration::from_millis(DEFAULT_BOUNDARY_CHECK_INTERVAL_MS)),
            seek_playback: Some(Duration::from_millis(DEFAULT_SEEK_PLAYBACK_INTERVAL_MS)),
        }
    }
}

/// Handle to a running ticker thread; stops and joins on drop
#[derive(Debug)]
pub(crate) struct Ticker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn the ticker thread.
    ///
    /// `on_tick` runs on the ticker thread for every due schedule and returns
    /// `false` to end the thread (the clock it serves is gone).
    pub(crate) fn spawn<F>(
        name: &str,
        intervals: TickIntervals,
        on_tick: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(TickKind) -> bool + Send + 'static,
    {
        let (shutdown, signal) = crossbeam_channel::bounded::<()>(0);
        let schedules = intervals.schedules();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(signal, schedules, on_tick))?;

        Ok(Ticker {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to finish
    pub(crate) fn stop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            // The last clock handle may be released from inside a tick
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<F>(signal: Receiver<()>, schedules: Vec<(TickKind, Duration)>, mut on_tick: F)
where
    F: FnMut(TickKind) -> bool,
{
    let start = Instant::now();
    let mut due: Vec<Instant> = schedules.iter().map(|(_, interval)| start + *interval).collect();

    loop {
        let Some((slot, deadline)) = due.iter().copied().enumerate().min_by_key(|(_, at)| *at)
        else {
            // Nothing scheduled; park until shutdown
            let _ = signal.recv();
            return;
        };

        match signal.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => {
                let (kind, interval) = schedules[slot];
                // Fixed rate; ticks missed while a handler ran late are skipped, not replayed
                let now = Instant::now();
                while due[slot] <= now {
                    due[slot] += interval;
                }
                if !on_tick(kind) {
                    log::trace!("ticker: clock released, exiting");
                    return;
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
