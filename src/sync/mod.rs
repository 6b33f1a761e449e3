//! Stream Synchronization
//!
//! Reconciles every [`StreamBinding`] against one clock event. The caller
//! takes a [`ClockSnapshot`] first and releases the clock before calling
//! [`Synchronizer::reconcile`], so stream I/O never runs under the clock lock.
//!
//! Per binding, on every event that re-evaluates playback:
//!
//! - **start**: clock running, time in `[offset, offset + duration)`, before
//!   the region end, stream not playing, native mode: seek then play.
//! - **stop**: stream playing and the clock stopped, time outside the stream,
//!   or at/after the region end: stop.
//! - **drift** (sync tick only, playing streams): if the stream's local time
//!   is off by at least the threshold, set it exactly.
//!
//! Above the fake-playback cutoff native playback is switched off and the
//! stream is moved by seeks keyed off the clock's ticks instead.

mod binding;

pub use binding::{BindingStats, PlaybackMode, StreamBinding};

use crate::clock::{ClockEvent, ClockSnapshot};
use crate::config::SyncConfig;
use log::{debug, trace};

/// Drift-correction and fake-playback policy plus the last propagated rate
#[derive(Debug, Clone)]
pub struct Synchronizer {
    drift_threshold_ms: f64,
    scale_threshold_with_rate: bool,
    fake_playback_cutoff: f32,
    seek_driven_reverse: bool,
    rate: f32,
    mode: PlaybackMode,
}

impl Synchronizer {
    /// Create a synchronizer with an explicit drift threshold and fake-playback cutoff
    pub fn new(drift_threshold_ms: f64, fake_playback_cutoff: f32) -> Self {
        Synchronizer {
            drift_threshold_ms,
            scale_threshold_with_rate: true,
            fake_playback_cutoff,
            seek_driven_reverse: false,
            rate: 1.0,
            mode: PlaybackMode::Native,
        }
    }

    /// Create a synchronizer from configuration
    pub fn from_config(config: &SyncConfig) -> Self {
        Synchronizer {
            drift_threshold_ms: config.drift_threshold_ms,
            scale_threshold_with_rate: config.scale_threshold_with_rate,
            fake_playback_cutoff: config.fake_playback_cutoff,
            seek_driven_reverse: config.seek_driven_reverse,
            rate: 1.0,
            mode: PlaybackMode::Native,
        }
    }

    /// Last rate propagated to the streams
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Mode new and existing bindings are in
    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Drift tolerance at `rate`: the base threshold, times `|rate|` above 1x
    /// when scaling is enabled
    pub fn threshold_at(&self, rate: f32) -> f64 {
        if self.scale_threshold_with_rate {
            self.drift_threshold_ms * f64::from(rate.abs()).max(1.0)
        } else {
            self.drift_threshold_ms
        }
    }

    /// Playback mode a rate calls for
    pub fn mode_for(&self, rate: f32) -> PlaybackMode {
        if rate.abs() > self.fake_playback_cutoff || (self.seek_driven_reverse && rate < 0.0) {
            PlaybackMode::SeekDriven
        } else {
            PlaybackMode::Native
        }
    }

    /// Where the clock must be forced to keep it inside its region, if anywhere.
    ///
    /// Outside `[min, max]` the nearest bound is returned. A running clock
    /// that has reached the bound it is moving toward also gets that bound.
    pub fn boundary_action(snapshot: &ClockSnapshot) -> Option<i64> {
        let time = snapshot.time;
        let (min, max) = (snapshot.min_time as f64, snapshot.max_time as f64);
        if time > max {
            return Some(snapshot.max_time);
        }
        if time < min {
            return Some(snapshot.min_time);
        }
        if snapshot.running && snapshot.rate > 0.0 && time >= max {
            return Some(snapshot.max_time);
        }
        if snapshot.running && snapshot.rate < 0.0 && time <= min {
            return Some(snapshot.min_time);
        }
        None
    }

    /// Apply one clock event to every binding
    pub fn reconcile(
        &mut self,
        bindings: &mut [StreamBinding],
        event: ClockEvent,
        snapshot: &ClockSnapshot,
    ) {
        trace!("sync: {} at {:.1} ms, {} binding(s)", event.name(), snapshot.time, bindings.len());
        for binding in bindings.iter_mut() {
            binding.refresh();
        }

        match event {
            ClockEvent::RateChanged(rate) => {
                self.propagate_rate(bindings, rate, snapshot);
                self.evaluate_all(bindings, snapshot);
            }
            ClockEvent::Started(_) | ClockEvent::BoundaryCheck(_) => {
                self.evaluate_all(bindings, snapshot);
            }
            ClockEvent::Sync(_) => {
                self.evaluate_all(bindings, snapshot);
                match self.mode {
                    PlaybackMode::Native => self.correct_drift(bindings, snapshot),
                    PlaybackMode::SeekDriven => Self::seek_in_range(bindings, snapshot),
                }
            }
            ClockEvent::Stopped(_) => {
                self.evaluate_all(bindings, snapshot);
                // Paused frames must match the clock exactly
                Self::seek_in_range(bindings, snapshot);
            }
            ClockEvent::ForceSync(_) => {
                Self::seek_in_range(bindings, snapshot);
                self.evaluate_all(bindings, snapshot);
            }
            ClockEvent::SeekPlayback(_) => {
                if self.mode == PlaybackMode::SeekDriven {
                    Self::seek_in_range(bindings, snapshot);
                }
            }
        }
    }

    /// Align a freshly attached binding with the current clock
    pub fn attach(&self, binding: &mut StreamBinding, snapshot: &ClockSnapshot) {
        binding.set_mode(self.mode);
        binding.set_rate(self.rate);
        if snapshot.running {
            self.evaluate(binding, snapshot);
        } else if binding.contains(snapshot.time) {
            let local = binding.local_time(snapshot.time);
            binding.seek_to(local);
        }
    }

    /// Halt a binding that is about to be dropped
    pub fn detach(&self, binding: &mut StreamBinding) {
        binding.refresh();
        if binding.is_playing() {
            binding.stop();
        }
    }

    fn propagate_rate(
        &mut self,
        bindings: &mut [StreamBinding],
        rate: f32,
        snapshot: &ClockSnapshot,
    ) {
        let mode = self.mode_for(rate);
        if mode != self.mode {
            debug!("sync: rate {} switches playback to {:?}", rate, mode);
        }
        self.rate = rate;
        self.mode = mode;

        for binding in bindings.iter_mut() {
            binding.set_rate(rate);
            if mode == PlaybackMode::SeekDriven && binding.is_playing() {
                binding.stop();
            }
            binding.set_mode(mode);
        }

        // Seek-driven streams jump to the clock now; native ones restart
        // through the start condition
        if mode == PlaybackMode::SeekDriven && snapshot.running {
            Self::seek_in_range(bindings, snapshot);
        }
    }

    fn evaluate_all(&self, bindings: &mut [StreamBinding], snapshot: &ClockSnapshot) {
        for binding in bindings.iter_mut() {
            self.evaluate(binding, snapshot);
        }
    }

    fn evaluate(&self, binding: &mut StreamBinding, snapshot: &ClockSnapshot) {
        let time = snapshot.time;
        let before_end = time < snapshot.max_time as f64;

        if binding.is_playing() {
            let should_stop = !snapshot.running
                || !binding.contains(time)
                || !before_end
                || binding.mode() == PlaybackMode::SeekDriven;
            if should_stop {
                debug!("sync: stopping {} at {:.1} ms", binding.id(), time);
                binding.stop();
            }
        } else if snapshot.running
            && binding.mode() == PlaybackMode::Native
            && binding.contains(time)
            && before_end
        {
            let local = binding.local_time(time);
            debug!("sync: starting {} at local {} ms", binding.id(), local);
            if binding.seek_to(local) {
                binding.play();
            }
        }
    }

    fn correct_drift(&self, bindings: &mut [StreamBinding], snapshot: &ClockSnapshot) {
        let threshold = self.threshold_at(snapshot.rate);
        for binding in bindings.iter_mut().filter(|b| b.is_playing()) {
            let track = binding.local_time(snapshot.time);
            let drift = (track - binding.stream().current_time()).abs() as f64;
            if drift >= threshold {
                debug!(
                    "sync: {} drifted {} ms (threshold {:.0}), resyncing to {}",
                    binding.id(),
                    drift,
                    threshold,
                    track
                );
                if binding.set_current_time(track) {
                    binding.record_correction();
                }
            }
        }
    }

    fn seek_in_range(bindings: &mut [StreamBinding], snapshot: &ClockSnapshot) {
        for binding in bindings.iter_mut().filter(|b| b.contains(snapshot.time)) {
            let local = binding.local_time(snapshot.time);
            binding.seek_to(local);
        }
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::mock::{Call, CallLog, MockStream};
    use crate::stream::StreamId;

    fn snapshot(time: f64, rate: f32, running: bool) -> ClockSnapshot {
        ClockSnapshot {
            time,
            rate,
            running,
            min_time: 0,
            max_time: i64::MAX,
        }
    }

    fn bind(id: u64, offset: i64, duration: i64) -> (StreamBinding, CallLog) {
        let (stream, calls) = MockStream::new(offset, duration, 30.0);
        (StreamBinding::new(StreamId(id), Box::new(stream)).unwrap(), calls)
    }

    #[test]
    fn test_start_condition_seeks_then_plays() {
        let mut sync = Synchronizer::default();
        let (binding, calls) = bind(1, 1000, 5000);
        let mut bindings = vec![binding];

        sync.reconcile(&mut bindings, ClockEvent::Started(1500.0), &snapshot(1500.0, 1.0, true));
        assert_eq!(*calls.lock(), vec![Call::SeekTo(500), Call::Play]);
        assert!(bindings[0].is_playing());

        // Already playing: nothing more to do
        let snap = snapshot(1600.0, 1.0, true);
        sync.reconcile(&mut bindings, ClockEvent::BoundaryCheck(1600.0), &snap);
        assert_eq!(calls.lock().len(), 2);
    }

    #[test]
    fn test_stream_not_started_outside_its_span() {
        let mut sync = Synchronizer::default();
        let (binding, calls) = bind(1, 1000, 5000);
        let mut bindings = vec![binding];

        sync.reconcile(&mut bindings, ClockEvent::Started(500.0), &snapshot(500.0, 1.0, true));
        sync.reconcile(&mut bindings, ClockEvent::Started(6000.0), &snapshot(6000.0, 1.0, true));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_stop_when_leaving_span_or_clock_stops() {
        let mut sync = Synchronizer::default();
        let (binding, calls) = bind(1, 0, 1000);
        let mut bindings = vec![binding];

        sync.reconcile(&mut bindings, ClockEvent::Started(0.0), &snapshot(0.0, 1.0, true));
        let snap = snapshot(1000.0, 1.0, true);
        sync.reconcile(&mut bindings, ClockEvent::BoundaryCheck(1000.0), &snap);
        assert_eq!(*calls.lock(), vec![Call::SeekTo(0), Call::Play, Call::Stop]);

        calls.lock().clear();
        sync.reconcile(&mut bindings, ClockEvent::Started(10.0), &snapshot(10.0, 1.0, true));
        sync.reconcile(&mut bindings, ClockEvent::Stopped(20.0), &snapshot(20.0, 1.0, false));
        assert_eq!(
            *calls.lock(),
            vec![Call::SeekTo(10), Call::Play, Call::Stop, Call::SeekTo(20)]
        );
    }

    #[test]
    fn test_stop_at_region_end() {
        let mut sync = Synchronizer::default();
        let (binding, calls) = bind(1, 0, 10_000);
        let mut bindings = vec![binding];
        let mut snap = snapshot(100.0, 1.0, true);
        snap.max_time = 2000;

        sync.reconcile(&mut bindings, ClockEvent::Started(100.0), &snap);
        snap.time = 2000.0;
        sync.reconcile(&mut bindings, ClockEvent::BoundaryCheck(2000.0), &snap);
        assert_eq!(calls.lock().last(), Some(&Call::Stop));
    }

    #[test]
    fn test_drift_correction_threshold() {
        let mut sync = Synchronizer::new(50.0, 4.0);
        let (stream, calls) = MockStream::new(0, 10_000, 30.0);
        let mut bindings = vec![StreamBinding::new(StreamId(1), Box::new(stream)).unwrap()];
        sync.reconcile(&mut bindings, ClockEvent::Started(0.0), &snapshot(0.0, 1.0, true));
        calls.lock().clear();

        // 49 ms behind: tolerated
        bindings[0].stream_mut().set_current_time(1951).unwrap();
        calls.lock().clear();
        sync.reconcile(&mut bindings, ClockEvent::Sync(2000.0), &snapshot(2000.0, 1.0, true));
        assert!(calls.lock().is_empty());

        // 50 ms behind: corrected once
        bindings[0].stream_mut().set_current_time(1950).unwrap();
        calls.lock().clear();
        sync.reconcile(&mut bindings, ClockEvent::Sync(2000.0), &snapshot(2000.0, 1.0, true));
        assert_eq!(*calls.lock(), vec![Call::SetCurrentTime(2000)]);
        assert_eq!(bindings[0].stats().corrections, 1);
    }

    #[test]
    fn test_drift_not_corrected_on_boundary_check() {
        let mut sync = Synchronizer::default();
        let (mut stream, calls) = MockStream::new(0, 10_000, 30.0);
        stream.pinned = true;
        let mut bindings = vec![StreamBinding::new(StreamId(1), Box::new(stream)).unwrap()];
        sync.reconcile(&mut bindings, ClockEvent::Started(0.0), &snapshot(0.0, 1.0, true));
        calls.lock().clear();

        let snap = snapshot(900.0, 1.0, true);
        sync.reconcile(&mut bindings, ClockEvent::BoundaryCheck(900.0), &snap);
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_threshold_scales_with_rate() {
        let sync = Synchronizer::new(50.0, 4.0);
        assert_eq!(sync.threshold_at(1.0), 50.0);
        assert_eq!(sync.threshold_at(0.5), 50.0);
        assert_eq!(sync.threshold_at(-2.0), 100.0);

        let config = SyncConfig {
            scale_threshold_with_rate: false,
            ..SyncConfig::default()
        };
        assert_eq!(Synchronizer::from_config(&config).threshold_at(8.0), 50.0);
    }

    #[test]
    fn test_fast_rate_switches_to_seek_driven() {
        let mut sync = Synchronizer::default();
        let (binding, calls) = bind(1, 0, 10_000);
        let mut bindings = vec![binding];
        sync.reconcile(&mut bindings, ClockEvent::Started(100.0), &snapshot(100.0, 1.0, true));
        calls.lock().clear();

        sync.reconcile(&mut bindings, ClockEvent::RateChanged(8.0), &snapshot(100.0, 8.0, true));
        assert_eq!(sync.mode(), PlaybackMode::SeekDriven);
        assert_eq!(bindings[0].mode(), PlaybackMode::SeekDriven);
        assert_eq!(*calls.lock(), vec![Call::SetRate(8.0), Call::Stop, Call::SeekTo(100)]);

        calls.lock().clear();
        sync.reconcile(&mut bindings, ClockEvent::SeekPlayback(900.0), &snapshot(900.0, 8.0, true));
        assert_eq!(*calls.lock(), vec![Call::SeekTo(900)]);

        // Back to native: the start condition restarts the stream
        calls.lock().clear();
        sync.reconcile(&mut bindings, ClockEvent::RateChanged(1.0), &snapshot(950.0, 1.0, true));
        assert_eq!(sync.mode(), PlaybackMode::Native);
        assert_eq!(*calls.lock(), vec![Call::SetRate(1.0), Call::SeekTo(950), Call::Play]);
    }

    #[test]
    fn test_seek_playback_ignored_in_native_mode() {
        let mut sync = Synchronizer::default();
        let (binding, calls) = bind(1, 0, 10_000);
        let mut bindings = vec![binding];
        sync.reconcile(&mut bindings, ClockEvent::SeekPlayback(10.0), &snapshot(10.0, 1.0, true));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_reverse_mode_selection() {
        let sync = Synchronizer::default();
        assert_eq!(sync.mode_for(-1.0), PlaybackMode::Native);
        assert_eq!(sync.mode_for(4.0), PlaybackMode::Native);
        assert_eq!(sync.mode_for(-8.0), PlaybackMode::SeekDriven);

        let config = SyncConfig {
            seek_driven_reverse: true,
            ..SyncConfig::default()
        };
        assert_eq!(Synchronizer::from_config(&config).mode_for(-0.5), PlaybackMode::SeekDriven);
    }

    #[test]
    fn test_force_sync_seeks_exactly_and_stops_out_of_range() {
        let mut sync = Synchronizer::default();
        let (a, calls_a) = bind(1, 0, 1000);
        let (b, calls_b) = bind(2, 2000, 1000);
        let mut bindings = vec![a, b];
        sync.reconcile(&mut bindings, ClockEvent::Started(500.0), &snapshot(500.0, 1.0, true));
        calls_a.lock().clear();

        sync.reconcile(&mut bindings, ClockEvent::ForceSync(2010.0), &snapshot(2010.0, 1.0, true));
        assert_eq!(*calls_a.lock(), vec![Call::Stop]);
        assert_eq!(*calls_b.lock(), vec![Call::SeekTo(10), Call::SeekTo(10), Call::Play]);
    }

    #[test]
    fn test_failing_stream_does_not_affect_others() {
        let mut sync = Synchronizer::default();
        let (mut broken, broken_calls) = MockStream::new(0, 10_000, 25.0);
        broken.failing = true;
        let (healthy, healthy_calls) = MockStream::new(0, 10_000, 25.0);
        let mut bindings = vec![
            StreamBinding::new(StreamId(1), Box::new(broken)).unwrap(),
            StreamBinding::new(StreamId(2), Box::new(healthy)).unwrap(),
        ];

        sync.reconcile(&mut bindings, ClockEvent::Started(0.0), &snapshot(0.0, 1.0, true));
        assert_eq!(*broken_calls.lock(), vec![Call::SeekTo(0)]);
        assert!(!bindings[0].is_playing());
        assert_eq!(bindings[0].stats().failures, 1);
        assert_eq!(*healthy_calls.lock(), vec![Call::SeekTo(0), Call::Play]);
        assert!(bindings[1].is_playing());
    }

    #[test]
    fn test_attach_and_detach() {
        let sync = Synchronizer::default();
        let (mut binding, calls) = bind(1, 0, 1000);
        sync.attach(&mut binding, &snapshot(250.0, 1.0, false));
        assert_eq!(*calls.lock(), vec![Call::SetRate(1.0), Call::SeekTo(250)]);

        calls.lock().clear();
        sync.attach(&mut binding, &snapshot(250.0, 1.0, true));
        assert!(binding.is_playing());

        calls.lock().clear();
        sync.detach(&mut binding);
        assert_eq!(*calls.lock(), vec![Call::Stop]);
        sync.detach(&mut binding);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_boundary_action() {
        let mut snap = snapshot(6000.0, 1.0, false);
        snap.min_time = 1000;
        snap.max_time = 5000;
        assert_eq!(Synchronizer::boundary_action(&snap), Some(5000));

        snap.time = 500.0;
        assert_eq!(Synchronizer::boundary_action(&snap), Some(1000));

        snap.time = 5000.0;
        assert_eq!(Synchronizer::boundary_action(&snap), None);
        snap.running = true;
        assert_eq!(Synchronizer::boundary_action(&snap), Some(5000));
        snap.rate = -1.0;
        assert_eq!(Synchronizer::boundary_action(&snap), None);

        snap.time = 1000.0;
        assert_eq!(Synchronizer::boundary_action(&snap), Some(1000));
    }

    #[test]
    fn test_binding_local_time_clamps() {
        let (binding, _) = bind(1, 1000, 500);
        assert_eq!(binding.local_time(900.0), 0);
        assert_eq!(binding.local_time(1250.7), 250);
        assert_eq!(binding.local_time(9000.0), 500);
        assert!(binding.contains(1000.0));
        assert!(!binding.contains(1500.0));
        assert!(binding.spans(1500.0));
        assert!(!binding.spans(1501.0));
        assert!(!binding.spans(999.0));
        assert_eq!(binding.end(), 1500);
    }

    #[test]
    fn test_binding_rejects_bad_streams() {
        let (stream, _) = MockStream::new(0, -1, 30.0);
        assert!(StreamBinding::new(StreamId(1), Box::new(stream)).is_err());
        let (stream, _) = MockStream::new(0, 100, f32::NAN);
        assert!(StreamBinding::new(StreamId(1), Box::new(stream)).is_err());
    }
}
