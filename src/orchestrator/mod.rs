//! Playback Orchestration
//!
//! [`PlaybackOrchestrator`] is the single context object a host builds: it
//! owns the master clock, the shuttle ladder, the frame-rate aggregator and
//! every attached stream, and maps user actions (play, pause, shuttle, jog,
//! go back, region of interest) onto them.
//!
//! The clock reports through a channel. Events are drained either by a
//! worker thread ([`Driver::Threaded`]) or by the host calling
//! [`PlaybackOrchestrator::process_pending`] ([`Driver::Manual`]). Draining
//! an event snapshots the clock, enforces the region bounds, reconciles every
//! stream and finally relays the event to UI listeners.

mod transport;

pub use transport::{jog_delta, JogStride, TransportState};

use crate::clock::{ChannelListener, ClockEvent, ClockListener, MasterClock, TickKind};
use crate::config::SyncConfig;
use crate::frame_rate::FrameRateAggregator;
use crate::rate_ladder::RateLadder;
use crate::stream::{Stream, StreamId};
use crate::sync::{BindingStats, StreamBinding, Synchronizer};
use crate::time_source::{SystemTimeSource, TimeSource};
use crate::{PlaysyncError, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use transport::Transport;

/// Who drains clock events and drives the ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Driver {
    /// A ticker thread and a sync worker thread run in the background
    #[default]
    Threaded,
    /// The host calls [`PlaybackOrchestrator::tick`] and
    /// [`PlaybackOrchestrator::process_pending`] itself
    Manual,
}

/// State reachable from the sync worker
struct OrchestratorShared {
    config: SyncConfig,
    clock: MasterClock,
    ladder: RateLadder,
    frame_rates: Mutex<FrameRateAggregator>,
    synchronizer: Mutex<Synchronizer>,
    bindings: Mutex<Vec<StreamBinding>>,
    transport: Mutex<Transport>,
    events: Receiver<ClockEvent>,
    ui_listeners: RwLock<Vec<Arc<dyn ClockListener>>>,
    /// Serializes event processing with direct stream commands.
    /// Lock order: processing, synchronizer, bindings, then frame_rates or transport.
    processing: Mutex<()>,
}

impl OrchestratorShared {
    fn process(&self, event: ClockEvent) {
        {
            let _processing = self.processing.lock();

            let mut snapshot = self.clock.snapshot();
            if let Some(target) = Synchronizer::boundary_action(&snapshot) {
                debug!(
                    "orchestrator: {:.1} ms is past the region [{}, {}], holding at {}",
                    snapshot.time, snapshot.min_time, snapshot.max_time, target
                );
                self.clock.stop();
                self.clock.force_time(target as f64);
                snapshot = self.clock.snapshot();
            }

            let mut synchronizer = self.synchronizer.lock();
            let mut bindings = self.bindings.lock();
            synchronizer.reconcile(&mut bindings, event, &snapshot);
        }

        // Relayed with every lock released so listeners may call back in
        let listeners: Vec<Arc<dyn ClockListener>> = self.ui_listeners.read().clone();
        for listener in listeners {
            listener.on_clock_event(event);
        }
    }

    fn drain(&self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.events.try_recv() {
            self.process(event);
            processed += 1;
        }
        processed
    }

    /// Region from the attached streams: `[0, latest stream end]`
    fn automatic_region(bindings: &[StreamBinding]) -> (i64, i64) {
        match bindings.iter().map(StreamBinding::end).max() {
            Some(end) => (0, end.max(0)),
            None => (0, i64::MAX),
        }
    }

    fn refresh_region(&self, bindings: &[StreamBinding]) {
        let explicit = self.transport.lock().region_of_interest;
        let (min, max) = explicit.unwrap_or_else(|| Self::automatic_region(bindings));
        self.clock.set_region(min, max);
    }
}

/// Background thread draining clock events
struct SyncWorker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncWorker {
    fn spawn(shared: Arc<OrchestratorShared>) -> std::io::Result<Self> {
        let (shutdown, signal) = crossbeam_channel::bounded::<()>(0);
        let events = shared.events.clone();
        let handle = thread::Builder::new()
            .name("playsync-sync".to_string())
            .spawn(move || loop {
                crossbeam_channel::select! {
                    recv(events) -> event => match event {
                        Ok(event) => shared.process(event),
                        Err(_) => return,
                    },
                    recv(signal) -> _ => return,
                }
            })?;
        Ok(SyncWorker {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            // A UI listener may release the last orchestrator handle on the worker itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("orchestrator: sync worker panicked");
            }
        }
    }
}

/// Playback controller for a set of streams on one timeline
pub struct PlaybackOrchestrator {
    shared: Arc<OrchestratorShared>,
    driver: Driver,
    worker: Mutex<Option<SyncWorker>>,
    next_stream_id: AtomicU64,
}

impl PlaybackOrchestrator {
    /// Build an orchestrator reading the system clock
    pub fn new(config: SyncConfig, driver: Driver) -> Result<Self> {
        Self::with_time_source(config, driver, Arc::new(SystemTimeSource::new()))
    }

    /// Build an orchestrator reading wall time from `time_source`.
    ///
    /// Validates the configuration and, for [`Driver::Threaded`], spawns the
    /// ticker and the sync worker.
    pub fn with_time_source(
        config: SyncConfig,
        driver: Driver,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate()?;
        let ladder = config.ladder()?;

        let clock =
            MasterClock::with_time_source(time_source).with_rate_bounds(ladder.min(), ladder.max());
        let (sender, events) = crossbeam_channel::unbounded();
        clock.add_listener(Arc::new(ChannelListener::new(sender)));

        let shared = Arc::new(OrchestratorShared {
            synchronizer: Mutex::new(Synchronizer::from_config(&config)),
            config,
            clock,
            ladder,
            frame_rates: Mutex::new(FrameRateAggregator::new()),
            bindings: Mutex::new(Vec::new()),
            transport: Mutex::new(Transport::new()),
            events,
            ui_listeners: RwLock::new(Vec::new()),
            processing: Mutex::new(()),
        });

        let orchestrator = PlaybackOrchestrator {
            shared,
            driver,
            worker: Mutex::new(None),
            next_stream_id: AtomicU64::new(1),
        };

        if driver == Driver::Threaded {
            let worker = SyncWorker::spawn(Arc::clone(&orchestrator.shared)).map_err(|e| {
                log::error!("orchestrator: failed to spawn sync worker: {}", e);
                PlaysyncError::from(e)
            })?;
            *orchestrator.worker.lock() = Some(worker);
            orchestrator
                .shared
                .clock
                .start_ticker(orchestrator.shared.config.tick_intervals())?;
        }

        info!("orchestrator: ready ({:?} driver)", driver);
        Ok(orchestrator)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The master clock
    pub fn clock(&self) -> &MasterClock {
        &self.shared.clock
    }

    /// Active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Shuttle ladder
    pub fn ladder(&self) -> &RateLadder {
        &self.shared.ladder
    }

    /// Driver in use
    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Current logical time
    pub fn current_time(&self) -> f64 {
        self.shared.clock.get_time()
    }

    /// Current clock rate
    pub fn rate(&self) -> f32 {
        self.shared.clock.get_rate()
    }

    /// Whether the clock is stopped
    pub fn is_stopped(&self) -> bool {
        self.shared.clock.is_stopped()
    }

    /// Transport state; `Stopped` whenever the clock is
    pub fn transport_state(&self) -> TransportState {
        if self.shared.clock.is_stopped() {
            TransportState::Stopped
        } else {
            self.shared.transport.lock().mode
        }
    }

    /// Rate a pause would resume at
    pub fn pause_rate(&self) -> Option<f32> {
        self.shared.transport.lock().pause_rate
    }

    /// Active region `(min, max)`
    pub fn region(&self) -> (i64, i64) {
        (self.shared.clock.min_time(), self.shared.clock.max_time())
    }

    /// Ids of the attached streams, in attach order
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.shared.bindings.lock().iter().map(StreamBinding::id).collect()
    }

    /// Number of attached streams
    pub fn stream_count(&self) -> usize {
        self.shared.bindings.lock().len()
    }

    /// Command counters of a stream
    pub fn binding_stats(&self, id: StreamId) -> Option<BindingStats> {
        self.with_binding(id, StreamBinding::stats)
    }

    /// Run `f` on the binding of `id`
    pub fn with_binding<R>(
        &self,
        id: StreamId,
        f: impl FnOnce(&StreamBinding) -> R,
    ) -> Option<R> {
        self.shared.bindings.lock().iter().find(|b| b.id() == id).map(f)
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    /// Fire one clock tick by hand
    pub fn tick(&self, kind: TickKind) {
        self.shared.clock.tick(kind);
    }

    /// Drain and process every queued clock event on the calling thread.
    /// Returns the number of events processed.
    pub fn process_pending(&self) -> usize {
        self.shared.drain()
    }

    /// Register a UI listener. It receives each event after the streams
    /// have been reconciled, outside every lock, so it may call back in.
    pub fn add_listener(&self, listener: Arc<dyn ClockListener>) {
        self.shared.ui_listeners.write().push(listener);
    }

    /// Stop the ticker and the sync worker. Idempotent.
    pub fn shutdown(&self) {
        self.shared.clock.stop_ticker();
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop();
            info!("orchestrator: shut down");
        }
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Play forward at 1x. From the region end (or outside the region)
    /// playback restarts at the region start.
    pub fn play(&self) {
        info!("orchestrator: play");
        self.play_at_rate(1.0, TransportState::Playing(1.0));
    }

    /// Play at the ladder rate nearest `rate`
    pub fn play_at(&self, rate: f32) {
        let snapped = self.shared.ladder.nearest(rate);
        if snapped != rate {
            warn!("orchestrator: rate {} is not on the ladder, using {}", rate, snapped);
        }
        info!("orchestrator: play at {}", snapped);
        self.play_at_rate(snapped, TransportState::Playing(snapped));
    }

    /// Shuttle forward at the fastest ladder rate
    pub fn fast_forward(&self) {
        let rate = self.shared.ladder.max();
        info!("orchestrator: fast forward ({})", rate);
        self.play_at_rate(rate, TransportState::shuttle(&self.shared.ladder, rate));
    }

    /// Shuttle backwards at the fastest reverse ladder rate
    pub fn rewind(&self) {
        let rate = self.shared.ladder.min();
        info!("orchestrator: rewind ({})", rate);
        self.play_at_rate(rate, TransportState::shuttle(&self.shared.ladder, rate));
    }

    fn play_at_rate(&self, rate: f32, mode: TransportState) {
        if rate.abs() < f32::EPSILON {
            self.stop();
            return;
        }

        let snapshot = self.shared.clock.snapshot();
        let outside = snapshot.time >= snapshot.max_time as f64
            || snapshot.time < snapshot.min_time as f64;
        if rate > 0.0 && outside {
            self.shared.clock.stop();
            self.shared.clock.force_time(snapshot.min_time as f64);
        }

        {
            let mut transport = self.shared.transport.lock();
            transport.pause_rate = None;
            transport.mode = mode;
        }
        self.shared.clock.set_rate(rate);
    }

    /// Pause if running, remembering the rate; resume at that rate if stopped
    pub fn pause(&self) {
        if self.shared.clock.is_stopped() {
            let (rate, mode) = {
                let mut transport = self.shared.transport.lock();
                let rate = match transport.pause_rate.take() {
                    Some(rate) if rate.abs() >= f32::EPSILON => rate,
                    _ => 1.0,
                };
                if transport.mode.rate(&self.shared.ladder) != rate {
                    transport.mode = TransportState::Playing(rate);
                }
                (rate, transport.mode)
            };
            info!("orchestrator: resume at {} ({:?})", rate, mode);
            self.shared.clock.set_rate(rate);
        } else {
            let rate = self.shared.clock.get_rate();
            self.shared.transport.lock().pause_rate = Some(rate);
            info!("orchestrator: pause (rate {})", rate);
            self.shared.clock.stop();
        }
    }

    /// Stop and forget the pause rate
    pub fn stop(&self) {
        info!("orchestrator: stop");
        {
            let mut transport = self.shared.transport.lock();
            transport.pause_rate = None;
            transport.mode = TransportState::Stopped;
        }
        self.shared.clock.stop();
    }

    /// Start if stopped, stop if running
    pub fn toggle(&self) {
        if self.shared.clock.is_stopped() {
            self.pause();
        } else {
            self.stop();
        }
    }

    /// Move one ladder step toward faster forward playback
    pub fn shuttle_forward(&self) {
        self.shuttle(1);
    }

    /// Move one ladder step toward faster reverse playback
    pub fn shuttle_back(&self) {
        self.shuttle(-1);
    }

    /// Move `steps` ladder entries; the sign picks the direction.
    ///
    /// A running clock shuttles from its rate, a stopped one from the pause
    /// rate or 0. Landing on 0 stops the clock.
    pub fn shuttle(&self, steps: i32) {
        let current = if self.shared.clock.is_stopped() {
            self.shared.transport.lock().pause_rate.unwrap_or(0.0)
        } else {
            self.shared.clock.get_rate()
        };
        let next = self.shared.ladder.next(current, steps);
        info!("orchestrator: shuttle {} -> {}", current, next);

        if next.abs() < f32::EPSILON {
            self.stop();
            return;
        }
        {
            let mut transport = self.shared.transport.lock();
            transport.pause_rate = None;
            transport.mode = TransportState::shuttle(&self.shared.ladder, next);
        }
        self.shared.clock.set_rate(next);
    }

    /// Needle move: stop, then force the clock to `time` clamped into the region
    pub fn seek(&self, time: i64) {
        let target = self.shared.clock.to_range(time as f64);
        info!("orchestrator: seek to {:.0} ms", target);
        self.shared.clock.stop();
        self.shared.clock.force_time(target);
    }

    /// Go to `time` clamped into the region, keeping the clock running if it is
    pub fn jump_to(&self, time: i64) {
        let target = self.shared.clock.to_range(time as f64);
        info!("orchestrator: jump to {:.0} ms", target);
        self.shared.clock.force_time(target);
    }

    /// Stop and move back by `delta_ms`, clamped to the region start. Does not resume.
    pub fn go_back(&self, delta_ms: i64) {
        self.shared.clock.stop();
        let target = self.shared.clock.to_range(self.shared.clock.get_time() - delta_ms as f64);
        info!("orchestrator: go back {} ms to {:.0} ms", delta_ms, target);
        self.shared.clock.force_time(target);
    }

    // ------------------------------------------------------------------
    // Jog
    // ------------------------------------------------------------------

    /// One-frame jog forward
    pub fn jog_forward(&self) -> Option<i64> {
        self.jog(JogStride::Frame, true)
    }

    /// One-frame jog backward
    pub fn jog_back(&self) -> Option<i64> {
        self.jog(JogStride::Frame, false)
    }

    /// Jog forward by a stride
    pub fn jog_forward_by(&self, stride: JogStride) -> Option<i64> {
        self.jog(stride, true)
    }

    /// Jog backward by a stride
    pub fn jog_back_by(&self, stride: JogStride) -> Option<i64> {
        self.jog(stride, false)
    }

    /// Length of one jog frame in milliseconds, `None` when jogging is undefined
    pub fn jog_step_ms(&self) -> Option<i64> {
        self.shared
            .frame_rates
            .lock()
            .step_ms()
            .or(self.shared.config.jog_fallback_step_ms)
    }

    /// Jog `stride` frames in a direction. Returns the new time, or `None`
    /// when nothing moved.
    ///
    /// Pressed while running, a jog only stops the clock. Without a known
    /// frame rate or fallback step it is a no-op.
    fn jog(&self, stride: JogStride, forward: bool) -> Option<i64> {
        if !self.shared.clock.is_stopped() {
            info!("orchestrator: jog while running, stopping");
            self.stop();
            return None;
        }

        let _processing = self.shared.processing.lock();
        let (step, effective_fps) = {
            let frame_rates = self.shared.frame_rates.lock();
            (
                frame_rates.step_ms().or(self.shared.config.jog_fallback_step_ms),
                frame_rates.effective_rate(),
            )
        };
        let Some(step) = step else {
            debug!("orchestrator: jog ignored, no frame rate known");
            return None;
        };

        let frames = stride.frames(&self.shared.config);
        let snapshot = self.shared.clock.snapshot();
        let now = snapshot.time.floor() as i64;
        let delta = jog_delta(now, step, frames, forward);
        let target = now + delta;
        info!(
            "orchestrator: jog {} {} frame(s) of {} ms to {}",
            if forward { "forward" } else { "back" },
            frames,
            step,
            target
        );

        // Never jog past the region; land on its bound instead
        let past_bound = if forward {
            target >= snapshot.max_time
        } else {
            target <= snapshot.min_time
        };
        self.shared.transport.lock().pause_rate = None;
        let target = if past_bound {
            let bound = if forward { snapshot.max_time } else { snapshot.min_time };
            self.shared.clock.force_time(bound as f64);
            bound
        } else {
            self.shared.clock.set_time(target as f64);
            target
        };

        // Exact single-frame moves may use the stream's own stepping
        let native_step = !past_bound && frames == 1 && delta.abs() == step;
        let mut bindings = self.shared.bindings.lock();
        for binding in bindings.iter_mut().filter(|b| b.spans(target as f64)) {
            let can_step = native_step
                && binding.contains(target as f64)
                && binding.stream().is_step_enabled()
                && (binding.frame_rate() - effective_fps).abs() <= f32::EPSILON;
            let stepped = can_step
                && match forward {
                    true => binding.step_forward(),
                    false => binding.step_backward(),
                };
            if !stepped {
                let local = binding.local_time(target as f64);
                binding.set_current_time(local);
            }
        }
        Some(target)
    }

    // ------------------------------------------------------------------
    // Frame rate
    // ------------------------------------------------------------------

    /// Effective jog frame rate
    pub fn effective_frame_rate(&self) -> f32 {
        self.shared.frame_rates.lock().effective_rate()
    }

    /// Use `fps` for jogs regardless of the attached streams.
    ///
    /// A negative or non-finite rate is ignored and jogs follow the streams
    /// again. Returns whether the override was taken.
    pub fn set_frame_rate_override(&self, fps: f32) -> bool {
        let taken = self.shared.frame_rates.lock().set_user_override(fps);
        if taken {
            info!("orchestrator: jog frame rate override {}", fps);
        } else {
            warn!(
                "orchestrator: invalid jog frame rate override {}, following the streams",
                fps
            );
        }
        taken
    }

    /// Size jogs from the attached streams again
    pub fn clear_frame_rate_override(&self) {
        info!("orchestrator: jog frame rate override cleared");
        self.shared.frame_rates.lock().clear_user_override();
    }

    // ------------------------------------------------------------------
    // Region of interest
    // ------------------------------------------------------------------

    /// Restrict playback to `[start, end]`; the next boundary evaluation clamps
    pub fn set_region_of_interest(&self, start: i64, end: i64) {
        let region = if start <= end { (start, end) } else { (end, start) };
        info!("orchestrator: region of interest [{}, {}]", region.0, region.1);
        self.shared.transport.lock().region_of_interest = Some(region);
        self.shared.clock.set_region(region.0, region.1);
    }

    /// Follow the attached streams again
    pub fn clear_region_of_interest(&self) {
        info!("orchestrator: region of interest cleared");
        self.shared.transport.lock().region_of_interest = None;
        let bindings = self.shared.bindings.lock();
        self.shared.refresh_region(&bindings);
    }

    // ------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------

    /// Attach a stream and align it with the clock
    pub fn attach_stream(&self, stream: Box<dyn Stream>) -> Result<StreamId> {
        let id = StreamId(self.next_stream_id.fetch_add(1, Ordering::Relaxed));
        let mut binding = StreamBinding::new(id, stream)?;

        let _processing = self.shared.processing.lock();
        let synchronizer = self.shared.synchronizer.lock();
        let mut bindings = self.shared.bindings.lock();

        self.shared.frame_rates.lock().add_stream(id, binding.frame_rate());
        let snapshot = self.shared.clock.snapshot();
        synchronizer.attach(&mut binding, &snapshot);
        info!(
            "orchestrator: attached {} at offset {} ({} ms, {} fps)",
            id,
            binding.offset(),
            binding.duration(),
            binding.frame_rate()
        );
        bindings.push(binding);
        self.shared.refresh_region(&bindings);
        Ok(id)
    }

    /// Detach a stream, stopping it if it plays, and hand it back
    pub fn detach_stream(&self, id: StreamId) -> Result<Box<dyn Stream>> {
        let _processing = self.shared.processing.lock();
        let synchronizer = self.shared.synchronizer.lock();
        let mut bindings = self.shared.bindings.lock();

        let index = bindings
            .iter()
            .position(|b| b.id() == id)
            .ok_or(PlaysyncError::UnknownStream(id))?;
        let mut binding = bindings.remove(index);
        synchronizer.detach(&mut binding);
        self.shared.frame_rates.lock().remove_stream(id);
        self.shared.refresh_region(&bindings);
        info!("orchestrator: detached {}", id);
        Ok(binding.into_stream())
    }

    /// Move a stream on the timeline (carriage drag)
    pub fn set_stream_offset(&self, id: StreamId, offset: i64) -> Result<()> {
        let _processing = self.shared.processing.lock();
        let mut bindings = self.shared.bindings.lock();

        let binding = bindings
            .iter_mut()
            .find(|b| b.id() == id)
            .ok_or(PlaysyncError::UnknownStream(id))?;
        binding.set_offset(offset);
        info!("orchestrator: {} moved to offset {}", id, offset);

        let snapshot = self.shared.clock.snapshot();
        if !snapshot.running && binding.contains(snapshot.time) {
            let local = binding.local_time(snapshot.time);
            binding.seek_to(local);
        }
        self.shared.refresh_region(&bindings);
        Ok(())
    }
}

impl Drop for PlaybackOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PlaybackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackOrchestrator")
            .field("driver", &self.driver)
            .field("clock", &self.shared.clock)
            .field("streams", &self.stream_count())
            .finish()
    }
}
