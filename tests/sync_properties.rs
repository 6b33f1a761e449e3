//! Behavioural properties of the clock, ladder and synchronizer

mod common;

use approx::assert_abs_diff_eq;
use common::{count, manual_orchestrator, Call, RecordingStream};
use parking_lot::Mutex;
use playsync::{
    ClockEvent, FrameRateAggregator, ManualTimeSource, MasterClock, RateLadder, StreamId, TickKind,
};
use std::sync::Arc;

#[test]
fn ladder_step_up_then_down_never_overshoots() {
    let ladder = RateLadder::default();
    for &rate in ladder.rates() {
        let back = ladder.next(ladder.next(rate, 1), -1);
        assert!(back <= rate, "up/down from {} landed on {}", rate, back);
    }
    assert_eq!(ladder.next(32.0, 1), 32.0);
    assert_eq!(ladder.next(-32.0, -1), -32.0);
}

#[test]
fn ladder_adjacent_pairs_are_one_step_apart() {
    let ladder = RateLadder::default();
    for pair in ladder.rates().windows(2) {
        assert_eq!(ladder.next(pair[0], 1), pair[1]);
        assert_eq!(ladder.next(pair[1], -1), pair[0]);
    }
}

fn recorded_clock() -> (MasterClock, ManualTimeSource, Arc<Mutex<Vec<ClockEvent>>>) {
    let time = ManualTimeSource::new();
    let clock = MasterClock::with_time_source(Arc::new(time.clone()));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    clock.add_listener(Arc::new(move |event: ClockEvent| sink.lock().push(event)));
    (clock, time, events)
}

fn stop_like(events: &[ClockEvent]) -> Vec<ClockEvent> {
    events
        .iter()
        .copied()
        .filter(|e| matches!(e, ClockEvent::Stopped(_)))
        .collect()
}

#[test]
fn set_rate_zero_is_observed_like_stop() {
    let (by_stop, time_a, events_a) = recorded_clock();
    by_stop.start();
    time_a.advance(250.0);
    by_stop.stop();

    let (by_rate, time_b, events_b) = recorded_clock();
    by_rate.start();
    time_b.advance(250.0);
    by_rate.set_rate(0.0);

    assert!(by_stop.is_stopped());
    assert!(by_rate.is_stopped());
    assert_eq!(stop_like(&events_a.lock()), stop_like(&events_b.lock()));
    assert_abs_diff_eq!(by_stop.get_time(), by_rate.get_time(), epsilon = 1e-6);
}

#[test]
fn stop_twice_emits_one_stopped_event() {
    let (clock, _, events) = recorded_clock();
    clock.start();
    clock.stop();
    clock.stop();
    assert_eq!(stop_like(&events.lock()).len(), 1);
}

#[test]
fn two_seconds_in_step_needs_no_correction() {
    let (orchestrator, time) = manual_orchestrator();
    let (stream, calls) = RecordingStream::new(&time, 0, 10_000, 30.0);
    let id = orchestrator.attach_stream(Box::new(stream)).unwrap();

    orchestrator.play();
    orchestrator.process_pending();
    assert_eq!(count(&calls, |c| *c == Call::Play), 1);

    time.advance(2000.0);
    orchestrator.tick(TickKind::Sync);
    orchestrator.process_pending();

    assert_abs_diff_eq!(orchestrator.current_time(), 2000.0, epsilon = 1e-6);
    assert_eq!(count(&calls, |c| matches!(c, Call::SetCurrentTime(_))), 0);
    assert_eq!(orchestrator.binding_stats(id).unwrap().corrections, 0);
}

#[test]
fn pinned_stream_is_corrected_exactly_once() {
    let (orchestrator, time) = manual_orchestrator();
    let (mut stream, calls) = RecordingStream::new(&time, 0, 10_000, 30.0);
    stream.pinned = true;
    let id = orchestrator.attach_stream(Box::new(stream)).unwrap();

    orchestrator.play();
    orchestrator.process_pending();

    time.advance(120.0);
    orchestrator.tick(TickKind::Sync);
    orchestrator.process_pending();

    assert_eq!(
        calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::SetCurrentTime(_)))
            .copied()
            .collect::<Vec<_>>(),
        vec![Call::SetCurrentTime(120)]
    );
    assert_eq!(orchestrator.binding_stats(id).unwrap().corrections, 1);
}

#[test]
fn leaving_the_region_stops_and_clamps() {
    let (orchestrator, time) = manual_orchestrator();
    orchestrator.set_region_of_interest(1000, 5000);

    // Play from before the region starts at the region start
    orchestrator.play();
    orchestrator.process_pending();
    assert_abs_diff_eq!(orchestrator.current_time(), 1000.0);

    time.advance(10.0);
    orchestrator.clock().set_time(6000.0);
    orchestrator.tick(TickKind::Sync);
    orchestrator.process_pending();

    assert!(orchestrator.is_stopped());
    assert_abs_diff_eq!(orchestrator.current_time(), 5000.0);
}

#[test]
fn running_into_the_region_end_stops_there() {
    let (orchestrator, time) = manual_orchestrator();
    let (stream, calls) = RecordingStream::new(&time, 0, 3000, 30.0);
    orchestrator.attach_stream(Box::new(stream)).unwrap();
    orchestrator.play();
    orchestrator.process_pending();

    time.advance(3100.0);
    orchestrator.tick(TickKind::BoundaryCheck);
    orchestrator.process_pending();

    assert!(orchestrator.is_stopped());
    assert_abs_diff_eq!(orchestrator.current_time(), 3000.0);
    assert_eq!(calls.lock().iter().rev().find(|c| **c == Call::Stop), Some(&Call::Stop));
    assert!(!orchestrator.with_binding(StreamId(1), |b| b.is_playing()).unwrap());
}

#[test]
fn jog_uses_the_fastest_stream() {
    let (orchestrator, time) = manual_orchestrator();
    let (a, _) = RecordingStream::new(&time, 0, 10_000, 30.0);
    let (b, _) = RecordingStream::new(&time, 0, 10_000, 25.0);
    orchestrator.attach_stream(Box::new(a)).unwrap();
    orchestrator.attach_stream(Box::new(b)).unwrap();

    assert_eq!(orchestrator.effective_frame_rate(), 30.0);
    let before = orchestrator.current_time();
    orchestrator.jog_forward();
    assert_abs_diff_eq!(orchestrator.current_time() - before, (1000.0_f64 / 30.0).floor());
}

#[test]
fn aggregator_prefers_override() {
    let mut rates = FrameRateAggregator::new();
    rates.add_stream(StreamId(1), 29.97);
    rates.add_stream(StreamId(2), 59.94);
    assert_eq!(rates.step_ms(), Some(16));
    rates.set_user_override(12.0);
    assert_eq!(rates.step_ms(), Some(83));
}
