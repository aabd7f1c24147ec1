//! Scheduler timing tests.

use simbox_control_unit::Scheduler;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const PERIOD: Duration = Duration::from_millis(10);

#[test]
fn n_ticks_take_at_least_n_periods() {
    let mut scheduler = Scheduler::new(PERIOD);
    let start = Instant::now();
    let mut last = None;
    scheduler.run_for(10, |tick| last = Some((tick, Instant::now()))).unwrap();

    let (tick, at) = last.unwrap();
    assert_eq!(tick, 10);
    assert!(at - start >= PERIOD * 10);
    assert!(start.elapsed() >= PERIOD * 10);
    assert_eq!(scheduler.stats().ticks, 10);
}

#[test]
fn first_tick_waits_one_period() {
    let mut scheduler = Scheduler::new(PERIOD);
    let start = Instant::now();
    let mut first = None;
    scheduler.run_for(1, |_| first = Some(Instant::now())).unwrap();
    assert!(first.unwrap() - start >= PERIOD);
}

#[test]
fn slow_tick_delays_but_never_overlaps() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let mut starts = Vec::new();
    let mut ends = Vec::new();

    let mut scheduler = Scheduler::new(PERIOD);
    let start = Instant::now();
    scheduler
        .run_for(5, |tick| {
            assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0, "ticks overlapped");
            starts.push(Instant::now());
            if tick == 2 {
                thread::sleep(PERIOD * 3);
            }
            ends.push(Instant::now());
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();
    let elapsed = start.elapsed();

    // Every tick starts after the previous one finished.
    for (next_start, prev_end) in starts.iter().skip(1).zip(&ends) {
        assert!(next_start >= prev_end);
    }
    // Tick 3 waited for the slow tick 2 instead of starting on its slot.
    assert!(starts[2] - starts[1] >= PERIOD * 3);

    let stats = scheduler.stats();
    assert_eq!(stats.ticks, 5);
    assert!(stats.overruns >= 1);
    assert!(stats.max_tick_ns >= (PERIOD * 3).as_nanos() as u64);
    // Lateness is kept, not absorbed.
    assert!(stats.drift_ns >= (PERIOD * 2).as_nanos() as u64);
    assert!(elapsed >= PERIOD * 5);
}

#[test]
fn stop_from_another_thread_finishes_in_flight_tick() {
    let mut scheduler = Scheduler::new(PERIOD);
    let stop = scheduler.stop_handle();
    let completed = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));

    let stopper = thread::spawn(move || {
        thread::sleep(PERIOD * 3);
        stop.store(true, Ordering::Release);
    });

    scheduler
        .run_forever(|_| {
            started.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            completed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    stopper.join().unwrap();

    let started = started.load(Ordering::SeqCst);
    assert!(started >= 1);
    assert_eq!(started, completed.load(Ordering::SeqCst));
}
