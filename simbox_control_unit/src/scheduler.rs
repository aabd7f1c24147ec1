//! Fixed-rate scheduler.
//!
//! Invokes a job once per period on the monotonic clock, one invocation at a
//! time. A tick that runs past its slot delays the next one (never skipped,
//! never overlapped) and the accumulated lateness is kept in
//! [`ScheduleStats::drift_ns`].
//!
//! ## RT Setup
//! With the `rt` feature, [`rt_setup`] runs before the loop:
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` to the configured core.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! and the loop sleeps with `clock_nanosleep(TIMER_ABSTIME)` on
//! `CLOCK_MONOTONIC`. Without it every RT call is a no-op and the loop
//! sleeps with `std::thread::sleep`.

use crate::error::{InitError, ScheduleError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest uninterrupted sleep before the stop flag is checked again.
#[cfg(not(feature = "rt"))]
const STOP_POLL: Duration = Duration::from_millis(100);

/// Interval between periodic statistics lines.
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

// ─── Schedule Statistics ────────────────────────────────────────────

/// O(1) per-tick timing statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleStats {
    /// Ticks executed.
    pub ticks: u64,
    /// Last tick duration [ns].
    pub last_tick_ns: u64,
    /// Shortest tick [ns].
    pub min_tick_ns: u64,
    /// Longest tick [ns].
    pub max_tick_ns: u64,
    /// Running sum for the average.
    pub sum_tick_ns: u64,
    /// Running sum of squares for the standard deviation.
    pub sum_sq_tick_ns: u128,
    /// Ticks that ran past their slot.
    pub overruns: u64,
    /// Largest delay between a deadline and the tick actually starting [ns].
    pub max_latency_ns: u64,
    /// Current lateness of the schedule against the ideal grid [ns].
    pub drift_ns: u64,
}

impl Default for ScheduleStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleStats {
    /// Zeroed statistics.
    pub const fn new() -> Self {
        Self {
            ticks: 0,
            last_tick_ns: 0,
            min_tick_ns: u64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            sum_sq_tick_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
            drift_ns: 0,
        }
    }

    /// Record one tick.
    #[inline]
    pub fn record(&mut self, duration_ns: u64, latency_ns: u64) {
        self.ticks += 1;
        self.last_tick_ns = duration_ns;
        self.min_tick_ns = self.min_tick_ns.min(duration_ns);
        self.max_tick_ns = self.max_tick_ns.max(duration_ns);
        self.sum_tick_ns = self.sum_tick_ns.saturating_add(duration_ns);
        self.sum_sq_tick_ns += u128::from(duration_ns) * u128::from(duration_ns);
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average tick duration [ns] (0 before the first tick).
    #[inline]
    pub fn avg_tick_ns(&self) -> u64 {
        if self.ticks == 0 {
            0
        } else {
            self.sum_tick_ns / self.ticks
        }
    }

    /// Standard deviation of the tick duration [ns].
    pub fn stddev_tick_ns(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        let n = self.ticks as f64;
        let mean = self.sum_tick_ns as f64 / n;
        let variance = self.sum_sq_tick_ns as f64 / n - mean * mean;
        variance.max(0.0).sqrt()
    }
}

fn as_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

// ─── Pacing ─────────────────────────────────────────────────────────

#[cfg(feature = "rt")]
struct Pacer {
    origin: Instant,
    origin_ts: nix::sys::time::TimeSpec,
}

#[cfg(feature = "rt")]
impl Pacer {
    fn new(origin: Instant) -> Result<Self, ScheduleError> {
        use nix::time::{ClockId, clock_gettime};
        let origin_ts = clock_gettime(ClockId::CLOCK_MONOTONIC)?;
        Ok(Self { origin, origin_ts })
    }

    /// Absolute-time sleep until `deadline`. Returns early on stop.
    fn sleep_until(&self, deadline: Instant, stop: &AtomicBool) {
        use nix::errno::Errno;
        use nix::time::{ClockId, ClockNanosleepFlags, clock_nanosleep};

        let offset = deadline.saturating_duration_since(self.origin);
        let wake = timespec_add_ns(self.origin_ts, as_ns(offset) as i64);
        loop {
            match clock_nanosleep(
                ClockId::CLOCK_MONOTONIC,
                ClockNanosleepFlags::TIMER_ABSTIME,
                &wake,
            ) {
                Err(Errno::EINTR) if !stop.load(Ordering::Acquire) => continue,
                Err(Errno::EINTR) => return,
                Err(e) => {
                    warn!("clock_nanosleep failed: {}", e);
                    return;
                }
                Ok(_) => return,
            }
        }
    }
}

#[cfg(not(feature = "rt"))]
struct Pacer;

#[cfg(not(feature = "rt"))]
impl Pacer {
    fn new(_origin: Instant) -> Result<Self, ScheduleError> {
        Ok(Self)
    }

    /// Relative sleeps in slices of at most [`STOP_POLL`]. Returns early on stop.
    fn sleep_until(&self, deadline: Instant, stop: &AtomicBool) {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || stop.load(Ordering::Acquire) {
                return;
            }
            std::thread::sleep(remaining.min(STOP_POLL));
        }
    }
}

// ─── Scheduler ──────────────────────────────────────────────────────

/// Drives a job at a fixed period until stopped.
pub struct Scheduler {
    period: Duration,
    stop: Arc<AtomicBool>,
    stats: ScheduleStats,
}

impl Scheduler {
    /// Scheduler with the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            stop: Arc::new(AtomicBool::new(false)),
            stats: ScheduleStats::new(),
        }
    }

    /// Configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Flag that ends the loop once set. The in-flight tick always completes.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Timing statistics so far.
    pub fn stats(&self) -> &ScheduleStats {
        &self.stats
    }

    /// Run `job` once per period until the stop flag is set.
    ///
    /// `job` receives the tick number, starting at 1.
    pub fn run_forever<F: FnMut(u64)>(&mut self, job: F) -> Result<(), ScheduleError> {
        self.run(None, job)
    }

    /// Run `job` for at most `ticks` ticks, or until the stop flag is set.
    pub fn run_for<F: FnMut(u64)>(&mut self, ticks: u64, job: F) -> Result<(), ScheduleError> {
        self.run(Some(ticks), job)
    }

    fn run<F: FnMut(u64)>(&mut self, limit: Option<u64>, mut job: F) -> Result<(), ScheduleError> {
        let origin = Instant::now();
        let pacer = Pacer::new(origin)?;
        let stats_every =
            (STATS_LOG_INTERVAL.as_nanos() / self.period.as_nanos().max(1)).max(1) as u64;

        info!(
            "Scheduler started: period {:?}{}",
            self.period,
            limit.map(|n| format!(", {n} ticks")).unwrap_or_default()
        );

        // First tick fires one period after start.
        let mut deadline = origin + self.period;
        let mut ideal = deadline;
        let mut tick = 0u64;

        while !self.stop.load(Ordering::Acquire) && limit.is_none_or(|n| tick < n) {
            pacer.sleep_until(deadline, &self.stop);
            if self.stop.load(Ordering::Acquire) {
                break;
            }

            let start = Instant::now();
            tick += 1;
            job(tick);
            let end = Instant::now();

            self.stats.record(
                as_ns(end - start),
                as_ns(start.saturating_duration_since(deadline)),
            );

            let slot_end = deadline + self.period;
            ideal += self.period;
            if end > slot_end {
                self.stats.overruns += 1;
                deadline = end;
            } else {
                deadline = slot_end;
            }
            self.stats.drift_ns = as_ns(deadline.saturating_duration_since(ideal));

            if end > slot_end {
                let overruns = self.stats.overruns;
                if overruns <= 10 || overruns % 1000 == 0 {
                    warn!(
                        "Tick {} overran its slot by {:?} (tick took {:?}, drift {} µs, {} overruns)",
                        tick,
                        end - slot_end,
                        end - start,
                        self.stats.drift_ns / 1_000,
                        overruns
                    );
                }
            }

            if tick % stats_every == 0 {
                debug!(
                    "Schedule: {} ticks, avg {} µs, max {} µs, max latency {} µs, {} overruns, drift {} µs",
                    self.stats.ticks,
                    self.stats.avg_tick_ns() / 1_000,
                    self.stats.max_tick_ns / 1_000,
                    self.stats.max_latency_ns / 1_000,
                    self.stats.overruns,
                    self.stats.drift_ns / 1_000
                );
            }
        }

        info!(
            "Scheduler stopped after {} ticks ({} overruns, drift {} µs)",
            self.stats.ticks,
            self.stats.overruns,
            self.stats.drift_ns / 1_000
        );
        Ok(())
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), InitError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| InitError::Rt(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), InitError> {
    Ok(())
}

/// Touch 1 MB of stack so the pages are resident before the loop starts.
#[cfg(feature = "rt")]
fn prefault_stack() {
    let mut buf = [0u8; 1024 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(not(feature = "rt"))]
fn prefault_stack() {}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), InitError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| InitError::Rt(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| InitError::Rt(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), InitError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), InitError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(InitError::Rt(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), InitError> {
    Ok(())
}

/// Lock memory, pin the calling thread and raise it to SCHED_FIFO.
///
/// Must run on the thread that will call [`Scheduler::run_forever`].
/// Without the `rt` feature every step is a no-op.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), InitError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Time Helpers ───────────────────────────────────────────────────

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec() + ns / 1_000_000_000;
    let mut nanos = ts.tv_nsec() + ns % 1_000_000_000;
    if nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_stats_basic() {
        let mut stats = ScheduleStats::new();
        assert_eq!(stats.ticks, 0);
        assert_eq!(stats.avg_tick_ns(), 0);

        stats.record(500_000, 1_000);
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.last_tick_ns, 500_000);
        assert_eq!(stats.min_tick_ns, 500_000);
        assert_eq!(stats.max_tick_ns, 500_000);
        assert_eq!(stats.max_latency_ns, 1_000);
        assert_eq!(stats.stddev_tick_ns(), 0.0);

        stats.record(600_000, 500);
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.min_tick_ns, 500_000);
        assert_eq!(stats.max_tick_ns, 600_000);
        assert_eq!(stats.max_latency_ns, 1_000);
        assert_eq!(stats.avg_tick_ns(), 550_000);
        assert!((stats.stddev_tick_ns() - 50_000.0).abs() < 1.0);
    }

    #[test]
    fn rt_setup_no_rt_feature_is_noop() {
        #[cfg(not(feature = "rt"))]
        {
            assert!(rt_setup(0, 80).is_ok());
        }
    }

    #[test]
    fn run_for_counts_ticks_from_one() {
        let mut scheduler = Scheduler::new(Duration::from_millis(1));
        let mut seen = Vec::new();
        scheduler.run_for(5, |tick| seen.push(tick)).unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(scheduler.stats().ticks, 5);
    }

    #[test]
    fn preset_stop_flag_runs_nothing() {
        let mut scheduler = Scheduler::new(Duration::from_millis(1));
        scheduler.stop_handle().store(true, Ordering::Release);
        let mut calls = 0;
        scheduler.run_forever(|_| calls += 1).unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn job_can_stop_the_loop() {
        let mut scheduler = Scheduler::new(Duration::from_millis(1));
        let stop = scheduler.stop_handle();
        let mut calls = 0;
        scheduler
            .run_forever(|tick| {
                calls += 1;
                if tick == 3 {
                    stop.store(true, Ordering::Release);
                }
            })
            .unwrap();
        assert_eq!(calls, 3);
    }
}
