//! Latency measurement used to pick the fastest kernel variant.
//!
//! # Calibration
//!
//! Once per process the monotonic clock is sampled back to back. The largest
//! gap between two samples is the worst slop the scheduler and timer add to a
//! single reading ("accuracy"); the smallest non-zero gap is the finest step
//! the clock can represent ("precision"). Their ratio is how many calls a
//! measurement needs before that slop is amortized away.
//!
//! # Measurement
//!
//! A candidate is called [`iterations`] times. After every call the running
//! mean `elapsed / calls` is computed and the smallest running mean seen is
//! the result. A single very fast call cannot win on its own this way: the
//! estimate converges on the steady-state amortized cost of the call.

use std::hint::black_box;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::debug;

/// Number of back-to-back clock samples taken during calibration.
pub const CALIBRATION_SAMPLES: usize = 1_000;

/// Lower bound on the iteration count.
pub const MIN_ITERATIONS: usize = 16;

/// Upper bound on the iteration count, so a badly preempted calibration
/// cannot turn resolution into a multi-second stall.
pub const MAX_ITERATIONS: usize = 10_000;

/// Result of clock calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Largest observed gap between consecutive clock samples.
    pub accuracy: Duration,
    /// Smallest observed non-zero gap between consecutive clock samples.
    pub precision: Duration,
    /// Calls per measurement: `accuracy / precision`, clamped.
    pub iterations: usize,
}

impl Calibration {
    /// Sample the clock `samples` times and derive the iteration count.
    pub fn run(samples: usize) -> Self {
        let mut accuracy = Duration::ZERO;
        let mut precision = Duration::MAX;
        let mut last = Instant::now();

        for _ in 0..samples.max(2) {
            let now = Instant::now();
            let gap = now.duration_since(last);
            accuracy = accuracy.max(gap);
            if gap > Duration::ZERO {
                precision = precision.min(gap);
            }
            last = now;
        }

        if precision == Duration::MAX {
            // Clock never ticked during the run.
            precision = Duration::from_nanos(1);
        }

        Self::from_bounds(accuracy, precision)
    }

    /// Derive the iteration count from measured accuracy and precision.
    pub fn from_bounds(accuracy: Duration, precision: Duration) -> Self {
        let ratio = accuracy.as_nanos() / precision.as_nanos().max(1);
        let iterations = (ratio.min(MAX_ITERATIONS as u128) as usize).max(MIN_ITERATIONS);
        Self {
            accuracy,
            precision,
            iterations,
        }
    }
}

/// Process-wide calibration, performed on first use.
pub fn calibration() -> &'static Calibration {
    static CALIBRATION: OnceLock<Calibration> = OnceLock::new();
    CALIBRATION.get_or_init(|| {
        let calibration = Calibration::run(CALIBRATION_SAMPLES);
        debug!(
            "clock calibration: accuracy {:?}, precision {:?}, {} iterations",
            calibration.accuracy, calibration.precision, calibration.iterations
        );
        calibration
    })
}

/// Number of calls each measurement makes. Memoized.
pub fn iterations() -> usize {
    calibration().iterations
}

/// Measure `f` with the process-wide iteration count.
pub fn measure<R, F: FnMut() -> R>(f: F) -> Duration {
    measure_n(iterations(), f)
}

/// Measure `f` over exactly `iterations` calls.
///
/// Returns the minimum over the run of the running mean latency.
pub fn measure_n<R, F: FnMut() -> R>(iterations: usize, mut f: F) -> Duration {
    let mut best = Duration::MAX;
    let start = Instant::now();

    for calls in 1..=iterations.max(1) {
        black_box(f());
        best = best.min(running_mean(start.elapsed(), calls));
    }

    best
}

/// `elapsed / calls`, exact for any call count.
#[inline]
fn running_mean(elapsed: Duration, calls: usize) -> Duration {
    let nanos = elapsed.as_nanos() / calls.max(1) as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bounds_ratio() {
        let c = Calibration::from_bounds(Duration::from_nanos(5_000), Duration::from_nanos(20));
        assert_eq!(c.iterations, 250);
    }

    #[test]
    fn test_from_bounds_clamped() {
        let low = Calibration::from_bounds(Duration::from_nanos(20), Duration::from_nanos(20));
        assert_eq!(low.iterations, MIN_ITERATIONS);

        let high = Calibration::from_bounds(Duration::from_millis(50), Duration::from_nanos(1));
        assert_eq!(high.iterations, MAX_ITERATIONS);
    }

    #[test]
    fn test_calibration_runs() {
        let c = Calibration::run(100);
        assert!(c.precision > Duration::ZERO);
        assert!(c.accuracy >= c.precision || c.accuracy == Duration::ZERO);
        assert!((MIN_ITERATIONS..=MAX_ITERATIONS).contains(&c.iterations));
    }

    #[test]
    fn test_iterations_memoized() {
        assert_eq!(iterations(), iterations());
    }

    #[test]
    fn test_measure_calls_exactly_n_times() {
        let mut calls = 0usize;
        measure_n(37, || calls += 1);
        assert_eq!(calls, 37);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_running_mean_beyond_u32_calls() {
        let calls = u32::MAX as usize + 2;
        let elapsed = Duration::from_nanos(calls as u64 * 3);
        assert_eq!(running_mean(elapsed, calls), Duration::from_nanos(3));
        assert_eq!(running_mean(Duration::from_nanos(10), 4), Duration::from_nanos(2));
    }

    #[test]
    fn test_running_mean_damps_single_outlier() {
        // One slow call up front, then fast calls: the running mean must stay
        // well above the per-call cost of the fast calls for a while, and the
        // minimum running mean can never be below the true average of the tail.
        let mut first = true;
        let latency = measure_n(50, || {
            if first {
                first = false;
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        assert!(latency >= Duration::from_micros(90));
    }
}
