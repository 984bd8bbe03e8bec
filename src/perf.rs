//! Timing of driver operations.
use std::time::{Duration, Instant};

use log::{Level, debug, log_enabled};

/// Log target for operation timings.
pub const PERF_TARGET: &str = "EOPFZARR_PERF";

const THRESHOLD: Duration = Duration::from_millis(1);

/// Logs the elapsed time of an operation when dropped, if it took longer than a millisecond.
#[must_use = "the timer measures until it is dropped"]
pub struct ScopedTimer {
    operation: &'static str,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed();
        if elapsed > THRESHOLD && log_enabled!(target: PERF_TARGET, Level::Debug) {
            debug!(
                target: PERF_TARGET,
                "{} took {:.3} ms",
                self.operation,
                elapsed.as_secs_f64() * 1000.0
            );
        }
    }
}
