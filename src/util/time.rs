//! Timing utilities
//!
//! Two clocks with deliberately different properties:
//!
//! - [`Timestamp`] wraps the monotonic clock and is used for every elapsed-time
//!   measurement in the IO probes.
//! - [`wall_clock_ns`] reads the settable wall clock. The skew probe needs it
//!   precisely because independently-set clocks disagree.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Start of a probe's timed window
///
/// Only the loop under measurement sits between `now()` and `elapsed_nanos()`.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    instant: Instant,
}

impl Timestamp {
    #[inline]
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }

    /// Elapsed nanoseconds, saturating at `u64::MAX`
    #[inline]
    pub fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock nanoseconds since the Unix epoch
///
/// Negative when the clock is set before 1970.
pub fn wall_clock_ns() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_nanos() as i64,
        Err(before) => -(before.duration().as_nanos() as i64),
    }
}

/// Bandwidth in decimal MB/s from a byte count and elapsed nanoseconds
///
/// Bytes per nanosecond times 1000 is bytes per microsecond, i.e. MB/s.
/// Returns 0 when nothing was timed.
pub fn bandwidth_mb_per_sec(total_bytes: u64, elapsed_ns: u64) -> f64 {
    if elapsed_ns == 0 {
        return 0.0;
    }
    total_bytes as f64 / elapsed_ns as f64 * 1e3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timestamp_elapsed() {
        let start = Timestamp::now();
        thread::sleep(Duration::from_millis(10));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timestamp_elapsed_nanos() {
        let start = Timestamp::now();
        thread::sleep(Duration::from_millis(1));
        assert!(start.elapsed_nanos() >= 1_000_000);
    }

    #[test]
    fn test_wall_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(wall_clock_ns() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn test_bandwidth() {
        // 1 GB in 1 second is 1000 MB/s
        assert_eq!(bandwidth_mb_per_sec(1_000_000_000, 1_000_000_000), 1000.0);
        assert_eq!(bandwidth_mb_per_sec(65536, 0), 0.0);
    }
}
