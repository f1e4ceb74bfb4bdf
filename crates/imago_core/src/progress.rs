//! Progress derivation from cumulative bytes and elapsed wall-clock time.

use std::time::{Duration, Instant};

const EPSILON: f64 = 1e-6;

/// One progress observation, emitted per block released to the writer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub bytes_done: u64,
    pub total_bytes: u64,
    pub elapsed_seconds: f64,
    /// Instantaneous speed in bytes per second; 0 while elapsed time is
    /// too small to divide by.
    pub speed_bps: f64,
    /// Estimated seconds remaining; `None` while speed is ~0.
    pub eta_seconds: Option<f64>,
    pub percent: f64,
}

/// Derives samples from a fixed total and a start instant.
#[derive(Debug)]
pub struct ProgressTracker {
    total_bytes: u64,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            started: Instant::now(),
        }
    }

    pub fn sample(&self, bytes_done: u64) -> ProgressSample {
        self.sample_after(bytes_done, self.started.elapsed())
    }

    fn sample_after(&self, bytes_done: u64, elapsed: Duration) -> ProgressSample {
        let elapsed_seconds = elapsed.as_secs_f64();

        let speed_bps = if elapsed_seconds > EPSILON {
            bytes_done as f64 / elapsed_seconds
        } else {
            0.0
        };

        let remaining = self.total_bytes.saturating_sub(bytes_done);
        let eta_seconds = if speed_bps > EPSILON {
            Some(remaining as f64 / speed_bps)
        } else {
            None
        };

        let percent = if self.total_bytes == 0 {
            100.0
        } else {
            bytes_done as f64 / self.total_bytes as f64 * 100.0
        };

        ProgressSample {
            bytes_done,
            total_bytes: self.total_bytes,
            elapsed_seconds,
            speed_bps,
            eta_seconds,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_sample() {
        let tracker = ProgressTracker::new(1000);
        let sample = tracker.sample_after(500, Duration::from_secs(5));

        assert_eq!(sample.percent, 50.0);
        assert_eq!(sample.speed_bps, 100.0);
        assert_eq!(sample.eta_seconds, Some(5.0));
    }

    #[test]
    fn test_zero_elapsed_has_no_speed_or_eta() {
        let tracker = ProgressTracker::new(1000);
        let sample = tracker.sample_after(500, Duration::ZERO);

        assert_eq!(sample.speed_bps, 0.0);
        assert_eq!(sample.eta_seconds, None);
    }

    #[test]
    fn test_no_bytes_done_has_no_eta() {
        let tracker = ProgressTracker::new(1000);
        let sample = tracker.sample_after(0, Duration::from_secs(10));

        assert_eq!(sample.percent, 0.0);
        assert_eq!(sample.speed_bps, 0.0);
        assert_eq!(sample.eta_seconds, None);
    }

    #[test]
    fn test_completion_reaches_one_hundred_percent() {
        let tracker = ProgressTracker::new(10 * 1024 * 1024);
        let sample = tracker.sample_after(10 * 1024 * 1024, Duration::from_secs(2));

        assert!((sample.percent - 100.0).abs() < 1e-9);
        assert_eq!(sample.eta_seconds, Some(0.0));
    }
}
