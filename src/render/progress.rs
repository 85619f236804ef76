use std::time::Duration;

/// Source of per-job progress estimates while the encoder runs.
pub trait ProgressEstimator {
    /// Percent complete (0..=100) after `elapsed` wall-clock time.
    fn estimate(&mut self, elapsed: Duration) -> u8;
}

/// Wall-clock heuristic: elapsed time over the expected media duration.
///
/// This is not a frame or byte count. Fast encodes can report 100 before the
/// encoder exits and slow ones sit at 100 until it does.
#[derive(Debug, Clone)]
pub struct ElapsedTimeEstimator {
    expected: Duration,
}

impl ElapsedTimeEstimator {
    /// Durations that are not positive, or too large to represent, leave the
    /// estimator reporting 100 from the start.
    pub fn new(expected_seconds: f64) -> Self {
        let expected = if expected_seconds > 0.0 {
            Duration::try_from_secs_f64(expected_seconds).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        Self { expected }
    }
}

impl ProgressEstimator for ElapsedTimeEstimator {
    fn estimate(&mut self, elapsed: Duration) -> u8 {
        if self.expected.is_zero() {
            return 100;
        }
        let ratio = elapsed.as_secs_f64() / self.expected.as_secs_f64();
        (ratio * 100.0).clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_ratio() {
        let mut est = ElapsedTimeEstimator::new(10.0);
        assert_eq!(est.estimate(Duration::ZERO), 0);
        assert_eq!(est.estimate(Duration::from_secs(5)), 50);
        assert_eq!(est.estimate(Duration::from_millis(9_990)), 99);
    }

    #[test]
    fn test_clamped_to_100() {
        let mut est = ElapsedTimeEstimator::new(2.0);
        assert_eq!(est.estimate(Duration::from_secs(30)), 100);
    }

    #[test]
    fn test_degenerate_duration_reports_complete() {
        assert_eq!(ElapsedTimeEstimator::new(0.0).estimate(Duration::ZERO), 100);
        assert_eq!(
            ElapsedTimeEstimator::new(f64::NAN).estimate(Duration::from_secs(1)),
            100
        );
    }

    #[test]
    fn test_unrepresentable_duration_does_not_panic() {
        assert_eq!(ElapsedTimeEstimator::new(1e30).estimate(Duration::ZERO), 100);
        assert_eq!(
            ElapsedTimeEstimator::new(f64::INFINITY).estimate(Duration::from_secs(1)),
            100
        );
        assert_eq!(ElapsedTimeEstimator::new(-4.0).estimate(Duration::ZERO), 100);
    }
}
