use std::time::Duration;

/// Incrementally maintained mean of observed durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningMean {
    count: u64,
    mean: Duration,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the mean.
    pub fn record(&mut self, sample: Duration) {
        self.count += 1;
        let mean = self.mean.as_nanos() as i128;
        let sample = sample.as_nanos() as i128;
        let next = mean + (sample - mean) / self.count as i128;
        self.mean = Duration::from_nanos(next.clamp(0, u64::MAX as i128) as u64);
    }

    pub fn mean(&self) -> Duration {
        self.mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mean() {
        let mean = RunningMean::new();
        assert_eq!(mean.mean(), Duration::ZERO);
        assert_eq!(mean.count(), 0);
    }

    #[test]
    fn test_running_mean() {
        let mut mean = RunningMean::new();
        mean.record(Duration::from_millis(10));
        assert_eq!(mean.mean(), Duration::from_millis(10));
        mean.record(Duration::from_millis(20));
        assert_eq!(mean.mean(), Duration::from_millis(15));
        mean.record(Duration::from_millis(30));
        assert_eq!(mean.mean(), Duration::from_millis(20));
        assert_eq!(mean.count(), 3);
    }
}
