//! Per-network inference statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and outcome counts for one loaded network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatistics {
    /// Successful calls.
    pub inference_count: u64,
    /// Failed calls.
    pub failure_count: u64,
    /// Total time across successful calls.
    pub total_time: Duration,
    /// Fastest successful call.
    pub min_time: Option<Duration>,
    /// Slowest successful call.
    pub max_time: Option<Duration>,
}

impl NetworkStatistics {
    /// Record one call.
    pub(crate) fn record(&mut self, elapsed: Duration, success: bool) {
        if !success {
            self.failure_count += 1;
            return;
        }
        self.inference_count += 1;
        self.total_time += elapsed;
        self.min_time = Some(self.min_time.map_or(elapsed, |min| min.min(elapsed)));
        self.max_time = Some(self.max_time.map_or(elapsed, |max| max.max(elapsed)));
    }

    /// Mean time of successful calls.
    pub fn average_time(&self) -> Option<Duration> {
        let count = u32::try_from(self.inference_count).ok()?;
        (count > 0).then(|| self.total_time / count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let mut stats = NetworkStatistics::default();
        assert_eq!(stats.average_time(), None);

        stats.record(Duration::from_millis(4), true);
        stats.record(Duration::from_millis(2), true);
        stats.record(Duration::from_millis(50), false);

        assert_eq!(stats.inference_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.min_time, Some(Duration::from_millis(2)));
        assert_eq!(stats.max_time, Some(Duration::from_millis(4)));
        assert_eq!(stats.average_time(), Some(Duration::from_millis(3)));
    }
}
