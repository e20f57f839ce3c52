use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Point-in-time copy of executor counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsReport {
    pub graphs_processed: u64,
    pub nodes_executed: u64,
    pub nodes_failed: u64,
    pub total_time: Duration,
    /// Wall time of the most recent job.
    pub last_time: Option<Duration>,
}

impl StatisticsReport {
    pub fn average_time(&self) -> Option<Duration> {
        if self.graphs_processed == 0 {
            return None;
        }
        u32::try_from(self.graphs_processed).ok().map(|n| self.total_time / n)
    }

    /// Share of reported nodes that failed, 0.0 when nothing ran.
    pub fn failure_ratio(&self) -> f64 {
        let total = self.nodes_executed + self.nodes_failed;
        if total > 0 { self.nodes_failed as f64 / total as f64 } else { 0.0 }
    }
}

/// Executor statistics, updated as job results arrive.
#[derive(Debug, Default)]
pub struct ExecutionStatistics {
    inner: Mutex<StatisticsReport>,
}

impl ExecutionStatistics {
    pub fn new() -> Self { Self::default() }

    pub fn record(&self, executed: usize, failed: usize, duration: Duration) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats.graphs_processed += 1;
        stats.nodes_executed += executed as u64;
        stats.nodes_failed += failed as u64;
        stats.total_time += duration;
        stats.last_time = Some(duration);
    }

    pub fn snapshot(&self) -> StatisticsReport {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn reset(&self) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = StatisticsReport::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let stats = ExecutionStatistics::new();
        stats.record(3, 1, Duration::from_millis(20));
        stats.record(5, 0, Duration::from_millis(40));

        let report = stats.snapshot();
        assert_eq!(report.graphs_processed, 2);
        assert_eq!(report.nodes_executed, 8);
        assert_eq!(report.nodes_failed, 1);
        assert_eq!(report.last_time, Some(Duration::from_millis(40)));
        assert_eq!(report.average_time(), Some(Duration::from_millis(30)));
        assert!((report.failure_ratio() - 1.0 / 9.0).abs() < 1e-12);

        stats.reset();
        assert_eq!(stats.snapshot(), StatisticsReport::default());
    }
}
