use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fire-and-forget counters for the fetch engine. Recording never fails and
/// never blocks a fetch.
#[derive(Debug)]
pub struct FetchMetrics {
    start_time: DateTime<Utc>,
    navigations: AtomicU64,
    cancellations: AtomicU64,
    evaluations: AtomicU64,
    successes: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

/// Serializable point-in-time view of the counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub start_time: DateTime<Utc>,
    pub navigations: u64,
    pub cancellations: u64,
    pub evaluations: u64,
    pub successes: u64,
    pub retries: u64,
    pub failures: u64,
}

impl FetchMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            navigations: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn record_navigation(&self) {
        self.navigations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            start_time: self.start_time,
            navigations: self.navigations.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for FetchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = FetchMetrics::new();
        metrics.record_navigation();
        metrics.record_navigation();
        metrics.record_evaluation();
        metrics.record_success();

        let snap = metrics.snapshot();
        assert_eq!(snap.navigations, 2);
        assert_eq!(snap.evaluations, 1);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.cancellations, 0);
    }
}
