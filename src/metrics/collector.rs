use crate::metrics::snapshot::MetricsSnapshot;
use crate::model::{MetricResult, MetricStatus};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// Batch counters, readable from another task while the batch runs.
#[derive(Clone)]
pub struct MetricsCollector {
    rows_queued: Arc<AtomicU64>,
    rows_processed: Arc<AtomicU64>,
    rows_skipped: Arc<AtomicU64>,
    results_success: Arc<AtomicU64>,
    results_not_found: Arc<AtomicU64>,
    results_failed: Arc<AtomicU64>,
    attempts_total: Arc<AtomicU64>,
    retries: Arc<AtomicU64>,
    total_row_time_ms: Arc<AtomicU64>,
    start_time: Arc<Instant>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            rows_queued: Arc::new(AtomicU64::new(0)),
            rows_processed: Arc::new(AtomicU64::new(0)),
            rows_skipped: Arc::new(AtomicU64::new(0)),
            results_success: Arc::new(AtomicU64::new(0)),
            results_not_found: Arc::new(AtomicU64::new(0)),
            results_failed: Arc::new(AtomicU64::new(0)),
            attempts_total: Arc::new(AtomicU64::new(0)),
            retries: Arc::new(AtomicU64::new(0)),
            total_row_time_ms: Arc::new(AtomicU64::new(0)),
            start_time: Arc::new(Instant::now()),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rows_queued(&self, n: u64) {
        self.rows_queued.fetch_add(n, Ordering::SeqCst);
    }

    /// Counts one finished row. `duration` covers all of its attempts.
    pub fn record(&self, result: &MetricResult, duration: Duration) {
        self.rows_processed.fetch_add(1, Ordering::SeqCst);

        let counter = match result.status {
            MetricStatus::Success => &self.results_success,
            MetricStatus::NotFound => &self.results_not_found,
            MetricStatus::Failed => &self.results_failed,
            MetricStatus::Skipped => {
                self.rows_skipped.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let attempts = u64::from(result.attempts);
        self.attempts_total.fetch_add(attempts, Ordering::SeqCst);
        self.retries.fetch_add(attempts.saturating_sub(1), Ordering::SeqCst);
        self.total_row_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.rows_processed.load(Ordering::SeqCst);
        let skipped = self.rows_skipped.load(Ordering::SeqCst);
        let success = self.results_success.load(Ordering::SeqCst);
        let total_time = self.total_row_time_ms.load(Ordering::SeqCst);
        let attempted = processed.saturating_sub(skipped);

        let success_rate = if attempted > 0 {
            (success as f64 / attempted as f64) * 100.0
        } else {
            0.0
        };

        let avg_row_time_ms = if attempted > 0 {
            total_time / attempted
        } else {
            0
        };

        let elapsed = self.start_time.elapsed().as_secs_f64();

        MetricsSnapshot {
            rows_queued: self.rows_queued.load(Ordering::SeqCst),
            rows_processed: processed,
            rows_skipped: skipped,
            results_success: success,
            results_not_found: self.results_not_found.load(Ordering::SeqCst),
            results_failed: self.results_failed.load(Ordering::SeqCst),
            attempts_total: self.attempts_total.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            success_rate,
            avg_row_time_ms,
            rows_per_second: if elapsed > 0.0 {
                processed as f64 / elapsed
            } else {
                0.0
            },
            elapsed_seconds: elapsed,
        }
    }
}
