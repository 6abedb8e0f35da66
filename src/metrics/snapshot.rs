use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub rows_queued: u64,
    pub rows_processed: u64,
    pub rows_skipped: u64,
    pub results_success: u64,
    pub results_not_found: u64,
    pub results_failed: u64,
    pub attempts_total: u64,
    pub retries: u64,
    /// Successful rows over attempted (non-skipped) rows, in percent.
    pub success_rate: f64,
    pub avg_row_time_ms: u64,
    pub rows_per_second: f64,
    pub elapsed_seconds: f64,
}
