use crate::extractor::MetricExtractor;
use crate::error::Result;
use crate::metrics::collector::MetricsCollector;
use crate::metrics::snapshot::MetricsSnapshot;
use crate::model::{MetricKind, MetricRequest, MetricResult};
use crate::normalize::Normalizer;
use crate::retry::{RateLimiter, RetryPolicy, with_retry};
use crate::session::{RunSummary, Session};
use crate::table::{Cell, Table};
use chrono::{NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use url::Url;
use validator::Validate;

/// Receives per-row progress. Must not fail.
pub trait ProgressSink: Send + Sync {
    fn update(&self, fraction: f64, status: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn update(&self, fraction: f64, status: &str) {
        self(fraction, status)
    }
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _fraction: f64, _status: &str) {}
}

/// Random pause between attempted rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RowPacing {
    #[serde(default = "default_pacing_min")]
    pub min_ms: u64,
    #[serde(default = "default_pacing_max")]
    pub max_ms: u64,
}

impl Default for RowPacing {
    fn default() -> Self {
        Self {
            min_ms: default_pacing_min(),
            max_ms: default_pacing_max(),
        }
    }
}

impl RowPacing {
    pub fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    pub fn delay(&self) -> Duration {
        let lo = self.min_ms.min(self.max_ms);
        let hi = self.min_ms.max(self.max_ms);
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

fn default_pacing_min() -> u64 {
    1_000
}

fn default_pacing_max() -> u64 {
    3_000
}

/// Header for a freshly computed column, e.g. `Play Count (2026-10-18)`.
pub fn column_label(kind: MetricKind, date: NaiveDate) -> String {
    format!("{} ({})", kind.label(), date.format("%Y-%m-%d"))
}

/// Walks a URL column one row at a time and turns it into a metric column.
pub struct BatchProcessor {
    extractor: Arc<dyn MetricExtractor>,
    policy: RetryPolicy,
    pacing: RowPacing,
    normalizer: Normalizer,
    metrics: Arc<MetricsCollector>,
}

impl BatchProcessor {
    pub fn new(
        extractor: Arc<dyn MetricExtractor>,
        policy: RetryPolicy,
        pacing: RowPacing,
        normalizer: Normalizer,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            extractor,
            policy,
            pacing,
            normalizer,
            metrics: metrics.unwrap_or_else(|| Arc::new(MetricsCollector::new())),
        }
    }

    /// One result per row of `url_column`, in row order.
    ///
    /// Per-row faults end up inside the results; only a bad column reference is
    /// returned as an error. Cells that do not parse as URLs fail without a call.
    /// The pacing pause follows rows that made at least one call, except the last.
    pub async fn process_column(
        &self,
        table: &Table,
        url_column: &str,
        kind: MetricKind,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<MetricResult>> {
        let urls = table.column_text(url_column)?;
        let total = urls.len();
        self.metrics.add_rows_queued(total as u64);

        let mut limiter = RateLimiter::new(self.policy.rate_limit());
        let mut results = Vec::with_capacity(total);

        for (index, url) in urls.into_iter().enumerate() {
            let started = Instant::now();
            let result = match url {
                None => {
                    log::debug!("Row {} has no URL, skipping", index + 1);
                    MetricResult::skipped()
                }
                Some(url) => match Url::parse(&url) {
                    Err(e) => {
                        log::warn!("Row {}: '{}' is not a URL ({}), not fetching", index + 1, url, e);
                        MetricResult::failed(0)
                    }
                    Ok(_) => {
                        let request = MetricRequest::new(url, kind);
                        with_retry(&self.policy, &mut limiter, request.url(), || {
                            self.extractor.extract(&request)
                        })
                        .await
                    }
                },
            };

            self.metrics.record(&result, started.elapsed());
            let attempted = result.attempts > 0;
            results.push(result);

            progress.update(
                (index + 1) as f64 / total as f64,
                &format!("Processing row {} of {}", index + 1, total),
            );

            if attempted && index + 1 < total {
                sleep(self.pacing.delay()).await;
            }
        }

        log::debug!("Processed {} rows with {} rate-limited calls", total, limiter.calls());
        Ok(results)
    }

    /// Processes `dataset` in `session` and appends the normalized column to it.
    pub async fn run(
        &self,
        session: &mut Session,
        dataset: &str,
        url_column: &str,
        kind: MetricKind,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        log::info!("Processing {} for dataset '{}' ({})", kind, dataset, url_column);

        let results = {
            let table = session.dataset(dataset)?;
            self.process_column(table, url_column, kind, progress).await?
        };

        let values: Vec<Option<Cell>> = results
            .iter()
            .map(|r| self.normalizer.normalize(r.value, kind).map(Cell::from))
            .collect();
        let label = column_label(kind, chrono::Local::now().date_naive());
        let column = session.dataset_mut(dataset)?.add_column(&label, values)?;

        let summary = RunSummary::tally(dataset, kind, column, &results, started_at);
        log::info!(
            "Dataset '{}' done: {} ok, {} not found, {} failed, {} skipped -> '{}'",
            dataset,
            summary.success,
            summary.not_found,
            summary.failed,
            summary.skipped,
            summary.column
        );
        session.record(summary.clone());
        Ok(summary)
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Publishes a metrics snapshot every 500ms until the receiver is dropped.
    pub fn watch_metrics(&self) -> watch::Receiver<MetricsSnapshot> {
        let (tx, rx) = watch::channel(self.metrics.snapshot());
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                if tx.send(metrics.snapshot()).is_err() {
                    break;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{Extraction, MetricStatus};
    use crate::normalize::MetricValue;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Script {
        Found(u64),
        NotFound,
        Fault,
    }

    #[derive(Default)]
    struct ScriptedExtractor {
        scripts: HashMap<String, Script>,
        calls: Mutex<HashMap<String, usize>>,
        stamps: Mutex<Vec<(String, tokio::time::Instant)>>,
    }

    impl ScriptedExtractor {
        fn with(scripts: &[(&str, Script)]) -> Self {
            Self {
                scripts: scripts
                    .iter()
                    .map(|(url, s)| (url.to_string(), s.clone()))
                    .collect(),
                calls: Mutex::new(HashMap::new()),
                stamps: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }

        fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl MetricExtractor for ScriptedExtractor {
        async fn extract(&self, request: &MetricRequest) -> Result<Extraction> {
            self.stamps
                .lock()
                .unwrap()
                .push((request.url().to_string(), tokio::time::Instant::now()));
            *self
                .calls
                .lock()
                .unwrap()
                .entry(request.url().to_string())
                .or_default() += 1;
            match self.scripts.get(request.url()) {
                Some(Script::Found(value)) => Ok(Extraction::Found {
                    value: *value,
                    strategy: None,
                }),
                Some(Script::NotFound) => Ok(Extraction::NotFound),
                Some(Script::Fault) | None => Err(Error::Browser("connection reset".into())),
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            rate_limit_ms: 0,
            backoff_min_ms: 0,
            backoff_max_ms: 0,
        }
    }

    fn processor(extractor: Arc<ScriptedExtractor>) -> BatchProcessor {
        BatchProcessor::new(
            extractor,
            fast_policy(),
            RowPacing::none(),
            Normalizer::default(),
            None,
        )
    }

    fn sheet() -> Table {
        Table::from_csv_reader(
            "Track,URL\n\
             a,https://x.test/a\n\
             b,\n\
             c,https://x.test/c\n\
             d,https://x.test/d\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn output_is_row_aligned_and_faults_do_not_stop_the_batch() {
        let extractor = Arc::new(ScriptedExtractor::with(&[
            ("https://x.test/a", Script::Found(1_234)),
            ("https://x.test/c", Script::Fault),
            ("https://x.test/d", Script::NotFound),
        ]));
        let batch = processor(extractor.clone());

        let results = batch
            .process_column(&sheet(), "URL", MetricKind::PlayCount, &NoProgress)
            .await
            .unwrap();

        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                MetricStatus::Success,
                MetricStatus::Skipped,
                MetricStatus::Failed,
                MetricStatus::NotFound
            ]
        );
        assert_eq!(results[0].value, Some(1_234));
        assert_eq!(extractor.calls_for("https://x.test/c"), 3);
        assert_eq!(extractor.calls_for("https://x.test/d"), 1);
    }

    #[tokio::test]
    async fn empty_cells_make_no_extraction_calls() {
        let extractor = Arc::new(ScriptedExtractor::default());
        let batch = processor(extractor.clone());
        let table = Table::from_csv_reader("URL\n\n \n\"\"\n".as_bytes()).unwrap();

        let results = batch
            .process_column(&table, "URL", MetricKind::ViewCount, &NoProgress)
            .await
            .unwrap();

        assert_eq!(results.len(), table.len());
        assert!(results.iter().all(|r| *r == MetricResult::skipped()));
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn length_holds_for_any_row_count_under_total_failure() {
        for n in [0usize, 1, 7, 25] {
            let mut csv = String::from("URL\n");
            for i in 0..n {
                csv.push_str(&format!("https://x.test/{}\n", i));
            }
            let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
            let batch = processor(Arc::new(ScriptedExtractor::default()));

            let results = batch
                .process_column(&table, "URL", MetricKind::PlayCount, &NoProgress)
                .await
                .unwrap();
            assert_eq!(results.len(), n);
            assert!(results.iter().all(|r| r.status == MetricStatus::Failed));
        }
    }

    #[tokio::test]
    async fn progress_is_reported_after_every_row() {
        let updates = Mutex::new(Vec::new());
        let sink = |fraction: f64, status: &str| {
            updates.lock().unwrap().push((fraction, status.to_string()));
        };
        let batch = processor(Arc::new(ScriptedExtractor::default()));

        batch
            .process_column(&sheet(), "URL", MetricKind::PlayCount, &sink)
            .await
            .unwrap();

        let updates = updates.into_inner().unwrap();
        assert_eq!(updates.len(), 4);
        assert_eq!(updates[0], (0.25, "Processing row 1 of 4".to_string()));
        assert_eq!(updates[3], (1.0, "Processing row 4 of 4".to_string()));
    }

    #[tokio::test]
    async fn cells_that_are_not_urls_fail_without_a_call() {
        let extractor = Arc::new(ScriptedExtractor::with(&[("https://x.test/a", Script::Found(5))]));
        let batch = processor(extractor.clone());
        let table = Table::from_csv_reader("URL\nsee notes\nhttps://x.test/a\n".as_bytes()).unwrap();

        let results = batch
            .process_column(&table, "URL", MetricKind::PlayCount, &NoProgress)
            .await
            .unwrap();

        assert_eq!(results[0], MetricResult::failed(0));
        assert_eq!(results[1], MetricResult::success(5, 1));
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_and_pacing_separate_attempted_rows_only() {
        let extractor = Arc::new(ScriptedExtractor::with(&[
            ("https://x.test/a", Script::Found(1)),
            ("https://x.test/c", Script::NotFound),
            ("https://x.test/d", Script::Found(2)),
        ]));
        let batch = BatchProcessor::new(
            extractor.clone(),
            RetryPolicy {
                max_attempts: 3,
                rate_limit_ms: 3_000,
                backoff_min_ms: 0,
                backoff_max_ms: 0,
            },
            RowPacing {
                min_ms: 1_000,
                max_ms: 1_000,
            },
            Normalizer::default(),
            None,
        );

        let start = tokio::time::Instant::now();
        batch
            .process_column(&sheet(), "URL", MetricKind::PlayCount, &NoProgress)
            .await
            .unwrap();
        let finished = tokio::time::Instant::now();

        let stamps = extractor.stamps.lock().unwrap().clone();
        let urls: Vec<_> = stamps.iter().map(|(url, _)| url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.test/a", "https://x.test/c", "https://x.test/d"]);

        // rate limit before the first call
        assert_eq!(stamps[0].1 - start, Duration::from_secs(3));
        // pacing after row a, nothing for the blank row b, then the rate limit for c
        assert_eq!(stamps[1].1 - stamps[0].1, Duration::from_secs(4));
        assert_eq!(stamps[2].1 - stamps[1].1, Duration::from_secs(4));
        // no pacing after the last row
        assert_eq!(finished - stamps[2].1, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn no_pacing_after_a_trailing_blank_row() {
        let extractor = Arc::new(ScriptedExtractor::with(&[("https://x.test/a", Script::Found(1))]));
        let batch = BatchProcessor::new(
            extractor.clone(),
            fast_policy(),
            RowPacing {
                min_ms: 2_000,
                max_ms: 2_000,
            },
            Normalizer::default(),
            None,
        );
        let table = Table::from_csv_reader("URL\nhttps://x.test/a\n\"\"\n".as_bytes()).unwrap();

        let start = tokio::time::Instant::now();
        batch
            .process_column(&table, "URL", MetricKind::PlayCount, &NoProgress)
            .await
            .unwrap();

        // one pause after row 1, none after the blank last row
        assert_eq!(tokio::time::Instant::now() - start, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unknown_column_is_fatal() {
        let batch = processor(Arc::new(ScriptedExtractor::default()));
        let err = batch
            .process_column(&sheet(), "Spotify URL", MetricKind::PlayCount, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound(_)));
    }

    #[tokio::test]
    async fn run_appends_a_dated_normalized_column() {
        let extractor = Arc::new(ScriptedExtractor::with(&[
            ("https://x.test/a", Script::Found(2_500_000)),
            ("https://x.test/c", Script::Found(500_000)),
            ("https://x.test/d", Script::Found(0)),
        ]));
        let batch = processor(extractor);
        let mut session = Session::new();
        session.insert("youtube", sheet());

        let first = batch
            .run(&mut session, "youtube", "URL", MetricKind::ViewCount, &NoProgress)
            .await
            .unwrap();
        let second = batch
            .run(&mut session, "youtube", "URL", MetricKind::ViewCount, &NoProgress)
            .await
            .unwrap();

        let today = chrono::Local::now().date_naive();
        assert_eq!(first.column, column_label(MetricKind::ViewCount, today));
        assert_ne!(first.column, second.column);
        assert_eq!(session.history().len(), 2);

        let table = session.dataset("youtube").unwrap();
        let idx = table.column_index(&first.column).unwrap();
        let column: Vec<_> = table.rows().iter().map(|r| r[idx].clone()).collect();
        assert_eq!(
            column,
            vec![
                Some(Cell::Metric(MetricValue::Millions(3.0))),
                None,
                Some(Cell::Metric(MetricValue::Millions(0.5))),
                Some(Cell::Metric(MetricValue::Millions(0.0))),
            ]
        );
        assert_eq!(batch.get_metrics().rows_processed, 8);
    }

    #[tokio::test]
    async fn run_on_missing_dataset_is_fatal() {
        let batch = processor(Arc::new(ScriptedExtractor::default()));
        let mut session = Session::new();
        let err = batch
            .run(&mut session, "spotify", "URL", MetricKind::PlayCount, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound(_)));
    }

    #[test]
    fn label_carries_kind_and_date() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(column_label(MetricKind::PlayCount, date), "Play Count (2026-10-18)");
    }
}
