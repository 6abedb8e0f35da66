use crate::error::{Error, Result};
use crate::model::{MetricKind, MetricResult, MetricStatus};
use crate::table::Table;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// What one batch run did to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub dataset: String,
    pub kind: MetricKind,
    pub column: String,
    pub rows: usize,
    pub success: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn tally(
        dataset: &str,
        kind: MetricKind,
        column: String,
        results: &[MetricResult],
        started_at: DateTime<Utc>,
    ) -> Self {
        let count = |status: MetricStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            dataset: dataset.to_string(),
            kind,
            column,
            rows: results.len(),
            success: count(MetricStatus::Success),
            not_found: count(MetricStatus::NotFound),
            failed: count(MetricStatus::Failed),
            skipped: count(MetricStatus::Skipped),
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Datasets loaded by the user plus what has been run against them.
///
/// Owned by the caller for as long as the user's session lasts and lent to the
/// batch processor for each run.
#[derive(Debug, Default)]
pub struct Session {
    datasets: BTreeMap<String, Table>,
    history: Vec<RunSummary>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads or replaces a dataset.
    pub fn insert(&mut self, name: impl Into<String>, table: Table) {
        self.datasets.insert(name.into(), table);
    }

    pub fn dataset(&self, name: &str) -> Result<&Table> {
        self.datasets
            .get(name)
            .ok_or_else(|| Error::DatasetNotFound(name.to_string()))
    }

    pub fn dataset_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.datasets
            .get_mut(name)
            .ok_or_else(|| Error::DatasetNotFound(name.to_string()))
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.datasets.iter().map(|(name, table)| (name.as_str(), table))
    }

    pub fn record(&mut self, summary: RunSummary) {
        self.history.push(summary);
    }

    pub fn history(&self) -> &[RunSummary] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_dataset_is_an_error() {
        let session = Session::new();
        assert!(matches!(session.dataset("spotify"), Err(Error::DatasetNotFound(_))));
    }

    #[test]
    fn tally_counts_each_status() {
        let results = vec![
            MetricResult::success(10, 1),
            MetricResult::skipped(),
            MetricResult::failed(5),
            MetricResult::not_found(1),
            MetricResult::success(0, 2),
        ];
        let summary = RunSummary::tally(
            "spotify",
            MetricKind::PlayCount,
            "Play Count".into(),
            &results,
            Utc::now(),
        );
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.not_found, 1);
    }

    #[test]
    fn datasets_iterate_by_name() {
        let mut session = Session::new();
        session.insert("youtube", Table::new(vec!["url".into()]));
        session.insert("spotify", Table::new(vec!["url".into()]));
        let names: Vec<_> = session.datasets().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["spotify", "youtube"]);
    }
}
