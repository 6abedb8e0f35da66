use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which popularity signal a column is being enriched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    PlayCount,
    ViewCount,
}

impl MetricKind {
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::PlayCount => "Play Count",
            MetricKind::ViewCount => "View Count",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "play_count" | "plays" | "play" => Ok(MetricKind::PlayCount),
            "view_count" | "views" | "view" => Ok(MetricKind::ViewCount),
            other => Err(format!("unknown metric kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRequest {
    url: String,
    kind: MetricKind,
}

impl MetricRequest {
    pub fn new(url: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Success,
    NotFound,
    Failed,
    /// The URL cell was empty; nothing was attempted.
    Skipped,
}

/// Outcome for one row. `value` is the raw count; `None` is never the same as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricResult {
    pub value: Option<u64>,
    pub status: MetricStatus,
    pub attempts: u32,
}

impl MetricResult {
    pub fn success(value: u64, attempts: u32) -> Self {
        Self {
            value: Some(value),
            status: MetricStatus::Success,
            attempts,
        }
    }

    pub fn not_found(attempts: u32) -> Self {
        Self {
            value: None,
            status: MetricStatus::NotFound,
            attempts,
        }
    }

    pub fn failed(attempts: u32) -> Self {
        Self {
            value: None,
            status: MetricStatus::Failed,
            attempts,
        }
    }

    pub fn skipped() -> Self {
        Self {
            value: None,
            status: MetricStatus::Skipped,
            attempts: 0,
        }
    }
}

/// What a single extraction call found, when it did not fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found {
        value: u64,
        /// Name of the locator strategy that resolved, if a page was rendered.
        strategy: Option<String>,
    },
    NotFound,
}

/// One try at a URL. Only kept long enough to log and decide on a retry.
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub number: u32,
    pub started_at: DateTime<Utc>,
    pub strategy: Option<String>,
    pub error: Option<String>,
}

impl ExtractionAttempt {
    pub fn begin(number: u32) -> Self {
        Self {
            number,
            started_at: Utc::now(),
            strategy: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_cli_spellings() {
        assert_eq!("play-count".parse::<MetricKind>(), Ok(MetricKind::PlayCount));
        assert_eq!("View Count".parse::<MetricKind>(), Ok(MetricKind::ViewCount));
        assert!("likes".parse::<MetricKind>().is_err());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&MetricKind::ViewCount).unwrap();
        assert_eq!(json, "\"view_count\"");
    }

    #[test]
    fn skipped_is_distinct_from_zero() {
        let skipped = MetricResult::skipped();
        assert_eq!(skipped.value, None);
        assert_eq!(skipped.attempts, 0);
        assert_ne!(skipped, MetricResult::success(0, 1));
    }
}
