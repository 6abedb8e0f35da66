//! Turning raw counts into the numbers that land in the output column.

use crate::model::MetricKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

pub const ONE_MILLION: f64 = 1_000_000.0;

/// A normalized cell value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Literal count.
    Count(u64),
    /// Count expressed in millions.
    Millions(f64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Count(n) => write!(f, "{}", n),
            MetricValue::Millions(m) => write!(f, "{}", m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Normalizer {
    /// Scaled view counts at or above this many millions are rounded to whole
    /// millions (half away from zero); below it they keep two decimals.
    #[serde(default = "default_million_threshold")]
    #[validate(range(min = 0.0))]
    pub million_threshold: f64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            million_threshold: default_million_threshold(),
        }
    }
}

fn default_million_threshold() -> f64 {
    1.0
}

impl Normalizer {
    pub fn normalize(&self, raw: Option<u64>, kind: MetricKind) -> Option<MetricValue> {
        let raw = raw?;
        Some(match kind {
            MetricKind::PlayCount => MetricValue::Count(raw),
            MetricKind::ViewCount => {
                let scaled = raw as f64 / ONE_MILLION;
                if scaled >= self.million_threshold {
                    MetricValue::Millions(scaled.round())
                } else {
                    MetricValue::Millions((scaled * 100.0).round() / 100.0)
                }
            }
        })
    }
}
