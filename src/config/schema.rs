use crate::batch::RowPacing;
use crate::browser::WaitCondition;
use crate::extractor::Pathway;
use crate::locator::{LocatorStrategy, default_strategies};
use crate::model::MetricKind;
use crate::normalize::Normalizer;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobConfig {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    #[validate(length(min = 1))]
    pub datasets: Vec<DatasetConfig>,

    #[serde(default)]
    #[validate]
    pub retry: RetryPolicy,

    #[serde(default)]
    #[validate]
    pub pacing: RowPacing,

    #[serde(default)]
    pub browser: BrowserConfig,

    /// Locator strategies in priority order.
    #[serde(default = "default_strategies")]
    #[validate]
    pub locators: Vec<LocatorStrategy>,

    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Per-kind override of how a metric is obtained.
    #[serde(default)]
    pub pathways: HashMap<MetricKind, Pathway>,

    #[serde(default)]
    #[validate]
    pub normalize: Normalizer,

    /// Directory for page snapshots when no locator matches.
    #[serde(default)]
    pub snapshot_dir: Option<String>,

    #[serde(default)]
    pub output: Option<OutputConfig>,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            datasets: Vec::new(),
            retry: RetryPolicy::default(),
            pacing: RowPacing::default(),
            browser: BrowserConfig::default(),
            locators: default_strategies(),
            metadata: MetadataConfig::default(),
            pathways: HashMap::new(),
            normalize: Normalizer::default(),
            snapshot_dir: None,
            output: None,
            extends: None,
        }
    }
}

/// One table to enrich.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DatasetConfig {
    #[validate(length(min = 1))]
    pub name: String,

    /// CSV file with a header row.
    #[validate(length(min = 1))]
    pub input: String,

    #[validate(length(min = 1))]
    pub url_column: String,

    pub kind: MetricKind,

    /// Overrides the job-level pathway for this dataset's kind.
    #[serde(default)]
    pub pathway: Option<Pathway>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Http,
    Chrome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub engine: BrowserEngine,

    #[serde(default)]
    pub wait: WaitCondition,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::default(),
            wait: WaitCondition::default(),
            navigation_timeout_ms: default_navigation_timeout(),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_program")]
    pub program: String,

    #[serde(default = "default_metadata_timeout")]
    pub timeout_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            program: default_metadata_program(),
            timeout_ms: default_metadata_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputConfig {
    Console,
    Json {
        path: String,
    },
    /// One file per dataset; with a single dataset the path is used as is.
    Csv {
        path: String,
    },
    Sqlite {
        path: String,
        #[serde(default = "default_table_prefix")]
        table_prefix: String,
    },
}

fn default_navigation_timeout() -> u64 {
    60_000
}

fn default_metadata_program() -> String {
    "yt-dlp".to_string()
}

fn default_metadata_timeout() -> u64 {
    60_000
}

fn default_table_prefix() -> String {
    "metrics".to_string()
}
