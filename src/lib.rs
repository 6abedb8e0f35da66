pub mod batch;
pub mod browser;
pub mod config;
pub mod error;
pub mod extractor;
pub mod locator;
pub mod metadata;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod output;
pub mod progress;
pub mod retry;
pub mod selector;
pub mod session;
pub mod table;

pub use batch::{BatchProcessor, NoProgress, ProgressSink, RowPacing};
pub use error::{Error, Result};
pub use extractor::{Extractor, MetricExtractor, Pathway};
pub use locator::{LocatorSet, LocatorStrategy};
pub use metrics::collector::MetricsCollector;
pub use metrics::snapshot::MetricsSnapshot;
pub use model::{Extraction, MetricKind, MetricRequest, MetricResult, MetricStatus};
pub use normalize::{MetricValue, Normalizer};
pub use retry::{RateLimiter, RetryPolicy, with_retry};
pub use session::{RunSummary, Session};
pub use table::{Cell, Table};
