pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{BrowserConfig, BrowserEngine, DatasetConfig, JobConfig, MetadataConfig, OutputConfig};
