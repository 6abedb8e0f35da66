use crate::batch::{BatchProcessor, RowPacing};
use crate::browser::{BrowserLauncher, HttpBrowser, http::DEFAULT_USER_AGENT};
use crate::config::schema::{
    BrowserConfig, BrowserEngine, DatasetConfig, JobConfig, MetadataConfig, OutputConfig,
};
use crate::error::{Error, Result};
use crate::extractor::{Extractor, ExtractorSettings};
use crate::locator::{LocatorSet, default_strategies};
use crate::metadata::YtDlp;
use crate::metrics::collector::MetricsCollector;
use crate::normalize::Normalizer;
use crate::output::{OutputHandler, console::ConsoleOutput, csv::CsvOutput, json::JsonOutput, sqlite::SqliteOutput};
use crate::retry::RetryPolicy;
use crate::session::Session;
use crate::table::Table;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<JobConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        Self::load_with_inheritance(path, &mut visited, false)
    }

    fn load_with_inheritance(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        is_parent_load: bool,
    ) -> Result<JobConfig> {
        let path = fs::canonicalize(path).map_err(|e| {
            Error::Config(format!("{}: {}", path.display(), e))
        })?;

        if visited.contains(&path) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }
        visited.insert(path.clone());

        let mut config = Self::load_file(&path)?;
        let base_dir = path.parent()
            .ok_or_else(|| Error::Config(format!(
                "Cannot determine parent directory for {}",
                path.display()
            )))?;

        // Dataset inputs are relative to the file that names them.
        for dataset in &mut config.datasets {
            dataset.input = Self::resolve(base_dir, &dataset.input);
        }

        let final_config = if let Some(parent_path_str) = &config.extends {
            let parent_path = base_dir.join(parent_path_str);

            let parent_config = Self::load_with_inheritance(&parent_path, visited, true)?;
            Self::merge_configs(parent_config, config)
        } else {
            config
        };

        if !is_parent_load {
            final_config.validate()?;
            for dataset in &final_config.datasets {
                dataset.validate()?;
            }
        }

        Ok(final_config)
    }

    fn resolve(base_dir: &Path, input: &str) -> String {
        let input_path = Path::new(input);
        if input.is_empty() || input_path.is_absolute() {
            input.to_string()
        } else {
            base_dir.join(input_path).to_string_lossy().into_owned()
        }
    }

    fn load_file(path: &Path) -> Result<JobConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    /// Child values win wherever the child departs from the defaults.
    fn merge_configs(mut parent: JobConfig, child: JobConfig) -> JobConfig {
        if !child.name.is_empty() {
            parent.name = child.name;
        }
        if !child.datasets.is_empty() {
            parent.datasets = child.datasets;
        }
        if child.retry != RetryPolicy::default() {
            parent.retry = child.retry;
        }
        if child.pacing != RowPacing::default() {
            parent.pacing = child.pacing;
        }
        if child.browser != BrowserConfig::default() {
            parent.browser = child.browser;
        }
        if child.locators != default_strategies() {
            parent.locators = child.locators;
        }
        if child.metadata != MetadataConfig::default() {
            parent.metadata = child.metadata;
        }
        if child.normalize != Normalizer::default() {
            parent.normalize = child.normalize;
        }
        if child.snapshot_dir.is_some() {
            parent.snapshot_dir = child.snapshot_dir;
        }
        if child.output.is_some() {
            parent.output = child.output;
        }

        for (kind, pathway) in child.pathways {
            parent.pathways.insert(kind, pathway);
        }

        parent.extends = None;
        parent
    }

    fn create_browser(config: &BrowserConfig) -> Result<Arc<dyn BrowserLauncher>> {
        match config.engine {
            BrowserEngine::Http => {
                let ua = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
                Ok(Arc::new(HttpBrowser::new(ua)?))
            }
            #[cfg(feature = "chrome")]
            BrowserEngine::Chrome => Ok(Arc::new(crate::browser::ChromeBrowser::new(
                config.user_agent.clone(),
            ))),
            #[cfg(not(feature = "chrome"))]
            BrowserEngine::Chrome => Err(Error::Config(
                "browser engine 'chrome' needs the `chrome` cargo feature".to_string(),
            )),
        }
    }

    pub fn create_extractor(config: &JobConfig) -> Result<Extractor> {
        let browser = Self::create_browser(&config.browser)?;
        let metadata = Arc::new(YtDlp::new(
            config.metadata.program.clone(),
            Duration::from_millis(config.metadata.timeout_ms),
        ));
        let settings = ExtractorSettings {
            wait: config.browser.wait,
            navigation_timeout: Duration::from_millis(config.browser.navigation_timeout_ms),
            snapshot_dir: config.snapshot_dir.as_ref().map(PathBuf::from),
        };

        let mut extractor = Extractor::new(
            browser,
            metadata,
            LocatorSet::new(config.locators.clone()),
            settings,
        );
        for (kind, pathway) in &config.pathways {
            extractor = extractor.with_pathway(*kind, *pathway);
        }
        Ok(extractor)
    }

    /// Extractor for one dataset; its own `pathway` wins over the job's `pathways`.
    pub fn create_dataset_extractor(config: &JobConfig, dataset: &DatasetConfig) -> Result<Extractor> {
        let extractor = Self::create_extractor(config)?;
        Ok(match dataset.pathway {
            Some(pathway) => extractor.with_pathway(dataset.kind, pathway),
            None => extractor,
        })
    }

    pub fn create_processor(
        config: &JobConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<BatchProcessor> {
        let extractor = Self::create_extractor(config)?;
        Ok(Self::processor_with(config, extractor, metrics))
    }

    pub fn create_dataset_processor(
        config: &JobConfig,
        dataset: &DatasetConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<BatchProcessor> {
        let extractor = Self::create_dataset_extractor(config, dataset)?;
        Ok(Self::processor_with(config, extractor, metrics))
    }

    fn processor_with(
        config: &JobConfig,
        extractor: Extractor,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> BatchProcessor {
        BatchProcessor::new(
            Arc::new(extractor),
            config.retry.clone(),
            config.pacing.clone(),
            config.normalize.clone(),
            metrics,
        )
    }

    /// Reads every configured dataset into a fresh session.
    pub fn load_session(config: &JobConfig) -> Result<Session> {
        let mut session = Session::new();
        for dataset in &config.datasets {
            let table = Table::from_csv_path(&dataset.input)?;
            log::info!(
                "Loaded dataset '{}' from {} ({} rows)",
                dataset.name,
                dataset.input,
                table.len()
            );
            session.insert(dataset.name.clone(), table);
        }
        Ok(session)
    }

    pub async fn create_output(
        config: &JobConfig,
        multi: Option<Arc<indicatif::MultiProgress>>,
    ) -> Result<Box<dyn OutputHandler>> {
        let handler: Box<dyn OutputHandler> = if let Some(out_config) = &config.output {
            match out_config {
                OutputConfig::Console => Box::new(ConsoleOutput::new(multi)),
                OutputConfig::Json { path } => Box::new(JsonOutput::new(PathBuf::from(path))),
                OutputConfig::Csv { path } => Box::new(CsvOutput::new(PathBuf::from(path))),
                OutputConfig::Sqlite { path, table_prefix } => {
                    Box::new(SqliteOutput::new(PathBuf::from(path), table_prefix.clone()).await?)
                }
            }
        } else {
            Box::new(ConsoleOutput::new(multi))
        };
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Pathway;
    use crate::model::MetricKind;
    use std::io::Write;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn yaml_job_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "job.yaml",
            "name: charts\n\
             datasets:\n\
             \x20 - name: spotify\n\
             \x20   input: tracks.csv\n\
             \x20   url_column: Spotify URL\n\
             \x20   kind: play_count\n",
        );

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.name, "charts");
        assert_eq!(config.datasets[0].kind, MetricKind::PlayCount);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.locators, default_strategies());
        assert_eq!(config.browser.navigation_timeout_ms, 60_000);
        assert!(config.output.is_none());
    }

    #[test]
    fn child_overrides_parent() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "base.toml",
            r#"
name = "base"

[retry]
max_attempts = 3
rate_limit_ms = 1000

[[datasets]]
name = "youtube"
input = "videos.csv"
url_column = "YouTube"
kind = "view_count"
"#,
        );
        let child = write(
            dir.path(),
            "child.json",
            r#"{
                "name": "weekly",
                "extends": "base.toml",
                "pathways": { "view_count": "rendered" },
                "output": { "type": "json", "path": "out.json" }
            }"#,
        );

        let config = ConfigLoader::load(&child).unwrap();
        assert_eq!(config.name, "weekly");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.rate_limit_ms, 1000);
        assert_eq!(config.datasets[0].name, "youtube");
        assert_eq!(config.pathways.get(&MetricKind::ViewCount), Some(&Pathway::Rendered));
        assert_eq!(
            config.output,
            Some(OutputConfig::Json {
                path: "out.json".into()
            })
        );
        assert!(config.extends.is_none());
    }

    #[test]
    fn circular_inheritance_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"name":"a","extends":"b.json"}"#);
        let b = write(dir.path(), "b.json", r#"{"name":"b","extends":"a.json"}"#);

        let err = ConfigLoader::load(&b).unwrap_err();
        assert!(err.to_string().contains("Circular inheritance"));
    }

    #[test]
    fn job_without_datasets_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.json", r#"{"name":"nothing"}"#);
        assert!(matches!(ConfigLoader::load(&path), Err(Error::Validation(_))));
    }

    #[test]
    fn zero_attempts_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "bad.json",
            r#"{"name":"x","retry":{"max_attempts":0},
                "datasets":[{"name":"s","input":"a.csv","url_column":"u","kind":"play_count"}]}"#,
        );
        assert!(matches!(ConfigLoader::load(&path), Err(Error::Validation(_))));
    }

    #[test]
    fn unsupported_extension_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "job.ini", "name=x");
        assert!(matches!(ConfigLoader::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn session_loads_every_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write(dir.path(), "tracks.csv", "Track,URL\na,https://x.test/a\n");
        let config: JobConfig = serde_json::from_value(serde_json::json!({
            "name": "s",
            "datasets": [{
                "name": "spotify",
                "input": csv.to_string_lossy(),
                "url_column": "URL",
                "kind": "play_count"
            }]
        }))
        .unwrap();

        let session = ConfigLoader::load_session(&config).unwrap();
        assert_eq!(session.dataset("spotify").unwrap().len(), 1);
    }

    #[test]
    fn dataset_inputs_resolve_against_the_file_that_names_them() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("shared")).unwrap();
        write(
            &dir.path().join("shared"),
            "base.yaml",
            "datasets:\n\
             \x20 - name: youtube\n\
             \x20   input: videos.csv\n\
             \x20   url_column: YouTube\n\
             \x20   kind: view_count\n",
        );
        write(&dir.path().join("shared"), "videos.csv", "YouTube\nhttps://youtu.be/x\n");
        let child = write(
            dir.path(),
            "job.json",
            r#"{"name":"weekly","extends":"shared/base.yaml"}"#,
        );

        let config = ConfigLoader::load(&child).unwrap();
        let input = PathBuf::from(&config.datasets[0].input);
        assert!(input.is_absolute());
        assert!(input.ends_with("shared/videos.csv"));

        let session = ConfigLoader::load_session(&config).unwrap();
        assert_eq!(session.dataset("youtube").unwrap().len(), 1);
    }

    #[test]
    fn dataset_pathway_overrides_the_job_for_that_dataset_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "job.json",
            r#"{
                "name": "mixed",
                "datasets": [
                    {"name":"yt","input":"a.csv","url_column":"u","kind":"view_count","pathway":"rendered"},
                    {"name":"yt2","input":"b.csv","url_column":"u","kind":"view_count"}
                ]
            }"#,
        );

        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.datasets[0].pathway, Some(Pathway::Rendered));
        assert_eq!(config.datasets[1].pathway, None);

        let first = ConfigLoader::create_dataset_extractor(&config, &config.datasets[0]).unwrap();
        assert_eq!(first.pathway(MetricKind::ViewCount), Pathway::Rendered);
        assert_eq!(first.pathway(MetricKind::PlayCount), Pathway::Rendered);

        let second = ConfigLoader::create_dataset_extractor(&config, &config.datasets[1]).unwrap();
        assert_eq!(second.pathway(MetricKind::ViewCount), Pathway::Metadata);
    }

    #[cfg(not(feature = "chrome"))]
    #[test]
    fn chrome_engine_requires_feature() {
        let config = BrowserConfig {
            engine: BrowserEngine::Chrome,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::create_browser(&config),
            Err(Error::Config(_))
        ));
    }
}
