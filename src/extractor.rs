use crate::browser::{BrowserLauncher, BrowserSession, WaitCondition};
use crate::error::{Error, Result};
use crate::locator::{LocatorSet, parse_count};
use crate::metadata::MetadataQuery;
use crate::model::{Extraction, MetricKind, MetricRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const SNAPSHOT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// How a metric is obtained for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pathway {
    /// Render the page in a browser session and read the value with the locator set.
    Rendered,
    /// Ask the metadata capability for a structured field.
    Metadata,
}

impl Pathway {
    pub fn default_for(kind: MetricKind) -> Self {
        match kind {
            MetricKind::PlayCount => Pathway::Rendered,
            MetricKind::ViewCount => Pathway::Metadata,
        }
    }
}

/// One URL in, one count (or a definitive "not found") out. Errors are faults.
#[async_trait]
pub trait MetricExtractor: Send + Sync {
    async fn extract(&self, request: &MetricRequest) -> Result<Extraction>;
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub wait: WaitCondition,
    pub navigation_timeout: Duration,
    /// Where page snapshots go when no locator matched. `None` disables them.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            wait: WaitCondition::NetworkIdle,
            navigation_timeout: Duration::from_secs(60),
            snapshot_dir: None,
        }
    }
}

pub struct Extractor {
    browser: Arc<dyn BrowserLauncher>,
    metadata: Arc<dyn MetadataQuery>,
    locators: LocatorSet,
    pathways: HashMap<MetricKind, Pathway>,
    settings: ExtractorSettings,
}

impl Extractor {
    pub fn new(
        browser: Arc<dyn BrowserLauncher>,
        metadata: Arc<dyn MetadataQuery>,
        locators: LocatorSet,
        settings: ExtractorSettings,
    ) -> Self {
        Self {
            browser,
            metadata,
            locators,
            pathways: HashMap::new(),
            settings,
        }
    }

    /// Overrides the pathway used for `kind`.
    pub fn with_pathway(mut self, kind: MetricKind, pathway: Pathway) -> Self {
        self.pathways.insert(kind, pathway);
        self
    }

    pub fn pathway(&self, kind: MetricKind) -> Pathway {
        self.pathways
            .get(&kind)
            .copied()
            .unwrap_or_else(|| Pathway::default_for(kind))
    }

    async fn render(&self, request: &MetricRequest) -> Result<Extraction> {
        let mut session = self.browser.launch().await?;
        let outcome = self.read_page(session.as_mut(), request).await;
        if let Err(e) = session.close().await {
            log::warn!("Failed to close browser session for {}: {}", request.url(), e);
        }
        outcome
    }

    async fn read_page(
        &self,
        session: &mut dyn BrowserSession,
        request: &MetricRequest,
    ) -> Result<Extraction> {
        session
            .navigate(request.url(), self.settings.wait, self.settings.navigation_timeout)
            .await?;

        match self.locators.locate(session, request.kind()).await? {
            Some(located) => match parse_count(&located.text)? {
                Some(value) => Ok(Extraction::Found {
                    value,
                    strategy: Some(located.strategy),
                }),
                None => {
                    log::warn!(
                        "{} element for {} has no digits: {:?}",
                        request.kind(),
                        request.url(),
                        located.text
                    );
                    self.save_snapshot(session, request.url()).await;
                    Ok(Extraction::NotFound)
                }
            },
            None => {
                log::warn!("{} element not found for URL: {}", request.kind(), request.url());
                self.save_snapshot(session, request.url()).await;
                Ok(Extraction::NotFound)
            }
        }
    }

    async fn query(&self, request: &MetricRequest) -> Result<Extraction> {
        let metadata = self.metadata.query(request.url()).await?;
        if metadata.view_count.is_none() {
            log::debug!("No view_count field for {}, recording 0", request.url());
        }
        Ok(Extraction::Found {
            value: metadata.view_count.unwrap_or(0),
            strategy: None,
        })
    }

    /// Writes the page to the snapshot directory before returning. Never fails the call.
    async fn save_snapshot(&self, session: &mut dyn BrowserSession, url: &str) {
        let Some(dir) = self.settings.snapshot_dir.as_deref() else {
            return;
        };
        let html = match session.snapshot().await {
            Ok(html) => html,
            Err(e) => {
                log::debug!("No snapshot for {}: {}", url, e);
                return;
            }
        };
        let path = dir.join(snapshot_file_name(url));
        match tokio::time::timeout(SNAPSHOT_WRITE_TIMEOUT, write_snapshot(dir, &path, html)).await {
            Ok(Ok(())) => log::info!("Saved page snapshot to {}", path.display()),
            Ok(Err(e)) => log::warn!("Could not write snapshot {}: {}", path.display(), e),
            Err(_) => log::warn!(
                "Gave up writing snapshot {} after {}ms",
                path.display(),
                SNAPSHOT_WRITE_TIMEOUT.as_millis()
            ),
        }
    }
}

#[async_trait]
impl MetricExtractor for Extractor {
    async fn extract(&self, request: &MetricRequest) -> Result<Extraction> {
        Url::parse(request.url()).map_err(|source| Error::InvalidUrl {
            url: request.url().to_string(),
            source,
        })?;

        log::info!("Visiting: {}", request.url());
        match self.pathway(request.kind()) {
            Pathway::Rendered => self.render(request).await,
            Pathway::Metadata => self.query(request).await,
        }
    }
}

async fn write_snapshot(dir: &Path, path: &Path, html: String) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, html).await
}

fn snapshot_file_name(url: &str) -> String {
    let slug: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(80)
        .collect();
    format!("{}-{}.html", chrono::Utc::now().format("%Y%m%dT%H%M%S%3f"), slug)
}
