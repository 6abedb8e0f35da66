use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;

/// The subset of structured media metadata the engine reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
}

/// Structured metadata lookup for a media URL, without downloading the media.
#[async_trait]
pub trait MetadataQuery: Send + Sync {
    async fn query(&self, url: &str) -> Result<VideoMetadata>;
}

/// Runs the `yt-dlp` executable in flat, no-download mode.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--dump-single-json")
            .arg("--flat-playlist")
            .arg("--skip-download")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg(url)
            .kill_on_drop(true);
        cmd
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp", Duration::from_secs(60))
    }
}

#[async_trait]
impl MetadataQuery for YtDlp {
    async fn query(&self, url: &str) -> Result<VideoMetadata> {
        let output = tokio::time::timeout(self.timeout, self.command(url).output())
            .await
            .map_err(|_| {
                Error::Metadata(format!(
                    "{} timed out after {}ms",
                    self.program,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| Error::Metadata(format!("failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Metadata(format!(
                "{} failed ({}): {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_metadata(&output.stdout)
    }
}

fn parse_metadata(stdout: &[u8]) -> Result<VideoMetadata> {
    serde_json::from_slice(stdout)
        .map_err(|e| Error::Metadata(format!("unreadable metadata JSON: {}", e)))
}
