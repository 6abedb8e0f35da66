use crate::error::Result;
use crate::locator::Locator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod http;
#[cfg(feature = "chrome")]
pub mod chrome;

pub use http::HttpBrowser;
#[cfg(feature = "chrome")]
pub use chrome::ChromeBrowser;

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// No outstanding network requests for a short quiet period.
    #[default]
    NetworkIdle,
    /// The document `load` event fired.
    Load,
}

/// Starts browser sessions. One session per extraction call.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// A single page-rendering session.
///
/// `close` consumes the session; callers must reach it on every exit path.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str, wait: WaitCondition, timeout: Duration) -> Result<()>;

    /// Text of the located element, or `None` if nothing matched within `timeout`.
    async fn locate(&mut self, locator: &Locator, timeout: Duration) -> Result<Option<String>>;

    /// Current page markup, for diagnostics.
    async fn snapshot(&mut self) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;
}
