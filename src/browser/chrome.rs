use super::{BrowserLauncher, BrowserSession, WaitCondition};
use crate::error::{Error, Result};
use crate::locator::Locator;
use async_trait::async_trait;
use headless_chrome::browser::tab::NoElementFound;
use headless_chrome::util::Timeout;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;

/// Quiet period after the load event before a page counts as network-idle.
const IDLE_SETTLE: Duration = Duration::from_millis(500);

/// Headless Chromium. Each launch starts its own browser process.
///
/// headless_chrome is synchronous, so every call is moved onto the blocking pool.
#[derive(Clone, Default)]
pub struct ChromeBrowser {
    user_agent: Option<String>,
}

impl ChromeBrowser {
    pub fn new(user_agent: Option<String>) -> Self {
        Self { user_agent }
    }
}

fn browser_err(e: impl std::fmt::Display) -> Error {
    Error::Browser(e.to_string())
}

/// The element wait ran out or the element is absent. Anything else is a session fault.
fn is_no_match(e: &anyhow::Error) -> bool {
    e.downcast_ref::<Timeout>().is_some() || e.downcast_ref::<NoElementFound>().is_some()
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}

#[async_trait]
impl BrowserLauncher for ChromeBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let user_agent = self.user_agent.clone();
        let (browser, tab) = blocking(move || {
            let browser = Browser::new(LaunchOptions {
                headless: true,
                ..Default::default()
            })
            .map_err(browser_err)?;
            let tab = browser.new_tab().map_err(browser_err)?;
            if let Some(ua) = user_agent.as_deref() {
                tab.set_user_agent(ua, None, None).map_err(browser_err)?;
            }
            Ok((browser, tab))
        })
        .await?;

        Ok(Box::new(ChromeSession { browser, tab }))
    }
}

pub struct ChromeSession {
    browser: Browser,
    tab: Arc<Tab>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str, wait: WaitCondition, timeout: Duration) -> Result<()> {
        let tab = self.tab.clone();
        let target = url.to_string();
        let load = blocking(move || {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&target).map_err(browser_err)?;
            tab.wait_until_navigated().map_err(browser_err)?;
            Ok(())
        });

        tokio::time::timeout(timeout, load)
            .await
            .map_err(|_| Error::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        if wait == WaitCondition::NetworkIdle {
            tokio::time::sleep(IDLE_SETTLE).await;
        }
        Ok(())
    }

    async fn locate(&mut self, locator: &Locator, timeout: Duration) -> Result<Option<String>> {
        let tab = self.tab.clone();
        let locator = locator.clone();
        blocking(move || {
            let element = match &locator {
                Locator::Xpath(path) => tab.wait_for_xpath_with_custom_timeout(path, timeout),
                Locator::Css(css) => tab.wait_for_element_with_custom_timeout(css, timeout),
                Locator::Structured(selector) => {
                    tab.wait_for_element_with_custom_timeout(&selector.to_string(), timeout)
                }
            };
            match element {
                Ok(element) => Ok(Some(element.get_inner_text().map_err(browser_err)?)),
                Err(e) if is_no_match(&e) => {
                    log::debug!("Element wait ended without a match: {}", e);
                    Ok(None)
                }
                Err(e) => Err(browser_err(e)),
            }
        })
        .await
    }

    async fn snapshot(&mut self) -> Result<String> {
        let tab = self.tab.clone();
        blocking(move || tab.get_content().map_err(browser_err)).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromeSession { browser, tab } = *self;
        blocking(move || {
            let closed = tab.close(true).map_err(browser_err);
            drop(browser);
            closed.map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_wait_misses_count_as_no_match() {
        assert!(is_no_match(&anyhow::Error::new(Timeout)));
        assert!(is_no_match(&anyhow::Error::new(NoElementFound {})));
        assert!(!is_no_match(&anyhow::anyhow!("Unable to make method calls because underlying connection is closed")));
    }

    #[test]
    fn session_faults_map_to_browser_errors() {
        let err = browser_err(anyhow::anyhow!("tab crashed"));
        assert!(matches!(err, Error::Browser(ref msg) if msg == "tab crashed"));
    }
}
