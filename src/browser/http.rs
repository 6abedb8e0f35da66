use super::{BrowserLauncher, BrowserSession, WaitCondition};
use crate::error::{Error, Result};
use crate::locator::Locator;
use async_trait::async_trait;
use chadselect::ChadSelect;
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Fetches pages over plain HTTP and evaluates locators against the served markup.
///
/// No script runs, so the whole document is available once the body is read and
/// a locator either matches right away or never will.
#[derive(Clone)]
pub struct HttpBrowser {
    client: Client,
}

impl HttpBrowser {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserLauncher for HttpBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            html: None,
        }))
    }
}

pub struct HttpSession {
    client: Client,
    html: Option<String>,
}

impl HttpSession {
    fn page(&self) -> Result<&str> {
        self.html
            .as_deref()
            .ok_or_else(|| Error::Browser("locate called before navigate".to_string()))
    }
}

async fn fetch(client: &Client, url: &str) -> Result<String> {
    let res = client.get(url).send().await?;
    let status = res.status();
    if !status.is_success() {
        return Err(Error::Browser(format!("HTTP error: {}", status)));
    }
    Ok(res.text().await?)
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&mut self, url: &str, wait: WaitCondition, timeout: Duration) -> Result<()> {
        log::debug!("GET {} (wait: {:?})", url, wait);

        let html = tokio::time::timeout(timeout, fetch(&self.client, url))
            .await
            .map_err(|_| Error::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        log::debug!("HTML length: {} bytes", html.len());
        self.html = Some(html);
        Ok(())
    }

    async fn locate(&mut self, locator: &Locator, _timeout: Duration) -> Result<Option<String>> {
        let html = self.page()?;

        let text = match locator {
            Locator::Structured(selector) => selector.first_text(html),
            _ => {
                let query = locator.chadselect_query().unwrap_or_default();
                let mut cs = ChadSelect::new();
                cs.add_html(html.to_string());
                cs.query(-1, &query).into_iter().next()
            }
        };

        Ok(text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    async fn snapshot(&mut self) -> Result<String> {
        Ok(self.page()?.to_string())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
