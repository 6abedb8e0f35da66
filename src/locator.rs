use crate::browser::BrowserSession;
use crate::error::{Error, Result};
use crate::model::MetricKind;
use crate::selector::StructuredSelector;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_PLAYCOUNT_XPATH: &str = "/html/body/div[6]/div/div[2]/div[4]/div/div[2]/div[2]/div/main/section/div[1]/div[3]/div[3]/div/span[8]";
pub const DEFAULT_PLAYCOUNT_CSS: &str = "span[data-testid='playcount']";

/// One way of pointing at an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "query", rename_all = "snake_case")]
pub enum Locator {
    Xpath(String),
    Css(String),
    Structured(StructuredSelector),
}

impl Locator {
    /// Prefixed query understood by ChadSelect, when the locator is a plain string.
    pub fn chadselect_query(&self) -> Option<String> {
        match self {
            Locator::Xpath(path) => Some(format!("xpath:{}", path)),
            Locator::Css(css) => Some(format!("css:{}", css)),
            Locator::Structured(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LocatorStrategy {
    #[validate(length(min = 1))]
    pub name: String,

    pub locator: Locator,

    #[serde(default = "default_locator_timeout")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Restrict the strategy to one metric kind. `None` applies to all.
    #[serde(default)]
    pub kind: Option<MetricKind>,
}

impl LocatorStrategy {
    pub fn new(name: impl Into<String>, locator: Locator, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            locator,
            timeout_ms: timeout.as_millis() as u64,
            kind: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn applies_to(&self, kind: MetricKind) -> bool {
        self.kind.is_none_or(|k| k == kind)
    }
}

fn default_locator_timeout() -> u64 {
    10_000
}

pub fn default_strategies() -> Vec<LocatorStrategy> {
    vec![
        LocatorStrategy {
            name: "structural-path".into(),
            locator: Locator::Xpath(DEFAULT_PLAYCOUNT_XPATH.into()),
            timeout_ms: default_locator_timeout(),
            kind: Some(MetricKind::PlayCount),
        },
        LocatorStrategy {
            name: "playcount-testid".into(),
            locator: Locator::Css(DEFAULT_PLAYCOUNT_CSS.into()),
            timeout_ms: default_locator_timeout(),
            kind: Some(MetricKind::PlayCount),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub strategy: String,
    pub text: String,
}

/// Strategies in priority order, most specific first.
#[derive(Debug, Clone)]
pub struct LocatorSet {
    strategies: Vec<LocatorStrategy>,
}

impl Default for LocatorSet {
    fn default() -> Self {
        Self::new(default_strategies())
    }
}

impl LocatorSet {
    pub fn new(strategies: Vec<LocatorStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[LocatorStrategy] {
        &self.strategies
    }

    /// Tries each strategy for `kind` in order; the first one that answers inside
    /// its window wins. `Ok(None)` means every window ran out.
    pub async fn locate(
        &self,
        session: &mut dyn BrowserSession,
        kind: MetricKind,
    ) -> Result<Option<Located>> {
        for strategy in self.strategies.iter().filter(|s| s.applies_to(kind)) {
            let window = strategy.timeout();
            match tokio::time::timeout(window, session.locate(&strategy.locator, window)).await {
                Ok(Ok(Some(text))) => {
                    log::debug!("Strategy '{}' located: {:?}", strategy.name, text);
                    return Ok(Some(Located {
                        strategy: strategy.name.clone(),
                        text,
                    }));
                }
                Ok(Ok(None)) => {
                    log::debug!("Strategy '{}' found nothing", strategy.name);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    log::debug!(
                        "Strategy '{}' timed out after {}ms",
                        strategy.name,
                        strategy.timeout_ms
                    );
                }
            }
        }
        Ok(None)
    }
}

/// Keeps only the digits of `text`. No digits means no count, not zero.
///
/// More digits than a `u64` holds is an error: the locator grabbed the wrong text.
pub fn parse_count(text: &str) -> Result<Option<u64>> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse()
        .map(Some)
        .map_err(|_| Error::CountOverflow(text.to_string()))
}
