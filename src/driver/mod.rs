//! The browser capability provider.
//!
//! Everything above this module talks to the browser through [`Driver`]:
//! navigate, query, click, fill, native selection, observed responses and
//! request routing. Bounded waits are provided on top of those primitives,
//! so every implementation gets the same timeout semantics.

mod cdp;

pub use cdp::EokaDriver;

use crate::locator::Locator;
use crate::network::{ObservedResponse, ResponseMatcher, RouteHandler, UrlPattern};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of one matched element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementInfo {
    /// Driver-specific handle used to act on the element again.
    #[serde(default)]
    pub handle: String,
    /// Lowercase tag name.
    pub tag: String,
    /// Raw text content (untrimmed).
    #[serde(default)]
    pub text: String,
    pub visible: bool,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Browser operations a scenario needs. Actions target the first match.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Load a URL and wait for the document.
    async fn goto(&self, url: &str) -> Result<()>;

    /// All current matches, in document order.
    async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>>;

    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Replace the value of a text input.
    async fn fill(&self, locator: &Locator, value: &str) -> Result<()>;

    /// Choose the option of a native `<select>` whose trimmed label equals
    /// `label` (case-insensitive). A `multiple` select keeps its other
    /// selected options. Returns the chosen label.
    async fn select_by_label(&self, locator: &Locator, label: &str) -> Result<String>;

    /// Every response observed since the driver was created.
    async fn responses(&self) -> Result<Vec<ObservedResponse>>;

    /// Register a route. Later routes take precedence over earlier ones.
    async fn route(&self, pattern: UrlPattern, handler: Arc<dyn RouteHandler>) -> Result<()>;

    /// Delay between two polls of a bounded wait.
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(100)
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        Ok(self.query(locator).await?.len())
    }

    async fn first(&self, locator: &Locator) -> Result<Option<ElementInfo>> {
        Ok(self.query(locator).await?.into_iter().next())
    }

    /// Sequence number of the newest observed response (0 when none).
    async fn last_response_seq(&self) -> Result<u64> {
        Ok(self.responses().await?.last().map(|r| r.seq).unwrap_or(0))
    }

    /// Wait until the first match exists and is visible.
    async fn wait_for_visible(&self, locator: &Locator, timeout_ms: u64) -> Result<ElementInfo> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(el) = self.first(locator).await? {
                if el.visible {
                    return Ok(el);
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::VisibilityTimeout {
                    what: locator.to_string(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    /// Wait until exactly `expected` elements match.
    async fn wait_for_count(&self, locator: &Locator, expected: usize, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let n = self.count(locator).await?;
            if n == expected {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "{} matched {} elements, expected {} after {}ms",
                    locator, n, expected, timeout_ms
                )));
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    /// Wait until the first match carries `name="value"`.
    async fn wait_for_attribute(
        &self,
        locator: &Locator,
        name: &str,
        value: &str,
        timeout_ms: u64,
    ) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let current = self
                .first(locator)
                .await?
                .and_then(|el| el.attr(name).map(str::to_string));
            if current.as_deref() == Some(value) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "{} {}={:?}, expected {:?} after {}ms",
                    locator, name, current, value, timeout_ms
                )));
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    /// Wait for a response newer than `after_seq` that satisfies `matcher`.
    async fn wait_for_response(
        &self,
        matcher: &ResponseMatcher,
        after_seq: u64,
        timeout_ms: u64,
    ) -> Result<ObservedResponse> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(hit) = self
                .responses()
                .await?
                .into_iter()
                .find(|r| r.seq > after_seq && matcher.matches(r))
            {
                return Ok(hit);
            }
            if Instant::now() >= deadline {
                return Err(Error::ResponseTimeout {
                    expected: matcher.to_string(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }
}
