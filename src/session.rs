//! Per-scenario context handed to pages, flows and scenario bodies.

use crate::config::Timeouts;
use crate::driver::{Driver, ElementInfo};
use crate::locator::Locator;
use crate::network::{ObservedResponse, ResponseMatcher, RouteHandler, UrlPattern};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Response sequence number taken before an action. Correlation only
/// considers responses observed after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResponseMark(pub u64);

/// Driver, base URL and timeouts for one scenario.
#[derive(Clone)]
pub struct Session {
    driver: Arc<dyn Driver>,
    base_url: String,
    timeouts: Timeouts,
}

impl Session {
    pub fn new(driver: Arc<dyn Driver>, base_url: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            driver,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeouts,
        }
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an application path.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Load `path` and wait for `ready` to become visible.
    pub async fn open(&self, path: &str, ready: &Locator) -> Result<()> {
        let url = self.url(path);
        debug!("open: {}", url);
        self.driver.goto(&url).await?;
        match self
            .driver
            .wait_for_visible(ready, self.timeouts.navigation_ms)
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::VisibilityTimeout { timeout_ms, .. }) => Err(Error::NavigationTimeout {
                page: path.to_string(),
                timeout_ms,
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn mark(&self) -> Result<ResponseMark> {
        Ok(ResponseMark(self.driver.last_response_seq().await?))
    }

    /// First response after `mark` that satisfies `matcher`.
    pub async fn await_response(
        &self,
        matcher: &ResponseMatcher,
        mark: ResponseMark,
    ) -> Result<ObservedResponse> {
        let resp = self
            .driver
            .wait_for_response(matcher, mark.0, self.timeouts.response_ms)
            .await?;
        debug!("correlated: {} {} {}", resp.method, resp.url, resp.status);
        Ok(resp)
    }

    pub async fn wait_visible(&self, locator: &Locator) -> Result<ElementInfo> {
        self.driver
            .wait_for_visible(locator, self.timeouts.visibility_ms)
            .await
    }

    /// Wait until nothing matches `locator`.
    pub async fn wait_gone(&self, locator: &Locator) -> Result<()> {
        self.driver
            .wait_for_count(locator, 0, self.timeouts.visibility_ms)
            .await
    }

    pub async fn wait_attribute(&self, locator: &Locator, name: &str, value: &str) -> Result<()> {
        self.driver
            .wait_for_attribute(locator, name, value, self.timeouts.visibility_ms)
            .await
    }

    /// Click the first match once it is visible.
    pub async fn click(&self, locator: &Locator) -> Result<()> {
        self.wait_visible(locator).await?;
        self.driver.click(locator).await
    }

    /// Fill the first match once it is visible.
    pub async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        self.wait_visible(locator).await?;
        self.driver.fill(locator, value).await
    }

    pub async fn query(&self, locator: &Locator) -> Result<Vec<ElementInfo>> {
        self.driver.query(locator).await
    }

    pub async fn count(&self, locator: &Locator) -> Result<usize> {
        self.driver.count(locator).await
    }

    pub async fn route(&self, pattern: UrlPattern, handler: Arc<dyn RouteHandler>) -> Result<()> {
        self.driver.route(pattern, handler).await
    }
}
