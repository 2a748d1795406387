use crate::config::{BrowserConfig, Config};
use crate::driver::{Driver, EokaDriver};
use crate::scenario::{self, Scenario, ScenarioOutcome};
use crate::session::Session;
use crate::{mock, Result};
use eoka::Browser;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Result of running a suite.
#[derive(Debug)]
pub struct SuiteResult {
    /// One outcome per selected scenario, in run order.
    pub outcomes: Vec<ScenarioOutcome>,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl SuiteResult {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs scenarios sequentially, each in a fresh browser.
pub struct Runner {
    config: Config,
}

impl Runner {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Scenarios of `catalog` named by the config, or all of them.
    pub fn select<'a>(&self, catalog: &'a [Scenario]) -> Vec<&'a Scenario> {
        if self.config.scenarios.is_empty() {
            return catalog.iter().collect();
        }
        catalog
            .iter()
            .filter(|s| self.config.scenarios.iter().any(|n| n == s.name))
            .collect()
    }

    /// Run the selected scenarios. No scenario is retried.
    pub async fn run(&self, catalog: &[Scenario]) -> Result<SuiteResult> {
        let start = Instant::now();
        let selected = self.select(catalog);
        info!("Running {} scenario(s) against {}", selected.len(), self.config.base_url);

        let mut outcomes = Vec::with_capacity(selected.len());
        for scenario in selected {
            outcomes.push(self.run_isolated(scenario).await);
        }

        Ok(SuiteResult {
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Register the configured mocks on `session`, then run `scenario`.
    pub async fn run_in(&self, scenario: &Scenario, session: &Session) -> ScenarioOutcome {
        if let Err(e) = mock::install(session, &self.config.mocks).await {
            warn!("Failed to register mocks for {}: {}", scenario.name, e);
            return ScenarioOutcome::failed(scenario.name, &e, 0);
        }
        scenario::execute(scenario, session).await
    }

    async fn run_isolated(&self, scenario: &Scenario) -> ScenarioOutcome {
        let (browser, driver) = match launch(&self.config.browser, self.config.timeouts.poll_ms).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Failed to launch browser for {}: {}", scenario.name, e);
                return ScenarioOutcome::failed(scenario.name, &e, 0);
            }
        };

        let session = Session::new(
            driver.clone() as Arc<dyn Driver>,
            self.config.base_url.clone(),
            self.config.timeouts,
        );
        let outcome = self.run_in(scenario, &session).await;
        if !outcome.passed {
            self.handle_failure(scenario, &driver).await;
        }

        drop(session);
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        outcome
    }

    async fn handle_failure(&self, scenario: &Scenario, driver: &EokaDriver) {
        let Some(ref on_failure) = self.config.on_failure else {
            return;
        };
        let Some(ref screenshot_path) = on_failure.screenshot else {
            return;
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = screenshot_path
            .replace("{scenario}", &scenario.name.replace('/', "-"))
            .replace("{timestamp}", &timestamp.to_string());
        info!("Saving failure screenshot to: {}", path);
        match driver.screenshot().await {
            Ok(data) => {
                if let Err(e) = std::fs::write(&path, data) {
                    warn!("Failed to save screenshot: {}", e);
                }
            }
            Err(e) => warn!("Failed to take screenshot: {}", e),
        }
    }
}

async fn launch(config: &BrowserConfig, poll_ms: u64) -> Result<(Browser, Arc<EokaDriver>)> {
    let stealth = eoka::StealthConfig {
        headless: config.headless,
        proxy: config.proxy.clone(),
        user_agent: config.user_agent.clone(),
        viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
        viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
        ..Default::default()
    };

    debug!(
        "Launching browser (headless: {}, proxy: {:?})",
        config.headless, config.proxy
    );
    let browser = Browser::launch_with_config(stealth).await?;
    let page = browser.new_page("about:blank").await?;
    let driver = EokaDriver::new(page).with_poll_interval(Duration::from_millis(poll_ms));
    Ok((browser, Arc::new(driver)))
}
