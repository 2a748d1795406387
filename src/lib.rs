//! # eoka-e2e
//!
//! End-to-end CRUD scenarios for admin consoles. Page objects for the
//! organization, region and user screens sit on top of one option selector
//! (native `<select>` or custom overlay dropdown) and one response-correlation
//! rule, both driven through the [`Driver`] capability trait.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eoka_e2e::{scenario, Config, Runner};
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_e2e::Result<()> {
//! let config = Config::load("suite.yaml")?;
//! let runner = Runner::new(&config);
//! let result = runner.run(&scenario::catalog()).await?;
//! println!("{} passed, {} failed", result.passed(), result.failed());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod flows;
pub mod format;
pub mod locator;
pub mod mock;
pub mod network;
pub mod pages;
pub mod runner;
pub mod scenario;
pub mod select;
pub mod session;

pub use config::{BrowserConfig, Config, MockRule, Timeouts};
pub use driver::{Driver, ElementInfo, EokaDriver};
pub use format::{escape_for_pattern, normalize_date, DateValue};
pub use locator::{Locator, TextMatch};
pub use network::{
    HttpMethod, InterceptedRequest, Intent, MockResponse, ObservedResponse, ResponseMatcher,
    RouteDecision, RouteHandler, UrlPattern,
};
pub use runner::{Runner, SuiteResult};
pub use scenario::{Scenario, ScenarioOutcome};
pub use select::{select_multiple, select_single, ControlKind, Criterion, SelectionTarget};
pub use session::{ResponseMark, Session};

/// Result type for eoka-e2e operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while driving a scenario or loading a suite.
///
/// Every variant terminates the scenario that raised it; nothing in the
/// crate recovers from one locally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("no options found in {0}")]
    NoOptions(String),

    #[error("option '{label}' not found in {control}")]
    OptionNotFound { label: String, control: String },

    #[error("navigation timeout: {page} not ready after {timeout_ms}ms")]
    NavigationTimeout { page: String, timeout_ms: u64 },

    #[error("visibility timeout: {what} not visible after {timeout_ms}ms")]
    VisibilityTimeout { what: String, timeout_ms: u64 },

    #[error("response timeout: no {expected} after {timeout_ms}ms")]
    ResponseTimeout { expected: String, timeout_ms: u64 },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
