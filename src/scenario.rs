//! Named scenarios and their execution.

use crate::flows::{self, OrganizationInput, RegionInput, Role};
use crate::locator::{Locator, TextMatch};
use crate::mock::{FieldSuffixValidator, StaticResponse};
use crate::network::{HttpMethod, Intent, MockResponse, ResponseMatcher, UrlPattern};
use crate::session::Session;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub type ScenarioFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Scenario body: drives one session to completion or to its first error.
pub type ScenarioFn = for<'a> fn(&'a Session) -> ScenarioFuture<'a>;

#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub body: ScenarioFn,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}

/// Result of running one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    /// Whether the scenario passed.
    pub passed: bool,
    /// First error, if failed.
    pub error: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ScenarioOutcome {
    pub fn failed(name: impl Into<String>, error: &Error, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.to_string()),
            duration_ms,
        }
    }
}

/// Run `scenario` against `session`. Always yields exactly one outcome.
pub async fn execute(scenario: &Scenario, session: &Session) -> ScenarioOutcome {
    info!("Scenario: {}", scenario.name);
    let start = Instant::now();
    let result = (scenario.body)(session).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            info!("Passed: {} ({}ms)", scenario.name, duration_ms);
            ScenarioOutcome {
                name: scenario.name.to_string(),
                passed: true,
                error: None,
                duration_ms,
            }
        }
        Err(e) => {
            warn!("Failed: {}: {}", scenario.name, e);
            ScenarioOutcome::failed(scenario.name, &e, duration_ms)
        }
    }
}

/// Every built-in scenario, in run order.
pub fn catalog() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "organization/role-by-index",
            description: "create organization, role chosen by option index",
            body: organization_role_by_index,
        },
        Scenario {
            name: "organization/role-by-label",
            description: "create organization, role chosen by label",
            body: organization_role_by_label,
        },
        Scenario {
            name: "region/crud",
            description: "create, verify and delete a region with two countries",
            body: region_crud,
        },
        Scenario {
            name: "user/crud",
            description: "create, check, update, check and delete a user",
            body: user_crud,
        },
        Scenario {
            name: "mock/user-email-domain-accepted",
            description: "mocked user create accepted by email domain",
            body: user_email_accepted,
        },
        Scenario {
            name: "mock/user-email-domain-rejected",
            description: "mocked user create rejected by email domain",
            body: user_email_rejected,
        },
        Scenario {
            name: "mock/organization-static",
            description: "static organization mock with images blocked",
            body: organization_static,
        },
    ]
}

pub fn find(name: &str) -> Option<Scenario> {
    catalog().into_iter().find(|s| s.name == name)
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, chrono::Utc::now().timestamp_millis())
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::AssertionFailed(message()))
    }
}

fn success_toast() -> Locator {
    Locator::text(TextMatch::pattern("created|saved|success")).first()
}

fn organization_role_by_index(session: &Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        let input = OrganizationInput::new(unique("ACME-Labs"), "2024-01-02").ending("2024-12-31");
        let created = flows::organization_flow(session, &input, Some(0)).await?;
        ensure(created.name == input.name, || format!("name {}", created.name))?;
        ensure(created.start_date == "2024-01-02", || {
            format!("start date {}", created.start_date)
        })?;
        ensure(created.end_date.as_deref() == Some("2024-12-31"), || {
            format!("end date {:?}", created.end_date)
        })
    })
}

fn organization_role_by_label(session: &Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        let end = NaiveDate::from_ymd_opt(2025, 9, 30)
            .ok_or_else(|| Error::InvalidDate("2025-09-30".into()))?;
        let input = OrganizationInput::new(unique("Globex-Corp"), "2025-03-15")
            .ending(end)
            .with_role(Role::Supervisor);
        let created = flows::organization_flow(session, &input, None).await?;
        ensure(created.start_date == "2025-03-15", || {
            format!("start date {}", created.start_date)
        })?;
        ensure(created.end_date.as_deref() == Some("2025-09-30"), || {
            format!("end date {:?}", created.end_date)
        })?;
        ensure(created.role.as_deref() == Some("Supervisor"), || {
            format!("role {:?}", created.role)
        })
    })
}

fn region_crud(session: &Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        let input = RegionInput::new(unique("test-region"));
        let created = flows::region_flow(session, &input, &[1, 2]).await?;
        ensure(created.countries.len() == 2, || {
            format!("countries {:?}", created.countries)
        })
    })
}

fn user_crud(session: &Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        flows::user_flow(session).await?;
        Ok(())
    })
}

async fn submit_mocked_user(session: &Session, email: &str) -> Result<()> {
    session
        .route(
            UrlPattern::glob("**/api/users")?,
            Arc::new(
                FieldSuffixValidator::new(HttpMethod::Post, "email", "@example.com")
                    .with_id("user-aaa"),
            ),
        )
        .await?;

    session
        .open("/admin/users", &Locator::button("create"))
        .await?;
    session.click(&Locator::button("create")).await?;
    session
        .fill(&Locator::css(r#"input[name="firstName"]"#), "demo")
        .await?;
    session
        .fill(&Locator::css(r#"input[name="lastName"]"#), "user")
        .await?;
    session
        .fill(&Locator::css(r#"input[name="email"]"#), email)
        .await
}

fn user_email_accepted(session: &Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        let email = format!("{}@example.com", unique("pro"));
        submit_mocked_user(session, &email).await?;

        let mark = session.mark().await?;
        session.click(&Locator::button("save")).await?;
        session
            .await_response(&ResponseMatcher::for_intent("/api/users", Intent::Create), mark)
            .await?;
        session.wait_visible(&success_toast()).await?;
        Ok(())
    })
}

fn user_email_rejected(session: &Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        let email = format!("{}@other.org", unique("pro"));
        submit_mocked_user(session, &email).await?;

        let mark = session.mark().await?;
        session.click(&Locator::button("save")).await?;
        let matcher = ResponseMatcher::for_intent("/api/users", Intent::Create).any_status();
        let resp = session.await_response(&matcher, mark).await?;
        ensure(resp.status == 400, || {
            format!("expected rejection with 400, got {}", resp.status)
        })?;
        let toasts = session.count(&success_toast()).await?;
        ensure(toasts == 0, || "success shown for a rejected user".to_string())
    })
}

fn organization_static(session: &Session) -> ScenarioFuture<'_> {
    Box::pin(async move {
        session
            .route(
                UrlPattern::glob("**/api/organization")?,
                Arc::new(StaticResponse::for_method(
                    HttpMethod::Post,
                    MockResponse::json(201, &json!({ "id": "org-mock-1", "ok": true })),
                )),
            )
            .await?;
        session
            .route(
                UrlPattern::glob("**/*.{png,jpg,jpeg,webp,svg}")?,
                Arc::new(StaticResponse::new(MockResponse::empty(204))),
            )
            .await?;

        let create = Locator::button("create");
        session.open("/organization", &create).await?;
        session.click(&create).await?;
        session
            .fill(&Locator::css(r#"input[name="name"]"#), &unique("mock"))
            .await?;

        let mark = session.mark().await?;
        session.click(&Locator::button("save")).await?;
        session
            .await_response(
                &ResponseMatcher::for_intent("/api/organization", Intent::Create),
                mark,
            )
            .await?;
        session.wait_visible(&success_toast()).await?;
        Ok(())
    })
}
