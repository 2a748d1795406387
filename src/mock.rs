//! Route handlers for mocked scenarios.

use crate::config::MockRule;
use crate::network::{
    HttpMethod, InterceptedRequest, MockResponse, RouteDecision, RouteHandler,
};
use crate::session::Session;
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Fulfils matching requests with a fixed response.
#[derive(Debug, Clone)]
pub struct StaticResponse {
    /// Only this method is answered; others fall back.
    pub method: Option<HttpMethod>,
    pub response: MockResponse,
}

impl StaticResponse {
    pub fn new(response: MockResponse) -> Self {
        Self {
            method: None,
            response,
        }
    }

    pub fn for_method(method: HttpMethod, response: MockResponse) -> Self {
        Self {
            method: Some(method),
            response,
        }
    }
}

impl RouteHandler for StaticResponse {
    fn handle(&self, request: &InterceptedRequest) -> RouteDecision {
        match self.method {
            Some(m) if m != request.method => RouteDecision::Fallback,
            _ => RouteDecision::Fulfill(self.response.clone()),
        }
    }
}

/// Accepts a request when a JSON body field ends with a suffix.
///
/// Accepted requests are answered with the body echoed back plus a
/// generated `id` and `active: true`; rejected ones with `{"error": ...}`.
#[derive(Debug, Clone)]
pub struct FieldSuffixValidator {
    pub method: HttpMethod,
    pub field: String,
    pub suffix: String,
    pub accept_status: u16,
    pub reject_status: u16,
    pub reject_message: String,
    pub id: String,
}

impl FieldSuffixValidator {
    pub fn new(method: HttpMethod, field: impl Into<String>, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self {
            method,
            field: field.into(),
            reject_message: format!("Only *{} allowed", suffix),
            suffix,
            accept_status: 201,
            reject_status: 400,
            id: "mock-1".into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    fn accepts(&self, body: &Value) -> bool {
        body.get(&self.field)
            .and_then(Value::as_str)
            .map(|v| v.ends_with(&self.suffix))
            .unwrap_or(false)
    }
}

impl RouteHandler for FieldSuffixValidator {
    fn handle(&self, request: &InterceptedRequest) -> RouteDecision {
        if request.method != self.method {
            return RouteDecision::Fallback;
        }
        let body = request.json_body().unwrap_or_else(|| json!({}));
        if !self.accepts(&body) {
            debug!("mock rejected {} {}", request.method, request.url);
            return RouteDecision::Fulfill(MockResponse::json(
                self.reject_status,
                &json!({ "error": self.reject_message }),
            ));
        }

        let mut echoed = serde_json::Map::new();
        echoed.insert("id".into(), json!(self.id));
        if let Value::Object(fields) = body {
            echoed.extend(fields);
        }
        echoed.insert("active".into(), json!(true));
        RouteDecision::Fulfill(MockResponse::json(
            self.accept_status,
            &Value::Object(echoed),
        ))
    }
}

impl MockRule {
    /// Handler implementing this rule.
    pub fn handler(&self) -> Arc<dyn RouteHandler> {
        match self.require_suffix {
            Some(ref rule) => {
                let mut v = FieldSuffixValidator::new(
                    self.method.unwrap_or(HttpMethod::Post),
                    rule.field.clone(),
                    rule.suffix.clone(),
                );
                v.accept_status = self.status;
                v.reject_status = self.reject_status;
                if let Some(ref msg) = self.reject_message {
                    v.reject_message = msg.clone();
                }
                Arc::new(v)
            }
            None => {
                let response = match self.body {
                    Some(ref body) => MockResponse::json(self.status, body),
                    None => MockResponse::empty(self.status),
                };
                Arc::new(StaticResponse {
                    method: self.method,
                    response,
                })
            }
        }
    }
}

/// Register every rule on the session's driver, in declaration order.
pub async fn install(session: &Session, rules: &[MockRule]) -> Result<()> {
    for rule in rules {
        debug!("mock: {}", rule.url);
        session.route(rule.url.clone(), rule.handler()).await?;
    }
    Ok(())
}
