//! Network observation, response correlation and request routing.
//!
//! A user action is complete only when its *correlated response* has been
//! observed: URL contains the API path, method is one of the expected ones,
//! and the status is 2xx. Routing lets a scenario answer selected requests
//! itself; everything else reaches the real backend.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(Error::Driver(format!("unknown http method '{}'", other))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed request as seen by the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedResponse {
    /// Monotonic per-driver sequence number, starting at 1.
    pub seq: u64,
    pub url: String,
    pub method: HttpMethod,
    pub status: u16,
}

impl ObservedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Append-only response log that assigns sequence numbers.
#[derive(Debug, Default)]
pub struct ResponseLog {
    entries: Vec<ObservedResponse>,
}

impl ResponseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, url: impl Into<String>, method: HttpMethod, status: u16) -> u64 {
        let seq = self.last_seq() + 1;
        self.entries.push(ObservedResponse {
            seq,
            url: url.into(),
            method,
            status,
        });
        seq
    }

    pub fn last_seq(&self) -> u64 {
        self.entries.last().map(|r| r.seq).unwrap_or(0)
    }

    pub fn entries(&self) -> &[ObservedResponse] {
        &self.entries
    }
}

/// What a user action is expected to do server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Update,
    Delete,
}

impl Intent {
    /// Methods that count as completing this intent.
    pub fn methods(&self) -> &'static [HttpMethod] {
        match self {
            Intent::Create => &[HttpMethod::Post],
            Intent::Update => &[HttpMethod::Put, HttpMethod::Patch],
            Intent::Delete => &[HttpMethod::Delete],
        }
    }
}

/// Correlation predicate: URL substring, allowed methods, 2xx status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatcher {
    pub url_contains: String,
    pub methods: Vec<HttpMethod>,
    /// Only 2xx responses count. Cleared by [`ResponseMatcher::any_status`].
    pub success_only: bool,
}

impl ResponseMatcher {
    pub fn new(url_contains: impl Into<String>, methods: &[HttpMethod]) -> Self {
        Self {
            url_contains: url_contains.into(),
            methods: methods.to_vec(),
            success_only: true,
        }
    }

    /// Accept any status; used to observe rejected requests.
    pub fn any_status(mut self) -> Self {
        self.success_only = false;
        self
    }

    pub fn for_intent(url_contains: impl Into<String>, intent: Intent) -> Self {
        Self::new(url_contains, intent.methods())
    }

    pub fn matches(&self, response: &ObservedResponse) -> bool {
        response.url.contains(&self.url_contains)
            && self.methods.contains(&response.method)
            && (!self.success_only || response.is_success())
    }
}

impl fmt::Display for ResponseMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.methods.iter().map(|m| m.as_str()).collect();
        let status = if self.success_only { "2xx" } else { "any status" };
        write!(f, "{} {} {}", methods.join("|"), self.url_contains, status)
    }
}

/// URL glob in the usual browser-routing dialect.
///
/// `**` matches anything, `*` anything but `/`, `{a,b}` either branch.
/// Patterns are anchored at both ends.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    glob: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn glob(glob: &str) -> Result<Self> {
        let source = glob_to_regex(glob)?;
        let regex = Regex::new(&source)
            .map_err(|e| Error::Config(format!("invalid url pattern '{}': {}", glob, e)))?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Regex source shared with the in-page shim.
    pub fn regex_source(&self) -> &str {
        self.regex.as_str()
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.glob == other.glob
    }
}

impl TryFrom<String> for UrlPattern {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::glob(&s)
    }
}

impl<'de> Deserialize<'de> for UrlPattern {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        UrlPattern::glob(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob)
    }
}

fn glob_to_regex(glob: &str) -> Result<String> {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    let mut in_group = false;

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '{' if !in_group => {
                in_group = true;
                out.push('(');
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            '{' | '}' => {
                return Err(Error::Config(format!(
                    "invalid url pattern '{}': unbalanced braces",
                    glob
                )))
            }
            '.' | '+' | '?' | '^' | '$' | '(' | ')' | '|' | '[' | ']' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    if in_group {
        return Err(Error::Config(format!(
            "invalid url pattern '{}': unbalanced braces",
            glob
        )));
    }
    out.push('$');
    Ok(out)
}

/// A request held by a route until a handler decides what to do with it.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<String>,
}

impl InterceptedRequest {
    /// Decoded JSON body; `None` when absent or not JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
    }
}

/// Synthetic response returned to the page.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.to_string(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }
}

/// Outcome of a route handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    Fulfill(MockResponse),
    /// Defer to the next older matching route, or the network.
    Fallback,
}

/// Decides what happens to an intercepted request.
pub trait RouteHandler: Send + Sync {
    fn handle(&self, request: &InterceptedRequest) -> RouteDecision;
}

impl<F> RouteHandler for F
where
    F: Fn(&InterceptedRequest) -> RouteDecision + Send + Sync,
{
    fn handle(&self, request: &InterceptedRequest) -> RouteDecision {
        self(request)
    }
}

struct Route {
    id: u64,
    pattern: UrlPattern,
    handler: Arc<dyn RouteHandler>,
}

/// Routes registered by one scenario.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: UrlPattern, handler: Arc<dyn RouteHandler>) -> u64 {
        let id = self.routes.len() as u64 + 1;
        self.routes.push(Route {
            id,
            pattern,
            handler,
        });
        id
    }

    /// Newest matching route first; `Fallback` moves on to older ones.
    /// `None` means the request goes to the network untouched.
    pub fn dispatch(&self, request: &InterceptedRequest) -> Option<MockResponse> {
        self.routes
            .iter()
            .rev()
            .filter(|r| r.pattern.matches(&request.url))
            .find_map(|r| match r.handler.handle(request) {
                RouteDecision::Fulfill(resp) => Some(resp),
                RouteDecision::Fallback => None,
            })
    }

    /// `(id, regex source)` pairs for the in-page shim.
    pub fn patterns(&self) -> Vec<(u64, String)> {
        self.routes
            .iter()
            .map(|r| (r.id, r.pattern.regex_source().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|r| r.pattern.as_str()))
            .finish()
    }
}
