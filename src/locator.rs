//! Element references resolved by the driver at action time.
//!
//! A [`Locator`] is a small query tree (CSS, ARIA role, text, placeholder,
//! union, scoping, filtering, position). It serializes to JSON so the
//! browser-side resolver can evaluate the same tree the Rust side built.

use crate::format::escape_for_pattern;
use regex::RegexBuilder;
use serde::Serialize;
use std::fmt;

/// How an element's text or accessible name is compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TextMatch {
    /// Trimmed text equals the value (case-sensitive).
    Exact(String),
    /// Case-insensitive substring.
    Contains(String),
    /// Case-insensitive regular expression.
    Pattern(String),
}

impl TextMatch {
    /// Case-insensitive regex, e.g. `TextMatch::pattern("^save$")`.
    pub fn pattern(source: impl Into<String>) -> Self {
        TextMatch::Pattern(source.into())
    }

    /// Whole-text match, case-insensitive, surrounding whitespace ignored.
    pub fn exact_label(label: &str) -> Self {
        TextMatch::Pattern(format!(r"^\s*{}\s*$", escape_for_pattern(label.trim())))
    }

    /// Evaluate against a piece of text. An invalid pattern never matches.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Exact(v) => text.trim() == v,
            TextMatch::Contains(v) => text.to_lowercase().contains(&v.to_lowercase()),
            TextMatch::Pattern(src) => RegexBuilder::new(src)
                .case_insensitive(true)
                .build()
                .map(|re| re.is_match(text))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Exact(v) => write!(f, "\"{}\"", v),
            TextMatch::Contains(v) => write!(f, "~\"{}\"", v),
            TextMatch::Pattern(v) => write!(f, "/{}/i", v),
        }
    }
}

/// A lazily resolved reference to zero or more elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    Css {
        selector: String,
    },
    Role {
        role: String,
        name: Option<TextMatch>,
    },
    Text {
        text: TextMatch,
    },
    Placeholder {
        text: String,
    },
    /// Union of both sides, in document order.
    Or {
        first: Box<Locator>,
        second: Box<Locator>,
    },
    /// `inner` resolved inside every element matched by `scope`.
    Within {
        scope: Box<Locator>,
        inner: Box<Locator>,
    },
    /// Matches of `inner` whose text content satisfies `has_text`.
    Filter {
        inner: Box<Locator>,
        has_text: TextMatch,
    },
    /// The single match at `index`, or nothing.
    Nth {
        inner: Box<Locator>,
        index: usize,
    },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }

    pub fn role(role: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: None,
        }
    }

    pub fn role_named(role: impl Into<String>, name: TextMatch) -> Self {
        Locator::Role {
            role: role.into(),
            name: Some(name),
        }
    }

    /// A button whose accessible name matches `pattern` (case-insensitive).
    pub fn button(pattern: &str) -> Self {
        Self::role_named("button", TextMatch::pattern(pattern))
    }

    pub fn text(text: TextMatch) -> Self {
        Locator::Text { text }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Locator::Placeholder { text: text.into() }
    }

    pub fn or(self, other: Locator) -> Self {
        Locator::Or {
            first: Box::new(self),
            second: Box::new(other),
        }
    }

    /// Resolve `inner` inside the elements matched by `self`.
    pub fn locate(&self, inner: Locator) -> Self {
        Locator::Within {
            scope: Box::new(self.clone()),
            inner: Box::new(inner),
        }
    }

    pub fn filter_text(self, has_text: TextMatch) -> Self {
        Locator::Filter {
            inner: Box::new(self),
            has_text,
        }
    }

    pub fn nth(&self, index: usize) -> Self {
        Locator::Nth {
            inner: Box::new(self.clone()),
            index,
        }
    }

    pub fn first(&self) -> Self {
        self.nth(0)
    }

    /// JSON form consumed by the in-page resolver.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "css '{}'", selector),
            Locator::Role { role, name: None } => write!(f, "role {}", role),
            Locator::Role {
                role,
                name: Some(n),
            } => write!(f, "role {} {}", role, n),
            Locator::Text { text } => write!(f, "text {}", text),
            Locator::Placeholder { text } => write!(f, "placeholder '{}'", text),
            Locator::Or { first, second } => write!(f, "{} or {}", first, second),
            Locator::Within { scope, inner } => write!(f, "{} >> {}", scope, inner),
            Locator::Filter { inner, has_text } => write!(f, "{} has {}", inner, has_text),
            Locator::Nth { inner, index } => write!(f, "{} [{}]", inner, index),
        }
    }
}
