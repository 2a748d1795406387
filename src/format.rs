//! Date and text normalization for form input and text matching.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::fmt;

/// Naive date-time layouts accepted as local wall-clock time.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts, taken as calendar dates without any offset shift.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A point in time as handed to a date field.
#[derive(Debug, Clone, PartialEq)]
pub enum DateValue {
    /// ISO-like text: `2024-01-02`, `2024-01-02T10:00:00Z`, ...
    Text(String),
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),
    /// A calendar date.
    Date(NaiveDate),
    /// An instant with a known offset.
    DateTime(DateTime<FixedOffset>),
}

impl From<&str> for DateValue {
    fn from(s: &str) -> Self {
        DateValue::Text(s.to_string())
    }
}

impl From<String> for DateValue {
    fn from(s: String) -> Self {
        DateValue::Text(s)
    }
}

impl From<i64> for DateValue {
    fn from(ms: i64) -> Self {
        DateValue::EpochMillis(ms)
    }
}

impl From<NaiveDate> for DateValue {
    fn from(d: NaiveDate) -> Self {
        DateValue::Date(d)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DateValue {
    fn from(dt: DateTime<Tz>) -> Self {
        DateValue::DateTime(dt.fixed_offset())
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateValue::Text(s) => write!(f, "{}", s),
            DateValue::EpochMillis(ms) => write!(f, "{}ms", ms),
            DateValue::Date(d) => write!(f, "{}", d),
            DateValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// Normalize a date value to `YYYY-MM-DD` using local calendar fields.
///
/// Instants (RFC 3339 text, epoch milliseconds, offset date-times) are
/// converted to the local time zone first. Date-only text is a calendar
/// date and is never shifted. Input that does not resolve to a real
/// calendar date fails with [`Error::InvalidDate`].
pub fn normalize_date(value: impl Into<DateValue>) -> Result<String> {
    let value = value.into();
    let date = match &value {
        DateValue::Text(s) => parse_text(s.trim()),
        DateValue::EpochMillis(ms) => Local
            .timestamp_millis_opt(*ms)
            .single()
            .map(|dt| dt.date_naive()),
        DateValue::Date(d) => Some(*d),
        DateValue::DateTime(dt) => Some(dt.with_timezone(&Local).date_naive()),
    };

    let date = date.ok_or_else(|| Error::InvalidDate(value.to_string()))?;
    Ok(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month(),
        date.day()
    ))
}

fn parse_text(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

/// Escape regex metacharacters so `text` can sit inside an exact-match pattern.
pub fn escape_for_pattern(text: &str) -> String {
    regex::escape(text)
}
