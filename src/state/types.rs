//! Bookmark types
//!
//! These types are serialized to JSON and persisted between runs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

/// Naive datetime layouts accepted for replication key values
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Highest replication key value seen by a run
///
/// Variant order matters for deserialization: timestamps are tried before
/// plain strings, integers before floating point numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BookmarkValue {
    Timestamp(DateTime<Utc>),
    Integer(i64),
    Number(f64),
    String(String),
}

impl BookmarkValue {
    /// Interpret a record value; null, blank and non-scalar values yield `None`
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(Self::parse(s)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Number),
            },
            _ => None,
        }
    }

    /// Interpret a string as a timestamp, then a number, then verbatim
    pub fn parse(raw: &str) -> Self {
        if let Some(ts) = parse_timestamp(raw) {
            return Self::Timestamp(ts);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Some(n) = raw.parse::<f64>().ok().filter(|n| n.is_finite()) {
            return Self::Number(n);
        }
        Self::String(raw.to_string())
    }

    /// Short name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timestamp(_) => "timestamp",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    /// Preference between incomparable kinds: timestamps, then numbers, then strings
    pub fn rank(&self) -> u8 {
        match self {
            Self::Timestamp(_) => 2,
            Self::Integer(_) | Self::Number(_) => 1,
            Self::String(_) => 0,
        }
    }

    /// Subtract an overlap window; only timestamps move
    #[must_use]
    pub fn minus(&self, overlap: Duration) -> Self {
        match self {
            Self::Timestamp(ts) => {
                let shifted = chrono::Duration::from_std(overlap)
                    .ok()
                    .and_then(|d| ts.checked_sub_signed(d))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                Self::Timestamp(shifted)
            }
            other => other.clone(),
        }
    }

    /// Render for use as a filter value in a query string
    pub fn to_query_value(&self) -> String {
        match self {
            Self::Timestamp(ts) if ts.nanosecond() == 0 => {
                ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
            }
            Self::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Integer(i) => i.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
        }
    }

    /// Compare values of compatible kinds
    ///
    /// Integers and numbers compare numerically; any other mix of kinds is
    /// incomparable.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Number(b)) => (*a as f64).partial_cmp(b),
            (Self::Number(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookmarkValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_value())
    }
}

/// Parse RFC 3339, a naive datetime (taken as UTC) or a bare date
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Replication progress of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Entity name
    pub entity: String,
    /// Field the value was taken from
    pub replication_key: String,
    /// Highest value seen by the committing run
    pub last_value: BookmarkValue,
    /// When the bookmark was committed
    pub committed_at: DateTime<Utc>,
}

impl Bookmark {
    /// Create a bookmark committed now
    pub fn new(
        entity: impl Into<String>,
        replication_key: impl Into<String>,
        last_value: BookmarkValue,
    ) -> Self {
        Self {
            entity: entity.into(),
            replication_key: replication_key.into(),
            last_value,
            committed_at: Utc::now(),
        }
    }
}

/// On-disk layout of the bookmark file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// Bookmarks by entity
    #[serde(default)]
    pub bookmarks: BTreeMap<String, Bookmark>,
}
