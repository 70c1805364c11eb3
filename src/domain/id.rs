//! Identifiers for timelines and their items
//!
//! IDs are opaque strings. Callers may supply their own (e.g. `build`,
//! `deploy-eu`) or let the engine generate one:
//! - Stage IDs: `s-{7-char-hash}` (e.g., `s-7f2b4c1`)
//! - Milestone IDs: `m-{7-char-hash}`
//! - Timeline IDs: `tl-{7-char-hash}`
//!
//! Hash is derived from name + creation timestamp, so the same name at
//! different times produces different IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("ID must not be empty")]
    Empty,

    #[error("Invalid ID '{0}': whitespace and path separators are not allowed")]
    InvalidCharacters(String),
}

/// Generates a 7-character hash from name and timestamp
fn generate_hash(name: &str, timestamp: DateTime<Utc>) -> String {
    let input = format!("{}{}", name, timestamp.timestamp_nanos_opt().unwrap_or(0));
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex[..7].to_string()
}

/// Validates a raw ID string. IDs double as file names, so separators are rejected.
fn validate(raw: &str) -> Result<String, IdError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    if raw
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        || raw == "."
        || raw == ".."
    {
        return Err(IdError::InvalidCharacters(raw.to_string()));
    }
    Ok(raw.to_string())
}

/// Identifier of a stage or milestone, unique within one timeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Generates a stage ID from name and timestamp
    pub fn new_stage(name: &str, timestamp: DateTime<Utc>) -> Self {
        Self(format!("s-{}", generate_hash(name, timestamp)))
    }

    /// Generates a milestone ID from name and timestamp
    pub fn new_milestone(name: &str, timestamp: DateTime<Utc>) -> Self {
        Self(format!("m-{}", generate_hash(name, timestamp)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s).map(Self)
    }
}

impl TryFrom<String> for ItemId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for ItemId {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Identifier of a timeline, unique within a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimelineId(String);

impl TimelineId {
    /// Generates a timeline ID from name and timestamp
    pub fn new(name: &str, timestamp: DateTime<Utc>) -> Self {
        Self(format!("tl-{}", generate_hash(name, timestamp)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for TimelineId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s).map(Self)
    }
}

impl TryFrom<String> for TimelineId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimelineId> for String {
    fn from(id: TimelineId) -> Self {
        id.0
    }
}
