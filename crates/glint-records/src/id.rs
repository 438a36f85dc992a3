//! Record IDs and platform ID newtypes.
//!
//! Every record ID is a `"<prefix>:<suffix>"` string whose prefix is the
//! record's type tag. Uniqueness across the whole store follows by
//! construction: minted suffixes are UUIDs, and custom suffixes collide only
//! within their own type, which is exactly how singleton records are pinned.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::RecordType;

/// A type-prefixed record ID (`"display:..."`, `"window:..."`, ...).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Mints a fresh ID for the given record type.
    pub fn new(record_type: RecordType) -> Self {
        Self(format!("{}:{}", record_type.prefix(), Uuid::new_v4()))
    }

    /// Builds a deterministic ID from a custom suffix.
    ///
    /// Used for singleton records: two processes that build the same custom
    /// ID address the same record, so "create the singleton" is an upsert by
    /// ID collision rather than a query.
    pub fn custom(record_type: RecordType, suffix: &str) -> Self {
        Self(format!("{}:{}", record_type.prefix(), suffix))
    }

    /// Parses the type tag out of the ID's prefix.
    ///
    /// Returns the raw prefix as the error when it names no registered type.
    /// This is how an unknown type tag arriving over the wire surfaces.
    pub fn record_type(&self) -> Result<RecordType, String> {
        let prefix = self.0.split(':').next().unwrap_or("");
        prefix.parse().map_err(|_| prefix.to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Platform identifier of a physical display.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(pub i64);

impl std::fmt::Display for DisplayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform identifier of a native browser window.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrowserWindowId(pub i64);

impl std::fmt::Display for BrowserWindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier a display process assigns to one of its child windows.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildWindowId(pub String);

impl ChildWindowId {
    /// Creates a new random child window ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChildWindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChildWindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChildWindowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
