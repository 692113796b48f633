//! Identifier newtypes and small enumerations shared across layers.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Upper bound matching the `VARCHAR(64)` identifier columns.
pub const MAX_ID_LEN: usize = 64;

fn validate_id(field: &'static str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(DomainError::validation(format!(
            "{field} exceeds {MAX_ID_LEN} bytes"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(DomainError::validation(format!(
            "{field} contains control characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Identifier of a likeable entity (an album).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        validate_id("entity id", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an already-authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        validate_id("user id", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a successful like mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeAction {
    Liked,
    Unliked,
}

impl LikeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LikeAction::Liked => "liked",
            LikeAction::Unliked => "unliked",
        }
    }
}

/// Which tier served a count read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    Cache,
    Store,
}

impl CountSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CountSource::Cache => "cache",
            CountSource::Store => "store",
        }
    }
}
