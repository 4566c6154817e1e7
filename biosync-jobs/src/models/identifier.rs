//! Job identifiers
//!
//! A job identifier is the only key into the job store, so caller-supplied
//! identifiers are restricted to characters that can never leave the store's
//! directories.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest identifier accepted from callers
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Rejected identifier text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("job identifier is empty")]
    Empty,

    #[error("job identifier contains invalid character {0:?}")]
    InvalidCharacter(char),

    #[error("job identifier exceeds {} characters", MAX_IDENTIFIER_LEN)]
    TooLong,
}

/// Opaque job identifier (hyphenated UUIDv4 when generated here)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Fresh identifier with 122 bits of randomness. No store lookup is made.
    pub fn generate() -> Self {
        Self(biosync_common::uuid_utils::generate_string())
    }

    /// Accept a caller-supplied identifier
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        if text.trim().is_empty() {
            return Err(IdentifierError::Empty);
        }
        if text.len() > MAX_IDENTIFIER_LEN {
            return Err(IdentifierError::TooLong);
        }
        if let Some(bad) = text
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(IdentifierError::InvalidCharacter(bad));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}
