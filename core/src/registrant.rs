//! Registrant identification.
//!
//! Every table in the workflow is keyed by the registrant identifier (for
//! example a student roll number such as `"21CS001"`). This module defines the
//! strong type for that key and the internal row reference used to address a
//! single physical row.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `RegistrantId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid registrant ID: {0}")]
pub struct ParseRegistrantIdError(String);

/// Identifier naming a person's request across all tables.
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects blank strings, trims whitespace)
/// - `From::from()` and `new()`: No validation (for internal use with trusted input)
///
/// Use `FromStr` when parsing external/user input.
///
/// # Examples
///
/// ```
/// use idcard_workflow_core::registrant::RegistrantId;
///
/// let id = RegistrantId::new("21CS001");
/// assert_eq!(id.as_str(), "21CS001");
///
/// let parsed: RegistrantId = " 21CS001 ".parse().unwrap();
/// assert_eq!(parsed, id);
/// assert!("   ".parse::<RegistrantId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrantId(String);

impl RegistrantId {
    /// Create a new `RegistrantId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether the identifier is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Check that the identifier is usable as a table key.
    ///
    /// Accepts exactly what [`FromStr`] would produce: non-blank, with no
    /// leading or trailing whitespace. `" 21CS001"` and `"21CS001"` would
    /// otherwise be stored as two different registrants.
    ///
    /// # Errors
    ///
    /// Returns [`ParseRegistrantIdError`] for a blank or padded identifier.
    pub fn validate(&self) -> Result<(), ParseRegistrantIdError> {
        if self.is_blank() {
            return Err(ParseRegistrantIdError(
                "Registrant ID cannot be empty".to_string(),
            ));
        }
        if self.0.trim() != self.0 {
            return Err(ParseRegistrantIdError(format!(
                "Registrant ID {:?} has surrounding whitespace",
                self.0
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RegistrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegistrantId {
    type Err = ParseRegistrantIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseRegistrantIdError(
                "Registrant ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<String> for RegistrantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RegistrantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RegistrantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque reference to one physical row in a table.
///
/// Row references are assigned by the store on insert, are monotonic and are
/// never reused, even after the row is deleted. History tables use the source
/// row's reference as their idempotency key, so deletes and archives address
/// rows by `RowRef` rather than by identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowRef(i64);

impl RowRef {
    /// Wrap a raw row reference.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
