//! Common error types

use thiserror::Error;

/// A stored enum value that does not match any known variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct DomainParseError {
    /// What was being parsed (e.g. "payment status")
    pub kind: &'static str,
    /// The offending value
    pub value: String,
}

impl DomainParseError {
    /// Create a new parse error
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
