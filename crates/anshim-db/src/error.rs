//! Database errors

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Record not found
    #[error("record not found")]
    NotFound,

    /// A guarded update matched no row because the record was not in the
    /// expected state
    #[error("state conflict: {0}")]
    Conflict(String),

    /// A stored value could not be mapped to a domain type
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

impl From<anshim_types::DomainParseError> for DbError {
    fn from(err: anshim_types::DomainParseError) -> Self {
        Self::Corrupt(err.to_string())
    }
}

impl From<anshim_types::TierParseError> for DbError {
    fn from(err: anshim_types::TierParseError) -> Self {
        Self::Corrupt(err.to_string())
    }
}
