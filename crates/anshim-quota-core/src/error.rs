//! Quota errors

use thiserror::Error;

/// Question quota errors
#[derive(Error, Debug)]
pub enum QuotaError {
    /// Guest pass is malformed or its signature does not match
    #[error("invalid guest pass")]
    InvalidGuestPass,

    /// Profile missing for an authenticated user
    #[error("user not found")]
    UserNotFound,

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] anshim_db::DbError),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}
