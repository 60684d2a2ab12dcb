//! Billing errors
//!
//! Everything leaving the billing service is a [`BillingError`], and every
//! `BillingError` falls into one [`FailureKind`]. The kind decides whether a
//! client may retry the same request.

use thiserror::Error;

use crate::provider::GatewayError;

/// Failure classes of the payment path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Gateway unavailable or slow; the payment stays `pending`
    TransientExternal,
    /// Gateway rejected the payment; a new order is needed
    TerminalExternal,
    /// Local records contradict the request (tampering, missing rows, bad transitions)
    DataInconsistency,
    /// Another request is working on the same order
    ConcurrentDuplicate,
    /// Database or other internal failure
    Internal,
}

impl FailureKind {
    /// Metric and log label
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TransientExternal => "transient_external",
            Self::TerminalExternal => "terminal_external",
            Self::DataInconsistency => "data_inconsistency",
            Self::ConcurrentDuplicate => "concurrent_duplicate",
            Self::Internal => "internal",
        }
    }

    /// Whether repeating the same request can succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientExternal | Self::ConcurrentDuplicate | Self::Internal
        )
    }
}

/// Billing errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// No payment with this order id
    #[error("payment not found")]
    PaymentNotFound,

    /// Plan missing or retired
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// No profile for the user
    #[error("user not found")]
    UserNotFound,

    /// No active subscription
    #[error("subscription not found")]
    SubscriptionNotFound,

    /// No card on file
    #[error("no billing key registered")]
    NoBillingKey,

    /// Payment belongs to another user
    #[error("payment does not belong to the caller")]
    NotOwner,

    /// Requested amount differs from the recorded amount
    #[error("amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch {
        /// Recorded amount
        expected: i64,
        /// Amount in the request or gateway answer
        actual: i64,
    },

    /// Status does not allow the requested operation
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Payment was declined and is final
    #[error("payment failed: {code}: {message}")]
    PaymentFailed {
        /// Gateway failure code
        code: String,
        /// Gateway message
        message: String,
    },

    /// Gateway temporarily unavailable; the same order can be retried
    #[error("payment provider unavailable: {code}")]
    ProviderUnavailable {
        /// Gateway failure code
        code: String,
        /// Gateway message
        message: String,
    },

    /// Order is being confirmed by another request
    #[error("order is already being processed")]
    InFlight,

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] anshim_db::DbError),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Failure class of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ProviderUnavailable { .. } => FailureKind::TransientExternal,
            Self::PaymentFailed { .. } => FailureKind::TerminalExternal,
            Self::InFlight => FailureKind::ConcurrentDuplicate,
            Self::Database(_) | Self::Internal(_) => FailureKind::Internal,
            Self::PaymentNotFound
            | Self::PlanNotFound(_)
            | Self::UserNotFound
            | Self::SubscriptionNotFound
            | Self::NoBillingKey
            | Self::NotOwner
            | Self::AmountMismatch { .. }
            | Self::InvalidState(_) => FailureKind::DataInconsistency,
        }
    }

    /// Whether repeating the same request can succeed
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Classify a gateway failure outside the confirm path
    pub fn from_gateway(err: GatewayError) -> Self {
        if err.is_temporary() {
            Self::ProviderUnavailable {
                code: err.code,
                message: err.message,
            }
        } else {
            Self::PaymentFailed {
                code: err.code,
                message: err.message,
            }
        }
    }
}
