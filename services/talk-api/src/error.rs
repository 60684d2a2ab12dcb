//! Error types for the Talk API service.
//!
//! Every error body has the shape
//! `{"success": false, "error": {"code", "message"}, "retryable": bool}`.

use anshim_billing_core::BillingError;
use anshim_quota_core::QuotaError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::answer::AnswerError;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
    pub retryable: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Quota(#[from] QuotaError),

    #[error("{0}")]
    Billing(#[from] BillingError),

    #[error("{0}")]
    Answer(#[from] AnswerError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Quota(e) => match e {
                QuotaError::InvalidGuestPass => StatusCode::BAD_REQUEST,
                QuotaError::UserNotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Billing(e) => match e {
                BillingError::PaymentNotFound
                | BillingError::PlanNotFound(_)
                | BillingError::UserNotFound
                | BillingError::SubscriptionNotFound => StatusCode::NOT_FOUND,
                BillingError::NotOwner => StatusCode::FORBIDDEN,
                BillingError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
                BillingError::NoBillingKey | BillingError::InvalidState(_) => StatusCode::CONFLICT,
                BillingError::PaymentFailed { .. } => StatusCode::PAYMENT_REQUIRED,
                BillingError::ProviderUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                BillingError::InFlight => StatusCode::TOO_MANY_REQUESTS,
                BillingError::Database(_) | BillingError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Answer(AnswerError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Self::Answer(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> String {
        let code = match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Quota(QuotaError::InvalidGuestPass) => "INVALID_GUEST_PASS",
            Self::Quota(QuotaError::UserNotFound) => "USER_NOT_FOUND",
            Self::Billing(e) => match e {
                BillingError::PaymentFailed { code, .. }
                | BillingError::ProviderUnavailable { code, .. } => return code.clone(),
                BillingError::PaymentNotFound => "PAYMENT_NOT_FOUND",
                BillingError::PlanNotFound(_) => "PLAN_NOT_FOUND",
                BillingError::UserNotFound => "USER_NOT_FOUND",
                BillingError::SubscriptionNotFound => "SUBSCRIPTION_NOT_FOUND",
                BillingError::NoBillingKey => "NO_BILLING_KEY",
                BillingError::NotOwner => "FORBIDDEN",
                BillingError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
                BillingError::InvalidState(_) => "INVALID_STATE",
                BillingError::InFlight => "PAYMENT_IN_PROGRESS",
                BillingError::Database(_) | BillingError::Internal(_) => "INTERNAL_ERROR",
            },
            Self::Answer(_) => "ANSWER_UNAVAILABLE",
            Self::Quota(_) => "INTERNAL_ERROR",
        };
        code.to_string()
    }

    /// Whether the client may repeat the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Billing(e) => e.is_retryable(),
            Self::Answer(_) => true,
            Self::Quota(e) => !matches!(e, QuotaError::InvalidGuestPass | QuotaError::UserNotFound),
            Self::Unauthorized | Self::BadRequest(_) => false,
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code().is_server_error() && !matches!(self, Self::Answer(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_internal() {
            tracing::error!(error = ?self, "Internal API error");
        }

        // Internal detail stays in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: self.error_code(),
                message,
            },
            retryable: self.is_retryable(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
