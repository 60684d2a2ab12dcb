//! Shared handler utilities
//!
//! Response envelope, input validation and the operation latency metric.

use std::time::Instant;

use axum::Json;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// Response Envelope
// ============================================================================

/// Successful API response: `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// Wrap `data` in the success envelope
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

// ============================================================================
// Input Validation
// ============================================================================

/// Order ids are 6 to 64 characters, as the payment gateway requires
pub const MIN_ORDER_ID_LEN: usize = 6;
pub const MAX_ORDER_ID_LEN: usize = 64;

/// Maximum length for gateway keys and other opaque identifiers
pub const MAX_KEY_LEN: usize = 200;

/// Maximum question length in characters
pub const MAX_QUESTION_CHARS: usize = 2_000;

/// Maximum number of earlier turns sent with a question
pub const MAX_HISTORY_TURNS: usize = 20;

/// Validate a merchant order id.
///
/// Allows alphanumerics, `-` and `_`.
pub fn validate_order_id(order_id: &str) -> Result<(), ApiError> {
    if order_id.len() < MIN_ORDER_ID_LEN || order_id.len() > MAX_ORDER_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "orderId must be {MIN_ORDER_ID_LEN}-{MAX_ORDER_ID_LEN} characters"
        )));
    }
    if !order_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::BadRequest(
            "orderId contains invalid characters (use alphanumeric, _, -)".into(),
        ));
    }
    Ok(())
}

/// Validate an opaque key is present and within bounds
pub fn validate_key(value: &str, field_name: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field_name} cannot be empty")));
    }
    if value.len() > MAX_KEY_LEN {
        return Err(ApiError::BadRequest(format!(
            "{field_name} too long (max {MAX_KEY_LEN} chars)"
        )));
    }
    Ok(())
}

/// Validate a payment amount
pub fn validate_amount(amount: i64) -> Result<(), ApiError> {
    if amount <= 0 {
        return Err(ApiError::BadRequest("amount must be positive".into()));
    }
    Ok(())
}

/// Validate a question and its history
pub fn validate_question(question: &str, history_len: usize) -> Result<(), ApiError> {
    if question.trim().is_empty() {
        return Err(ApiError::BadRequest("question cannot be empty".into()));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::BadRequest(format!(
            "question too long (max {MAX_QUESTION_CHARS} chars)"
        )));
    }
    if history_len > MAX_HISTORY_TURNS {
        return Err(ApiError::BadRequest(format!(
            "history too long (max {MAX_HISTORY_TURNS} turns)"
        )));
    }
    Ok(())
}

// ============================================================================
// Metrics Helpers
// ============================================================================

/// Record handler duration with result label.
///
/// Labels: operation, result (ok/error)
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "error" };
    metrics::histogram!(
        "talk_operation_duration_seconds",
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}

/// Time `result` under `operation` and pass it through
pub fn timed<T>(operation: &'static str, start: Instant, result: ApiResult<T>) -> ApiResult<T> {
    record_op_duration(operation, start, result.is_ok());
    result
}

// ============================================================================
// Tests
// ============================================================================
