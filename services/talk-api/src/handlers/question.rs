//! Question handlers

use std::time::Instant;

use anshim_quota_core::{Admission, Recorded};
use anshim_types::{LimitKind, QuestionDecision};
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::{AnswerSource, ChatTurn};
use crate::error::ApiResult;
use crate::extractors::Caller;
use crate::handlers::shared::{ok, record_op_duration, validate_question, ApiResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub can_ask: bool,
    pub limit_type: Option<LimitKind>,
    /// `null` while a subscription is active
    pub remaining_questions: Option<u32>,
    pub reset_time: Option<DateTime<Utc>>,
    /// Pass a guest must send back in `x-guest-pass`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_pass: Option<String>,
}

impl QuotaResponse {
    fn new(decision: QuestionDecision, guest_pass: Option<String>) -> Self {
        Self {
            can_ask: decision.allowed,
            limit_type: decision.limit_kind,
            remaining_questions: decision.remaining.count(),
            reset_time: decision.reset_at,
            guest_pass,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AskResponse {
    #[serde(rename_all = "camelCase")]
    Answered {
        answer: String,
        sources: Vec<AnswerSource>,
        remaining_questions: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        guest_pass: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LimitReached {
        limit_type: Option<LimitKind>,
        remaining_questions: u32,
        reset_time: Option<DateTime<Utc>>,
    },
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/questions/quota
///
/// Guests without a pass receive a fresh one.
pub async fn get_quota(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Json<ApiResponse<QuotaResponse>> {
    let start = Instant::now();
    let status = state.quota.status(&identity).await;
    record_op_duration("quota_status", start, true);

    ok(QuotaResponse::new(status.decision, status.guest_pass))
}

/// POST /api/v1/questions
///
/// The question is counted only after the answer service succeeded. If the
/// client disconnects first, the handler future is dropped together with its
/// ticket and nothing is counted.
pub async fn ask(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(req): Json<AskRequest>,
) -> ApiResult<Json<ApiResponse<AskResponse>>> {
    let start = Instant::now();
    validate_question(&req.question, req.history.len())?;

    let ticket = match state.quota.acquire(&identity).await {
        Admission::Granted(ticket) => ticket,
        Admission::Denied(decision) => {
            record_op_duration("ask", start, true);
            return Ok(ok(AskResponse::LimitReached {
                limit_type: decision.limit_kind,
                remaining_questions: decision.remaining.count().unwrap_or(0),
                reset_time: decision.reset_at,
            }));
        }
    };
    let remaining_before = ticket.decision().remaining;

    let answer = match state.answers.answer(&req.question, &req.history).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!(error = %e, identity = identity.kind(), "Answer failed, question not counted");
            record_op_duration("ask", start, false);
            return Err(e.into());
        }
    };

    let guest_pass = match state.quota.record(ticket).await {
        Ok(Recorded::Guest { pass, .. }) => Some(pass),
        Ok(Recorded::Member { .. }) => None,
        Err(e) => {
            tracing::error!(error = %e, "Failed to record answered question");
            None
        }
    };

    record_op_duration("ask", start, true);
    Ok(ok(AskResponse::Answered {
        answer: answer.answer,
        sources: answer.sources,
        remaining_questions: remaining_before.count().map(|n| n.saturating_sub(1)),
        guest_pass,
    }))
}
