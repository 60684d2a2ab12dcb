//! Subscription handlers

use std::time::Instant;

use anshim_types::{MembershipTier, Subscription, SubscriptionStatus};
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::extractors::Member;
use crate::handlers::shared::{ok, timed, ApiResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub auto_renew: bool,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id.to_string(),
            plan_id: sub.plan_id.0,
            status: sub.status,
            start_date: sub.start_date,
            end_date: sub.end_date,
            auto_renew: sub.auto_renew,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub membership_tier: MembershipTier,
    pub subscription: Option<SubscriptionResponse>,
    pub remaining_days: u32,
    pub auto_renew: bool,
}

#[derive(Debug, Deserialize)]
pub struct AutoRenewRequest {
    pub enabled: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/subscription/status
///
/// Expires overdue subscriptions before answering.
pub async fn get_status(
    State(state): State<AppState>,
    Member(user_id): Member,
) -> ApiResult<Json<ApiResponse<StatusResponse>>> {
    let start = Instant::now();

    let result = state.billing.membership_status(user_id, Utc::now()).await;
    let status = timed("subscription_status", start, result.map_err(Into::into))?;

    let auto_renew = status.auto_renew();
    Ok(ok(StatusResponse {
        membership_tier: status.tier,
        subscription: status.subscription.map(Into::into),
        remaining_days: status.remaining_days,
        auto_renew,
    }))
}

/// POST /api/v1/subscription/auto-renew
pub async fn set_auto_renew(
    State(state): State<AppState>,
    Member(user_id): Member,
    Json(req): Json<AutoRenewRequest>,
) -> ApiResult<Json<ApiResponse<SubscriptionResponse>>> {
    let start = Instant::now();

    let result = state
        .billing
        .set_auto_renew(user_id, req.enabled, Utc::now())
        .await;
    let subscription = timed("set_auto_renew", start, result.map_err(Into::into))?;

    Ok(ok(subscription.into()))
}
