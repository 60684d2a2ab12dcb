//! User profile handlers

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::ApiResult;
use crate::extractors::Member;
use crate::handlers::shared::{ok, timed, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_id: String,
    pub membership_tier: String,
    pub created_at: String,
}

/// POST /api/v1/users/onboard
///
/// Called when onboarding completes; repeated calls return the existing
/// profile.
pub async fn onboard(
    State(state): State<AppState>,
    Member(user_id): Member,
) -> ApiResult<Json<ApiResponse<ProfileResponse>>> {
    let start = Instant::now();

    let result = state.billing.onboard(user_id).await.map_err(Into::into);
    let user = timed("onboard", start, result)?;

    Ok(ok(ProfileResponse {
        user_id: user.id.to_string(),
        membership_tier: user.tier,
        created_at: user.created_at.to_rfc3339(),
    }))
}
