//! Plan catalog handler

use std::time::Instant;

use anshim_types::{BillingPeriod, MembershipTier, SubscriptionPlan};
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::ApiResult;
use crate::handlers::shared::{ok, timed, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub membership_tier: MembershipTier,
    pub price: i64,
    pub billing_period: BillingPeriod,
    /// Days granted by one purchase
    pub duration_days: Option<u32>,
}

impl From<&SubscriptionPlan> for PlanResponse {
    fn from(plan: &SubscriptionPlan) -> Self {
        Self {
            id: plan.id.0.clone(),
            name: plan.name.clone(),
            membership_tier: plan.tier,
            price: plan.price,
            billing_period: plan.billing_period,
            duration_days: plan.base_days(),
        }
    }
}

/// GET /api/v1/plans
pub async fn list_plans(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<PlanResponse>>>> {
    let start = Instant::now();
    let plans = timed("list_plans", start, state.billing.list_plans().await.map_err(Into::into))?;

    Ok(ok(plans.iter().map(PlanResponse::from).collect()))
}
