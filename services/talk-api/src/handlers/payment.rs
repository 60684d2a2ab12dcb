//! Payment handlers

use std::time::Instant;

use anshim_billing_core::{ConfirmOutcome, ConfirmRequest};
use anshim_types::MembershipTier;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::extractors::Member;
use crate::handlers::shared::{
    ok, timed, validate_amount, validate_key, validate_order_id, ApiResponse,
};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: String,
    pub plan_id: String,
    pub amount: i64,
    pub order_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    /// Gateway payment key from the checkout widget
    pub payment_id: String,
    pub order_id: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub subscription_id: String,
    pub membership_tier: MembershipTier,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub already_processed: bool,
}

impl From<ConfirmOutcome> for ConfirmResponse {
    fn from(outcome: ConfirmOutcome) -> Self {
        Self {
            subscription_id: outcome.subscription.id.to_string(),
            membership_tier: outcome.tier,
            start_date: outcome.subscription.start_date,
            end_date: outcome.subscription.end_date,
            already_processed: outcome.already_processed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingKeyRequest {
    pub auth_key: String,
    pub customer_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingKeyResponse {
    pub customer_key: String,
    pub card_company: Option<String>,
    pub card_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub plan_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/payment/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Member(user_id): Member,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<ApiResponse<CheckoutResponse>>> {
    let start = Instant::now();
    validate_key(&req.plan_id, "planId")?;

    let result = state.billing.checkout(user_id, &req.plan_id).await;
    let checkout = timed("checkout", start, result.map_err(Into::into))?;

    Ok(ok(CheckoutResponse {
        order_id: checkout.order_id.0,
        plan_id: checkout.plan_id.0,
        amount: checkout.amount,
        order_name: checkout.order_name,
    }))
}

/// POST /api/v1/payment/confirm
pub async fn confirm(
    State(state): State<AppState>,
    Member(user_id): Member,
    Json(req): Json<ConfirmPaymentRequest>,
) -> ApiResult<Json<ApiResponse<ConfirmResponse>>> {
    validate_key(&req.payment_id, "paymentId")?;
    validate_order_id(&req.order_id)?;
    validate_amount(req.amount)?;

    let outcome = state
        .billing
        .confirm(ConfirmRequest {
            user_id,
            payment_key: req.payment_id,
            order_id: req.order_id,
            amount: req.amount,
        })
        .await?;

    Ok(ok(outcome.into()))
}

/// POST /api/v1/payment/billing-key
pub async fn issue_billing_key(
    State(state): State<AppState>,
    Member(user_id): Member,
    Json(req): Json<BillingKeyRequest>,
) -> ApiResult<Json<ApiResponse<BillingKeyResponse>>> {
    let start = Instant::now();
    validate_key(&req.auth_key, "authKey")?;
    validate_key(&req.customer_key, "customerKey")?;

    let result = state
        .billing
        .issue_billing_key(user_id, &req.auth_key, &req.customer_key)
        .await;
    let registration = timed("issue_billing_key", start, result.map_err(Into::into))?;

    Ok(ok(BillingKeyResponse {
        customer_key: registration.customer_key,
        card_company: registration.card_company,
        card_number: registration.card_number,
    }))
}

/// POST /api/v1/payment/billing/charge
pub async fn charge_billing_key(
    State(state): State<AppState>,
    Member(user_id): Member,
    Json(req): Json<ChargeRequest>,
) -> ApiResult<Json<ApiResponse<ConfirmResponse>>> {
    validate_key(&req.plan_id, "planId")?;

    let outcome = state
        .billing
        .charge_billing_key(user_id, &req.plan_id)
        .await?;

    Ok(ok(outcome.into()))
}
