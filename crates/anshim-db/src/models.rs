//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive.

use anshim_types::{
    MembershipTier, PaymentStatus, PlanId, PlanQuestionLimits, Subscription, SubscriptionId,
    SubscriptionPlan, SubscriptionStatus, UsageCounters, UserId, WindowCount,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// User profile row from the database
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub tier: String,
    pub daily_questions_used: i32,
    pub daily_window_start: Option<DateTime<Utc>>,
    pub weekly_questions_used: i32,
    pub weekly_window_start: Option<DateTime<Utc>>,
    pub monthly_questions_used: i32,
    pub monthly_window_start: Option<DateTime<Utc>>,
    pub last_question_at: Option<DateTime<Utc>>,
    pub customer_key: Option<String>,
    pub billing_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscription row from the database
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub auto_renew: bool,
    pub payment_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub order_id: String,
    pub payment_key: Option<String>,
    pub amount: i64,
    pub status: String,
    pub method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscription plan row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub id: String,
    pub name: String,
    pub tier: String,
    pub price: i64,
    pub billing_period: String,
    pub duration_days: Option<i32>,
    pub daily_limit: Option<i32>,
    pub weekly_limit: Option<i32>,
    pub monthly_limit: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn optional_count(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

// Conversion implementations from Row types to anshim-types domain types
impl UserRow {
    /// Convert to domain UserId
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }

    /// Parsed membership tier
    pub fn tier(&self) -> DbResult<MembershipTier> {
        Ok(self.tier.parse()?)
    }

    /// Stored question counters with their window starts
    pub fn counters(&self) -> UsageCounters {
        UsageCounters {
            daily: WindowCount {
                used: count(self.daily_questions_used),
                window_start: self.daily_window_start,
            },
            weekly: WindowCount {
                used: count(self.weekly_questions_used),
                window_start: self.weekly_window_start,
            },
            monthly: WindowCount {
                used: count(self.monthly_questions_used),
                window_start: self.monthly_window_start,
            },
            last_question_at: self.last_question_at,
        }
    }
}

impl SubscriptionRow {
    /// Parsed status
    pub fn status(&self) -> DbResult<SubscriptionStatus> {
        Ok(self.status.parse()?)
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DbError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status()?,
            id: SubscriptionId(row.id),
            user_id: UserId(row.user_id),
            plan_id: PlanId(row.plan_id),
            start_date: row.start_date,
            end_date: row.end_date,
            auto_renew: row.auto_renew,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

impl PaymentRow {
    /// Parsed status
    pub fn status(&self) -> DbResult<PaymentStatus> {
        Ok(self.status.parse()?)
    }
}

impl TryFrom<PlanRow> for SubscriptionPlan {
    type Error = DbError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(Self {
            tier: row.tier.parse()?,
            id: PlanId(row.id),
            name: row.name,
            price: row.price,
            billing_period: row.billing_period.parse()?,
            duration_days: optional_count(row.duration_days),
            question_limits: PlanQuestionLimits {
                daily: optional_count(row.daily_limit),
                weekly: optional_count(row.weekly_limit),
                monthly: optional_count(row.monthly_limit),
            },
            active: row.active,
        })
    }
}
