//! Subscription plan catalog types

use serde::{Deserialize, Serialize};

use crate::MembershipTier;

/// Plan identifier (catalog slug, e.g. `premium_monthly`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl PlanId {
    /// Create a new plan ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a plan is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    /// Billed every month, 30 days of entitlement
    Monthly,
    /// Billed every year, 365 days of entitlement
    Yearly,
    /// Single purchase with a plan-specific duration
    OneTime,
}

impl BillingPeriod {
    /// Days of entitlement for monthly plans
    pub const MONTHLY_DAYS: u32 = 30;
    /// Days of entitlement for yearly plans
    pub const YEARLY_DAYS: u32 = 365;

    /// Get the period as a database/API string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::OneTime => "one_time",
        }
    }

    /// Base entitlement length in days.
    ///
    /// One-time passes have no intrinsic length and take it from the plan;
    /// `None` means the plan is misconfigured.
    pub fn base_days(&self, fixed_duration_days: Option<u32>) -> Option<u32> {
        match self {
            Self::Monthly => Some(Self::MONTHLY_DAYS),
            Self::Yearly => Some(Self::YEARLY_DAYS),
            Self::OneTime => fixed_duration_days.filter(|days| *days > 0),
        }
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BillingPeriod {
    type Err = crate::DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            "one_time" => Ok(Self::OneTime),
            other => Err(crate::DomainParseError::new("billing period", other)),
        }
    }
}

/// Informational per-window question limits attached to a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanQuestionLimits {
    /// Questions per day
    pub daily: Option<u32>,
    /// Questions per week
    pub weekly: Option<u32>,
    /// Questions per month
    pub monthly: Option<u32>,
}

/// Catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    /// Plan ID
    pub id: PlanId,
    /// Display name
    pub name: String,
    /// Tier granted while the subscription is active
    pub tier: MembershipTier,
    /// Price in KRW
    pub price: i64,
    /// Billing period
    pub billing_period: BillingPeriod,
    /// Fixed duration for one-time passes
    pub duration_days: Option<u32>,
    /// Informational limits (unlimited tiers bypass them)
    pub question_limits: PlanQuestionLimits,
    /// Whether the plan can still be purchased
    pub active: bool,
}

impl SubscriptionPlan {
    /// Base entitlement length in days for this plan
    pub fn base_days(&self) -> Option<u32> {
        self.billing_period.base_days(self.duration_days)
    }
}
