//! Subscription types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainParseError, PlanId, UserId};

/// Milliseconds in one entitlement day
const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new random subscription ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription status
///
/// `Expired` and `Replaced` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription grants entitlement until its end date
    Active,
    /// End date passed
    Expired,
    /// Superseded by a newer subscription that carried its remaining days
    Replaced,
}

impl SubscriptionStatus {
    /// Get the status as a database/API string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Replaced => "replaced",
        }
    }

    /// Whether no further transition is possible
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Whether `self -> next` is a legal transition
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Expired) | (Self::Active, Self::Replaced)
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "replaced" => Ok(Self::Replaced),
            other => Err(DomainParseError::new("subscription status", other)),
        }
    }
}

/// One paid entitlement period
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscription ID
    pub id: SubscriptionId,
    /// User who owns the subscription
    pub user_id: UserId,
    /// Plan that was purchased
    pub plan_id: PlanId,
    /// Subscription status
    pub status: SubscriptionStatus,
    /// Entitlement start
    pub start_date: DateTime<Utc>,
    /// Entitlement end
    pub end_date: DateTime<Utc>,
    /// Whether the stored billing key should be charged on expiry
    pub auto_renew: bool,
    /// Provenance (replacement linkage, preserved days)
    pub metadata: serde_json::Value,
    /// When the subscription was created
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Active and not past its end date
    pub fn is_entitled_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date > now
    }

    /// Whole days left, rounded up, floored at zero
    pub fn remaining_days(&self, now: DateTime<Utc>) -> u32 {
        remaining_days(self.end_date, now)
    }
}

/// `ceil((end - now) / 1 day)`, floored at zero.
pub fn remaining_days(end: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let millis = (end - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    let days = (millis + DAY_MILLIS - 1) / DAY_MILLIS;
    u32::try_from(days).unwrap_or(u32::MAX)
}
