//! Subscription lifecycle
//!
//! Granting a subscription folds the unused days of every active one into
//! the new period and marks the old ones `replaced`. Expiry happens lazily
//! when a user's subscription is read and in a periodic sweep; both downgrade
//! the user to `basic` once nothing unexpired is left.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anshim_db::{
    BillingStore, BillingTransaction, CreateSubscription, DbError, SharedRepositories,
    SubscriptionRepository, SubscriptionRow,
};
use anshim_types::{MembershipTier, Subscription, SubscriptionPlan, SubscriptionStatus};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::BillingError;

/// Why an old subscription was closed by a grant
pub const REPLACED_REASON: &str = "superseded_by_new_subscription";

/// Computed period of a new subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantPeriod {
    /// Days bought with this plan
    pub base_days: u32,
    /// Unused days carried over from replaced subscriptions
    pub carried_days: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl GrantPeriod {
    /// Total length in days
    pub fn total_days(&self) -> u32 {
        self.base_days.saturating_add(self.carried_days)
    }
}

/// Period for a plan bought at `now` while `active` subscriptions exist
pub fn plan_grant(
    plan: &SubscriptionPlan,
    active: &[Subscription],
    now: DateTime<Utc>,
) -> Result<GrantPeriod, BillingError> {
    let base_days = plan.base_days().ok_or_else(|| {
        BillingError::InvalidState(format!("plan {} has no duration", plan.id))
    })?;
    let carried_days = active
        .iter()
        .map(|s| s.remaining_days(now))
        .fold(0u32, u32::saturating_add);

    let total = base_days.saturating_add(carried_days);
    Ok(GrantPeriod {
        base_days,
        carried_days,
        start: now,
        end: now + chrono::Duration::days(i64::from(total)),
    })
}

/// Grant `plan` to a user inside an open transaction.
///
/// Locks the user's active subscriptions, replaces the unexpired ones (and
/// expires the overdue ones), inserts the new subscription and sets the
/// user's tier to the plan tier.
pub async fn grant_in_tx(
    tx: &mut dyn BillingTransaction,
    user_id: Uuid,
    plan: &SubscriptionPlan,
    payment_id: Option<Uuid>,
    auto_renew: bool,
    now: DateTime<Utc>,
) -> Result<SubscriptionRow, BillingError> {
    let active = tx
        .lock_active_subscriptions(user_id)
        .await?
        .into_iter()
        .map(Subscription::try_from)
        .collect::<Result<Vec<_>, DbError>>()?;

    let period = plan_grant(plan, &active, now)?;
    let new_id = Uuid::new_v4();

    for sub in &active {
        if sub.is_entitled_at(now) {
            let metadata = json!({
                "preservedDays": sub.remaining_days(now),
                "replacedBy": new_id,
                "replacedAt": now,
                "reason": REPLACED_REASON,
            });
            tx.close_subscription(sub.id.0, SubscriptionStatus::Replaced, metadata)
                .await?;
        } else {
            tx.close_subscription(sub.id.0, SubscriptionStatus::Expired, json!({ "expiredAt": now }))
                .await?;
        }
    }

    let replaced: Vec<Uuid> = active
        .iter()
        .filter(|s| s.is_entitled_at(now))
        .map(|s| s.id.0)
        .collect();
    let row = tx
        .insert_subscription(CreateSubscription {
            id: new_id,
            user_id,
            plan_id: plan.id.0.clone(),
            payment_id,
            start_date: period.start,
            end_date: period.end,
            auto_renew,
            metadata: json!({
                "baseDays": period.base_days,
                "carriedDays": period.carried_days,
                "replaces": replaced,
            }),
        })
        .await?;

    tx.update_user_tier(user_id, plan.tier)
        .await
        .map_err(|e| match e {
            DbError::NotFound => BillingError::UserNotFound,
            other => other.into(),
        })?;

    debug!(
        %user_id,
        plan_id = %plan.id,
        base_days = period.base_days,
        carried_days = period.carried_days,
        "Subscription granted"
    );
    Ok(row)
}

/// Expiry and reconciliation of subscriptions
#[derive(Clone)]
pub struct SubscriptionLifecycle {
    subscriptions: Arc<dyn SubscriptionRepository>,
    store: Arc<dyn BillingStore>,
}

impl SubscriptionLifecycle {
    /// Create a lifecycle manager
    pub fn new(repos: &SharedRepositories) -> Self {
        Self {
            subscriptions: Arc::clone(&repos.subscriptions),
            store: Arc::clone(&repos.store),
        }
    }

    /// Current entitling subscription, expiring overdue ones first.
    ///
    /// Writes only when something is overdue or a paid tier has nothing
    /// left to back it.
    pub async fn refresh(
        &self,
        user_id: Uuid,
        tier: MembershipTier,
        now: DateTime<Utc>,
    ) -> Result<Option<SubscriptionRow>, BillingError> {
        let active = self.subscriptions.find_active_by_user_id(user_id).await?;
        let overdue = active.iter().any(|s| s.end_date <= now);
        let current = active.into_iter().find(|s| s.end_date > now);

        if !overdue && (current.is_some() || !tier.is_paid()) {
            return Ok(current);
        }

        let (_, current) = self.expire_user(user_id, now).await?;
        Ok(current)
    }

    /// Expire a user's overdue subscriptions in one transaction and
    /// downgrade the tier when nothing unexpired remains.
    ///
    /// Returns the number expired and the remaining subscription with the
    /// latest end date.
    #[instrument(skip(self))]
    pub async fn expire_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(u32, Option<SubscriptionRow>), BillingError> {
        let mut tx = self.store.begin().await?;
        let active = tx.lock_active_subscriptions(user_id).await?;

        let mut expired = 0u32;
        let mut remaining = Vec::new();
        for sub in active {
            if sub.end_date <= now {
                tx.close_subscription(sub.id, SubscriptionStatus::Expired, json!({ "expiredAt": now }))
                    .await?;
                expired += 1;
            } else {
                remaining.push(sub);
            }
        }

        if remaining.is_empty() {
            match tx.update_user_tier(user_id, MembershipTier::Basic).await {
                Err(DbError::NotFound) => warn!(%user_id, "No profile to downgrade"),
                other => other?,
            }
        }

        tx.commit().await?;

        if expired > 0 {
            info!(%user_id, expired, "Subscriptions expired");
            metrics::counter!("subscriptions_expired_total").increment(u64::from(expired));
        }
        Ok((expired, remaining.into_iter().max_by_key(|s| s.end_date)))
    }

    /// Expire overdue subscriptions across all users, one batch per call
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>, batch: i64) -> Result<u64, BillingError> {
        let overdue = self.subscriptions.find_overdue(now, batch).await?;
        let users: BTreeSet<Uuid> = overdue.iter().map(|s| s.user_id).collect();

        let mut total = 0u64;
        for user_id in users {
            match self.expire_user(user_id, now).await {
                Ok((expired, _)) => total += u64::from(expired),
                Err(e) => error!(%user_id, error = %e, "Failed to expire subscriptions"),
            }
        }
        Ok(total)
    }

    /// Run [`SubscriptionLifecycle::sweep`] every `interval`; `None` when
    /// the interval is zero
    pub fn spawn_sweep(&self, interval: Duration, batch: i64) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        let lifecycle = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match lifecycle.sweep(Utc::now(), batch).await {
                    Ok(0) => {}
                    Ok(n) => info!(expired = n, "Expiry sweep finished"),
                    Err(e) => error!(error = %e, "Expiry sweep failed"),
                }
            }
        }))
    }
}

impl std::fmt::Debug for SubscriptionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionLifecycle").finish_non_exhaustive()
    }
}
