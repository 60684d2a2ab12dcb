//! Billing service
//!
//! Entry point of the payment path. Every gateway and database failure leaves
//! this service as a [`BillingError`].

use std::sync::Arc;
use std::time::Duration;

use anshim_db::{
    CreatePayment, DbError, PaymentRepository, PlanRepository, SharedRepositories,
    SubscriptionRepository, UserRepository, UserRow,
};
use anshim_types::{MembershipTier, OrderId, PlanId, Subscription, SubscriptionPlan, UserId};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::confirm::{ConfirmOutcome, ConfirmRequest, PaymentConfirmer};
use crate::lifecycle::SubscriptionLifecycle;
use crate::provider::PaymentGateway;
use crate::BillingError;

const CATALOG_KEY: &str = "active";

/// Order created for the checkout widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub order_id: OrderId,
    pub plan_id: PlanId,
    pub amount: i64,
    pub order_name: String,
}

/// Stored card, without the billing key itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingKeyRegistration {
    pub customer_key: String,
    pub card_company: Option<String>,
    pub card_number: Option<String>,
}

/// Membership as seen by the client
#[derive(Debug, Clone)]
pub struct MembershipStatus {
    pub tier: MembershipTier,
    pub subscription: Option<Subscription>,
    /// Whole days left on `subscription`
    pub remaining_days: u32,
}

impl MembershipStatus {
    /// Whether the current subscription renews on expiry
    pub fn auto_renew(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.auto_renew)
    }
}

/// Billing service
#[derive(Clone)]
pub struct BillingService {
    users: Arc<dyn UserRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRepository>,
    plans: Arc<dyn PlanRepository>,
    gateway: Arc<dyn PaymentGateway>,
    confirmer: PaymentConfirmer,
    lifecycle: SubscriptionLifecycle,
    catalog: Cache<&'static str, Arc<Vec<SubscriptionPlan>>>,
    config: BillingConfig,
}

impl BillingService {
    /// Create a billing service
    pub fn new(
        repos: &SharedRepositories,
        gateway: Arc<dyn PaymentGateway>,
        config: BillingConfig,
    ) -> Self {
        Self {
            users: Arc::clone(&repos.users),
            subscriptions: Arc::clone(&repos.subscriptions),
            payments: Arc::clone(&repos.payments),
            plans: Arc::clone(&repos.plans),
            confirmer: PaymentConfirmer::new(repos, Arc::clone(&gateway), config.clone()),
            gateway,
            lifecycle: SubscriptionLifecycle::new(repos),
            catalog: Cache::builder()
                .time_to_live(config.plan_cache_ttl)
                .max_capacity(1)
                .build(),
            config,
        }
    }

    /// Service configuration
    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Payment confirmer shared by checkout and billing-key flows
    pub fn confirmer(&self) -> &PaymentConfirmer {
        &self.confirmer
    }

    /// Subscription lifecycle manager
    pub fn lifecycle(&self) -> &SubscriptionLifecycle {
        &self.lifecycle
    }

    /// Create the profile at the end of onboarding; existing profiles are
    /// returned unchanged
    #[instrument(skip(self))]
    pub async fn onboard(&self, user_id: UserId) -> Result<UserRow, BillingError> {
        let user = self.users.create_or_get(user_id.0).await?;
        info!(%user_id, tier = %user.tier, "Profile ready");
        Ok(user)
    }

    /// Purchasable plans, cheapest first
    pub async fn list_plans(&self) -> Result<Arc<Vec<SubscriptionPlan>>, BillingError> {
        if let Some(plans) = self.catalog.get(CATALOG_KEY).await {
            return Ok(plans);
        }

        let plans = self
            .plans
            .list_active()
            .await?
            .into_iter()
            .map(SubscriptionPlan::try_from)
            .collect::<Result<Vec<_>, DbError>>()?;
        let plans = Arc::new(plans);
        self.catalog.insert(CATALOG_KEY, Arc::clone(&plans)).await;
        Ok(plans)
    }

    /// Purchasable plan by id
    pub async fn find_plan(&self, plan_id: &str) -> Result<SubscriptionPlan, BillingError> {
        let plan: SubscriptionPlan = self
            .plans
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| BillingError::PlanNotFound(plan_id.to_string()))?
            .try_into()?;
        if !plan.active {
            return Err(BillingError::PlanNotFound(plan_id.to_string()));
        }
        Ok(plan)
    }

    /// Open a `pending` payment for the checkout widget
    #[instrument(skip(self))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        plan_id: &str,
    ) -> Result<Checkout, BillingError> {
        self.require_user(user_id).await?;
        let plan = self.find_plan(plan_id).await?;

        let order_id = OrderId::generate();
        self.payments
            .create(CreatePayment {
                id: Uuid::new_v4(),
                user_id: user_id.0,
                plan_id: plan.id.0.clone(),
                order_id: order_id.0.clone(),
                amount: plan.price,
                metadata: json!({ "flow": "checkout", "orderName": plan.name }),
            })
            .await?;

        info!(%order_id, amount = plan.price, "Checkout created");
        Ok(Checkout {
            order_id,
            plan_id: plan.id,
            amount: plan.price,
            order_name: plan.name,
        })
    }

    /// Confirm a checkout payment and grant its subscription
    pub async fn confirm(&self, req: ConfirmRequest) -> Result<ConfirmOutcome, BillingError> {
        self.confirmer.confirm(req).await
    }

    /// Register a card on file
    #[instrument(skip(self, auth_key))]
    pub async fn issue_billing_key(
        &self,
        user_id: UserId,
        auth_key: &str,
        customer_key: &str,
    ) -> Result<BillingKeyRegistration, BillingError> {
        self.require_user(user_id).await?;

        let issued = self
            .gateway
            .issue_billing_key(auth_key, customer_key)
            .await
            .map_err(BillingError::from_gateway)?;

        self.users
            .set_billing_key(user_id.0, &issued.customer_key, &issued.billing_key)
            .await
            .map_err(|e| match e {
                DbError::NotFound => BillingError::UserNotFound,
                other => other.into(),
            })?;

        info!(%user_id, "Billing key stored");
        Ok(BillingKeyRegistration {
            customer_key: issued.customer_key,
            card_company: issued.card_company,
            card_number: issued.card_number,
        })
    }

    /// Charge the stored card for `plan_id` and grant the subscription
    pub async fn charge_billing_key(
        &self,
        user_id: UserId,
        plan_id: &str,
    ) -> Result<ConfirmOutcome, BillingError> {
        let user = self.require_user(user_id).await?;
        if user.billing_key.is_none() {
            return Err(BillingError::NoBillingKey);
        }
        let plan = self.find_plan(plan_id).await?;
        self.confirmer.charge_billing_key(&user, &plan).await
    }

    /// Tier and current subscription, expiring overdue subscriptions first
    #[instrument(skip(self))]
    pub async fn membership_status(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<MembershipStatus, BillingError> {
        let user = self.require_user(user_id).await?;
        let stored_tier = user.tier()?;

        let current = self.lifecycle.refresh(user_id.0, stored_tier, now).await?;
        let subscription = current.map(Subscription::try_from).transpose()?;
        let tier = if subscription.is_some() {
            stored_tier
        } else {
            MembershipTier::Basic
        };

        Ok(MembershipStatus {
            tier,
            remaining_days: subscription
                .as_ref()
                .map_or(0, |s| s.remaining_days(now)),
            subscription,
        })
    }

    /// Turn auto-renew on or off for the current subscription
    #[instrument(skip(self))]
    pub async fn set_auto_renew(
        &self,
        user_id: UserId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Subscription, BillingError> {
        let current = self
            .subscriptions
            .find_active_by_user_id(user_id.0)
            .await?
            .into_iter()
            .find(|s| s.end_date > now)
            .ok_or(BillingError::SubscriptionNotFound)?;

        self.subscriptions
            .set_auto_renew(current.id, enabled)
            .await
            .map_err(|e| match e {
                DbError::NotFound => BillingError::SubscriptionNotFound,
                other => other.into(),
            })?;

        let mut subscription = Subscription::try_from(current)?;
        subscription.auto_renew = enabled;
        info!(subscription_id = %subscription.id, enabled, "Auto-renew updated");
        Ok(subscription)
    }

    /// One expiry sweep pass with the configured batch size
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, BillingError> {
        self.lifecycle.sweep(now, self.config.sweep_batch).await
    }

    /// Background sweep every `interval`; `None` when disabled
    pub fn spawn_sweep(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.lifecycle.spawn_sweep(interval, self.config.sweep_batch)
    }

    async fn require_user(&self, user_id: UserId) -> Result<UserRow, BillingError> {
        self.users
            .find_by_id(user_id.0)
            .await?
            .ok_or(BillingError::UserNotFound)
    }
}

impl std::fmt::Debug for BillingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingService")
            .field("config", &"<redacted>")
            .field("confirmer", &self.confirmer)
            .finish_non_exhaustive()
    }
}
