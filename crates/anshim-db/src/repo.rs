//! Repository traits
//!
//! Define async repository interfaces for database operations.

use std::sync::Arc;

use anshim_types::{MembershipTier, SubscriptionStatus, WindowStarts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::*;

/// User profile repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by ID
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<UserRow>>;

    /// Create the profile if it does not exist yet and return the stored row
    async fn create_or_get(&self, id: Uuid) -> DbResult<UserRow>;

    /// Count one question against all three windows.
    ///
    /// Each counter whose stored window start is older than the given start
    /// restarts at 1; the others are incremented. Returns `NotFound` when the
    /// profile does not exist.
    async fn record_question(
        &self,
        id: Uuid,
        windows: WindowStarts,
        at: DateTime<Utc>,
    ) -> DbResult<UserRow>;

    /// Store the card-on-file billing key issued by the gateway
    async fn set_billing_key(&self, id: Uuid, customer_key: &str, billing_key: &str)
        -> DbResult<()>;
}

/// Subscription repository trait
///
/// Status transitions go through [`BillingTransaction`].
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// All `active` subscriptions for a user, latest end date first
    async fn find_active_by_user_id(&self, user_id: Uuid) -> DbResult<Vec<SubscriptionRow>>;

    /// Subscription created by a payment
    async fn find_by_payment_id(&self, payment_id: Uuid) -> DbResult<Option<SubscriptionRow>>;

    /// `active` subscriptions whose end date is not after `now`
    async fn find_overdue(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<SubscriptionRow>>;

    /// Toggle the auto-renew flag of an active subscription
    async fn set_auto_renew(&self, id: Uuid, auto_renew: bool) -> DbResult<()>;
}

/// Payment repository trait
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Find a payment by merchant order ID
    async fn find_by_order_id(&self, order_id: &str) -> DbResult<Option<PaymentRow>>;

    /// Latest unsettled (`pending` or `confirming`) billing-key charge of a
    /// user for a plan
    async fn find_open_charge(
        &self,
        user_id: Uuid,
        plan_id: &str,
    ) -> DbResult<Option<PaymentRow>>;

    /// Create a `pending` payment
    async fn create(&self, payment: CreatePayment) -> DbResult<PaymentRow>;

    /// Claim a payment for confirmation (`pending -> confirming`).
    ///
    /// A `confirming` row whose claim is older than `stale_before` can be
    /// re-claimed. The payment key is kept when `None` is given. Returns
    /// `false` when the row was not claimable.
    async fn claim(
        &self,
        order_id: &str,
        payment_key: Option<&str>,
        stale_before: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Release a claim after a temporary failure (`confirming -> pending`)
    async fn release(&self, id: Uuid, metadata: serde_json::Value) -> DbResult<()>;

    /// Finalize a claimed payment as failed (`confirming -> failed`)
    async fn mark_failed(&self, id: Uuid, metadata: serde_json::Value) -> DbResult<()>;
}

/// `metadata.flow` of payments charged against a stored billing key
pub const BILLING_KEY_FLOW: &str = "billing_key";

/// Create payment input
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub order_id: String,
    pub amount: i64,
    pub metadata: serde_json::Value,
}

/// Plan catalog repository trait
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Find a plan by ID (active or retired)
    async fn find_by_id(&self, id: &str) -> DbResult<Option<PlanRow>>;

    /// All purchasable plans, cheapest first
    async fn list_active(&self) -> DbResult<Vec<PlanRow>>;
}

/// Source of atomic units of work spanning payments, subscriptions and users
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Start a transaction
    async fn begin(&self) -> DbResult<Box<dyn BillingTransaction>>;
}

/// Writes that must commit together.
///
/// Dropping the transaction without calling [`BillingTransaction::commit`]
/// rolls everything back.
#[async_trait]
pub trait BillingTransaction: Send {
    /// Load the user's `active` subscriptions, locking them until commit
    async fn lock_active_subscriptions(&mut self, user_id: Uuid) -> DbResult<Vec<SubscriptionRow>>;

    /// Move an `active` subscription to a terminal status, merging metadata.
    /// Fails with `Conflict` if it is no longer active.
    async fn close_subscription(
        &mut self,
        id: Uuid,
        status: SubscriptionStatus,
        metadata: serde_json::Value,
    ) -> DbResult<()>;

    /// Insert a new `active` subscription
    async fn insert_subscription(&mut self, sub: CreateSubscription) -> DbResult<SubscriptionRow>;

    /// Finalize a claimed payment (`confirming -> confirmed`).
    /// Fails with `Conflict` if it is not claimed.
    async fn confirm_payment(&mut self, id: Uuid, update: ConfirmPayment) -> DbResult<()>;

    /// Update user tier
    async fn update_user_tier(&mut self, user_id: Uuid, tier: MembershipTier) -> DbResult<()>;

    /// Commit all writes
    async fn commit(self: Box<Self>) -> DbResult<()>;
}

/// Create subscription input
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub payment_id: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub auto_renew: bool,
    pub metadata: serde_json::Value,
}

/// Gateway result recorded on a confirmed payment
#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    pub payment_key: String,
    pub method: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Repositories behind trait objects, so services do not depend on the backend
#[derive(Clone)]
pub struct SharedRepositories {
    pub users: Arc<dyn UserRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub store: Arc<dyn BillingStore>,
}

impl std::fmt::Debug for SharedRepositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRepositories").finish_non_exhaustive()
    }
}
