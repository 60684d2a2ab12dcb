//! In-memory repositories
//!
//! Backed by `DashMap`s and used by the service crates' tests. Conditional
//! updates mirror the `WHERE status = ...` guards of the PostgreSQL queries,
//! and [`BillingTransaction`]s stage their writes and apply them on commit.

use std::ops::DerefMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anshim_types::{MembershipTier, PaymentStatus, SubscriptionStatus, WindowStarts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{PaymentRow, PlanRow, SubscriptionRow, UserRow};
use crate::repo::*;

/// Shared in-memory state for all repositories
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    users: DashMap<Uuid, UserRow>,
    subscriptions: DashMap<Uuid, SubscriptionRow>,
    payments: DashMap<String, PaymentRow>,
    plans: DashMap<String, PlanRow>,
    tx_lock: Arc<Mutex<()>>,
    fail_next_commit: AtomicBool,
}

fn merge(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(t), Some(p)) => {
            for (k, v) in p {
                t.insert(k.clone(), v.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

/// Whether the row's current status may move to `next`
fn allows(row: &PaymentRow, next: PaymentStatus) -> bool {
    row.status().is_ok_and(|s| s.can_transition_to(next))
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erase the repositories for the service layer
    pub fn shared(&self) -> SharedRepositories {
        SharedRepositories {
            users: Arc::new(self.clone()),
            subscriptions: Arc::new(self.clone()),
            payments: Arc::new(self.clone()),
            plans: Arc::new(self.clone()),
            store: Arc::new(self.clone()),
        }
    }

    /// Insert or replace a user row
    pub fn put_user(&self, row: UserRow) {
        self.inner.users.insert(row.id, row);
    }

    /// Insert or replace a plan row
    pub fn put_plan(&self, row: PlanRow) {
        self.inner.plans.insert(row.id.clone(), row);
    }

    /// Insert or replace a subscription row
    pub fn put_subscription(&self, row: SubscriptionRow) {
        self.inner.subscriptions.insert(row.id, row);
    }

    /// Insert or replace a payment row
    pub fn put_payment(&self, row: PaymentRow) {
        self.inner.payments.insert(row.order_id.clone(), row);
    }

    /// Current user row
    pub fn user(&self, id: Uuid) -> Option<UserRow> {
        self.inner.users.get(&id).map(|r| r.clone())
    }

    /// Current payment row
    pub fn payment(&self, order_id: &str) -> Option<PaymentRow> {
        self.inner.payments.get(order_id).map(|r| r.clone())
    }

    /// All payments of a user, oldest first
    pub fn payments_of(&self, user_id: Uuid) -> Vec<PaymentRow> {
        let mut payments: Vec<_> = self
            .inner
            .payments
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        payments.sort_by_key(|p| p.created_at);
        payments
    }

    /// All subscriptions of a user, oldest first
    pub fn subscriptions_of(&self, user_id: Uuid) -> Vec<SubscriptionRow> {
        let mut subs: Vec<_> = self
            .inner
            .subscriptions
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        subs.sort_by_key(|s| s.created_at);
        subs
    }

    /// Make the next transaction commit fail without applying anything
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn active_of(&self, user_id: Uuid) -> Vec<SubscriptionRow> {
        let mut subs: Vec<_> = self
            .inner
            .subscriptions
            .iter()
            .filter(|r| r.user_id == user_id && r.status == SubscriptionStatus::Active.as_str())
            .map(|r| r.clone())
            .collect();
        subs.sort_by(|a, b| b.end_date.cmp(&a.end_date));
        subs
    }

    fn payment_by_id(&self, id: Uuid) -> Option<impl DerefMut<Target = PaymentRow> + '_> {
        self.inner.payments.iter_mut().find(|r| r.id == id)
    }
}

fn counter(used: i32, start: Option<DateTime<Utc>>, window: DateTime<Utc>) -> i32 {
    match start {
        Some(s) if s >= window => used + 1,
        _ => 1,
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<UserRow>> {
        Ok(self.user(id))
    }

    async fn create_or_get(&self, id: Uuid) -> DbResult<UserRow> {
        let now = Utc::now();
        let row = self.inner.users.entry(id).or_insert_with(|| UserRow {
            id,
            tier: MembershipTier::Basic.as_str().to_string(),
            daily_questions_used: 0,
            daily_window_start: None,
            weekly_questions_used: 0,
            weekly_window_start: None,
            monthly_questions_used: 0,
            monthly_window_start: None,
            last_question_at: None,
            customer_key: None,
            billing_key: None,
            created_at: now,
            updated_at: now,
        });
        Ok(row.clone())
    }

    async fn record_question(
        &self,
        id: Uuid,
        windows: WindowStarts,
        at: DateTime<Utc>,
    ) -> DbResult<UserRow> {
        let mut row = self.inner.users.get_mut(&id).ok_or(DbError::NotFound)?;
        row.daily_questions_used =
            counter(row.daily_questions_used, row.daily_window_start, windows.daily);
        row.daily_window_start = Some(windows.daily);
        row.weekly_questions_used =
            counter(row.weekly_questions_used, row.weekly_window_start, windows.weekly);
        row.weekly_window_start = Some(windows.weekly);
        row.monthly_questions_used =
            counter(row.monthly_questions_used, row.monthly_window_start, windows.monthly);
        row.monthly_window_start = Some(windows.monthly);
        row.last_question_at = Some(at);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn set_billing_key(
        &self,
        id: Uuid,
        customer_key: &str,
        billing_key: &str,
    ) -> DbResult<()> {
        let mut row = self.inner.users.get_mut(&id).ok_or(DbError::NotFound)?;
        row.customer_key = Some(customer_key.to_string());
        row.billing_key = Some(billing_key.to_string());
        row.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn find_active_by_user_id(&self, user_id: Uuid) -> DbResult<Vec<SubscriptionRow>> {
        Ok(self.active_of(user_id))
    }

    async fn find_by_payment_id(&self, payment_id: Uuid) -> DbResult<Option<SubscriptionRow>> {
        Ok(self
            .inner
            .subscriptions
            .iter()
            .find(|r| r.payment_id == Some(payment_id))
            .map(|r| r.clone()))
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<SubscriptionRow>> {
        let mut subs: Vec<_> = self
            .inner
            .subscriptions
            .iter()
            .filter(|r| r.status == SubscriptionStatus::Active.as_str() && r.end_date <= now)
            .map(|r| r.clone())
            .collect();
        subs.sort_by_key(|s| s.end_date);
        subs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(subs)
    }

    async fn set_auto_renew(&self, id: Uuid, auto_renew: bool) -> DbResult<()> {
        match self.inner.subscriptions.get_mut(&id) {
            Some(mut row) if row.status == SubscriptionStatus::Active.as_str() => {
                row.auto_renew = auto_renew;
                row.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(DbError::NotFound),
        }
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn find_by_order_id(&self, order_id: &str) -> DbResult<Option<PaymentRow>> {
        Ok(self.payment(order_id))
    }

    async fn find_open_charge(
        &self,
        user_id: Uuid,
        plan_id: &str,
    ) -> DbResult<Option<PaymentRow>> {
        Ok(self
            .inner
            .payments
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.plan_id == plan_id
                    && r.metadata.get("flow").and_then(|f| f.as_str()) == Some(BILLING_KEY_FLOW)
                    && matches!(r.status.as_str(), "pending" | "confirming")
            })
            .max_by_key(|r| r.created_at)
            .map(|r| r.clone()))
    }

    async fn create(&self, payment: CreatePayment) -> DbResult<PaymentRow> {
        let now = Utc::now();
        let row = PaymentRow {
            id: payment.id,
            user_id: payment.user_id,
            plan_id: payment.plan_id,
            order_id: payment.order_id.clone(),
            payment_key: None,
            amount: payment.amount,
            status: PaymentStatus::Pending.as_str().to_string(),
            method: None,
            paid_at: None,
            metadata: payment.metadata,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.inner.payments.entry(payment.order_id) {
            Entry::Occupied(e) => Err(DbError::Conflict(format!(
                "order {} already exists",
                e.key()
            ))),
            Entry::Vacant(e) => Ok(e.insert(row).clone()),
        }
    }

    async fn claim(
        &self,
        order_id: &str,
        payment_key: Option<&str>,
        stale_before: DateTime<Utc>,
    ) -> DbResult<bool> {
        let Some(mut row) = self.inner.payments.get_mut(order_id) else {
            return Ok(false);
        };

        let status = row.status()?;
        let stale = status == PaymentStatus::Confirming
            && row.claimed_at.is_some_and(|c| c < stale_before);
        if !(status.can_transition_to(PaymentStatus::Confirming) || stale) {
            return Ok(false);
        }

        let now = Utc::now();
        row.status = PaymentStatus::Confirming.as_str().to_string();
        row.claimed_at = Some(now);
        if let Some(key) = payment_key {
            row.payment_key = Some(key.to_string());
        }
        row.updated_at = now;
        Ok(true)
    }

    async fn release(&self, id: Uuid, metadata: serde_json::Value) -> DbResult<()> {
        match self.payment_by_id(id) {
            Some(mut row) if allows(&row, PaymentStatus::Pending) => {
                row.status = PaymentStatus::Pending.as_str().to_string();
                row.claimed_at = None;
                merge(&mut row.metadata, &metadata);
                row.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(DbError::Conflict(format!("payment {id} is not claimed"))),
        }
    }

    async fn mark_failed(&self, id: Uuid, metadata: serde_json::Value) -> DbResult<()> {
        match self.payment_by_id(id) {
            Some(mut row) if allows(&row, PaymentStatus::Failed) => {
                row.status = PaymentStatus::Failed.as_str().to_string();
                merge(&mut row.metadata, &metadata);
                row.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(DbError::Conflict(format!("payment {id} is not claimed"))),
        }
    }
}

#[async_trait]
impl PlanRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> DbResult<Option<PlanRow>> {
        Ok(self.inner.plans.get(id).map(|r| r.clone()))
    }

    async fn list_active(&self) -> DbResult<Vec<PlanRow>> {
        let mut plans: Vec<_> = self
            .inner
            .plans
            .iter()
            .filter(|r| r.active)
            .map(|r| r.clone())
            .collect();
        plans.sort_by_key(|p| p.price);
        Ok(plans)
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn begin(&self) -> DbResult<Box<dyn BillingTransaction>> {
        let guard = Arc::clone(&self.inner.tx_lock).lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            ops: Vec::new(),
            _guard: guard,
        }))
    }
}

enum Op {
    Close {
        id: Uuid,
        status: SubscriptionStatus,
        metadata: serde_json::Value,
    },
    Insert(SubscriptionRow),
    Confirm {
        id: Uuid,
        update: ConfirmPayment,
    },
    Tier {
        user_id: Uuid,
        tier: MembershipTier,
    },
}

/// Staged writes; transactions are serialized by a store-wide lock
pub struct MemoryTransaction {
    store: MemoryStore,
    ops: Vec<Op>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl BillingTransaction for MemoryTransaction {
    async fn lock_active_subscriptions(&mut self, user_id: Uuid) -> DbResult<Vec<SubscriptionRow>> {
        Ok(self.store.active_of(user_id))
    }

    async fn close_subscription(
        &mut self,
        id: Uuid,
        status: SubscriptionStatus,
        metadata: serde_json::Value,
    ) -> DbResult<()> {
        if !SubscriptionStatus::Active.can_transition_to(status) {
            return Err(DbError::Conflict(format!(
                "subscription cannot move to {status}"
            )));
        }
        let active = self
            .store
            .inner
            .subscriptions
            .get(&id)
            .is_some_and(|r| r.status == SubscriptionStatus::Active.as_str());
        if !active {
            return Err(DbError::Conflict(format!("subscription {id} is not active")));
        }
        self.ops.push(Op::Close {
            id,
            status,
            metadata,
        });
        Ok(())
    }

    async fn insert_subscription(&mut self, sub: CreateSubscription) -> DbResult<SubscriptionRow> {
        let now = Utc::now();
        let row = SubscriptionRow {
            id: sub.id,
            user_id: sub.user_id,
            plan_id: sub.plan_id,
            status: SubscriptionStatus::Active.as_str().to_string(),
            start_date: sub.start_date,
            end_date: sub.end_date,
            auto_renew: sub.auto_renew,
            payment_id: sub.payment_id,
            metadata: sub.metadata,
            created_at: now,
            updated_at: now,
        };
        self.ops.push(Op::Insert(row.clone()));
        Ok(row)
    }

    async fn confirm_payment(&mut self, id: Uuid, update: ConfirmPayment) -> DbResult<()> {
        let claimed = self
            .store
            .inner
            .payments
            .iter()
            .any(|r| r.id == id && allows(&r, PaymentStatus::Confirmed));
        if !claimed {
            return Err(DbError::Conflict(format!("payment {id} is not claimed")));
        }
        self.ops.push(Op::Confirm { id, update });
        Ok(())
    }

    async fn update_user_tier(&mut self, user_id: Uuid, tier: MembershipTier) -> DbResult<()> {
        if !self.store.inner.users.contains_key(&user_id) {
            return Err(DbError::NotFound);
        }
        self.ops.push(Op::Tier { user_id, tier });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let MemoryTransaction { store, ops, _guard } = *self;
        if store.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DbError::Conflict("commit failed".to_string()));
        }

        let now = Utc::now();
        for op in ops {
            match op {
                Op::Close {
                    id,
                    status,
                    metadata,
                } => {
                    if let Some(mut row) = store.inner.subscriptions.get_mut(&id) {
                        row.status = status.as_str().to_string();
                        merge(&mut row.metadata, &metadata);
                        row.updated_at = now;
                    }
                }
                Op::Insert(row) => {
                    store.inner.subscriptions.insert(row.id, row);
                }
                Op::Confirm { id, update } => {
                    if let Some(mut row) = store.payment_by_id(id) {
                        row.status = PaymentStatus::Confirmed.as_str().to_string();
                        row.payment_key = Some(update.payment_key);
                        row.method = update.method;
                        row.paid_at = Some(update.paid_at);
                        merge(&mut row.metadata, &update.metadata);
                        row.updated_at = now;
                    }
                }
                Op::Tier { user_id, tier } => {
                    if let Some(mut row) = store.inner.users.get_mut(&user_id) {
                        row.tier = tier.as_str().to_string();
                        row.updated_at = now;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_record_question_restarts_stale_windows() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.create_or_get(id).await.unwrap();

        let first = WindowStarts {
            daily: at(0),
            weekly: at(0),
            monthly: at(0),
        };
        store.record_question(id, first, at(1)).await.unwrap();
        let row = store.record_question(id, first, at(2)).await.unwrap();
        assert_eq!(row.daily_questions_used, 2);

        let next_day = WindowStarts {
            daily: at(0) + Duration::days(1),
            ..first
        };
        let row = store.record_question(id, next_day, at(3)).await.unwrap();
        assert_eq!(row.daily_questions_used, 1);
        assert_eq!(row.weekly_questions_used, 3);
        assert_eq!(row.monthly_questions_used, 3);
    }

    #[tokio::test]
    async fn test_record_question_requires_profile() {
        let store = MemoryStore::new();
        let windows = WindowStarts {
            daily: at(0),
            weekly: at(0),
            monthly: at(0),
        };
        let err = store
            .record_question(Uuid::new_v4(), windows, at(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_stale() {
        let store = MemoryStore::new();
        store
            .create(CreatePayment {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                plan_id: "monthly".to_string(),
                order_id: "order_1".to_string(),
                amount: 9900,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        let long_ago = Utc::now() - Duration::minutes(5);
        assert!(store.claim("order_1", Some("pk_1"), long_ago).await.unwrap());
        assert!(!store.claim("order_1", Some("pk_1"), long_ago).await.unwrap());

        let future = Utc::now() + Duration::minutes(5);
        assert!(store.claim("order_1", None, future).await.unwrap());
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_applies_nothing() {
        let store = MemoryStore::new();
        let user = store.create_or_get(Uuid::new_v4()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_user_tier(user.id, MembershipTier::Premium)
            .await
            .unwrap();
        drop(tx);
        assert_eq!(store.user(user.id).unwrap().tier, "basic");

        let mut tx = store.begin().await.unwrap();
        tx.update_user_tier(user.id, MembershipTier::Premium)
            .await
            .unwrap();
        store.fail_next_commit();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.user(user.id).unwrap().tier, "basic");
    }

    #[tokio::test]
    async fn test_duplicate_order_conflicts() {
        let store = MemoryStore::new();
        let input = CreatePayment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: "monthly".to_string(),
            order_id: "order_dup".to_string(),
            amount: 9900,
            metadata: serde_json::json!({}),
        };
        store.create(input.clone()).await.unwrap();
        let err = store.create(input).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    fn charge(user_id: Uuid, order_id: &str, flow: &str) -> CreatePayment {
        CreatePayment {
            id: Uuid::new_v4(),
            user_id,
            plan_id: "monthly".to_string(),
            order_id: order_id.to_string(),
            amount: 9900,
            metadata: serde_json::json!({ "flow": flow }),
        }
    }

    #[tokio::test]
    async fn test_final_payment_never_moves() {
        let store = MemoryStore::new();
        let row = store
            .create(charge(Uuid::new_v4(), "order_final", BILLING_KEY_FLOW))
            .await
            .unwrap();
        let long_ago = Utc::now() - Duration::minutes(5);

        // Only a claimed payment can be released or failed
        assert!(store.release(row.id, serde_json::json!({})).await.is_err());
        assert!(store.mark_failed(row.id, serde_json::json!({})).await.is_err());

        assert!(store.claim("order_final", None, long_ago).await.unwrap());
        store
            .mark_failed(row.id, serde_json::json!({ "failure": { "code": "REJECTED" } }))
            .await
            .unwrap();

        let future = Utc::now() + Duration::minutes(5);
        assert!(!store.claim("order_final", None, future).await.unwrap());
        assert!(store.release(row.id, serde_json::json!({})).await.is_err());
        assert_eq!(store.payment("order_final").unwrap().status, "failed");
    }

    #[tokio::test]
    async fn test_open_charge_lookup() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .create(charge(user_id, "order_checkout", "checkout"))
            .await
            .unwrap();
        assert!(store.find_open_charge(user_id, "monthly").await.unwrap().is_none());

        let row = store
            .create(charge(user_id, "order_charge", BILLING_KEY_FLOW))
            .await
            .unwrap();
        let open = store.find_open_charge(user_id, "monthly").await.unwrap();
        assert_eq!(open.unwrap().order_id, "order_charge");
        assert!(store.find_open_charge(user_id, "yearly").await.unwrap().is_none());

        assert!(store.claim("order_charge", None, Utc::now()).await.unwrap());
        assert!(store.find_open_charge(user_id, "monthly").await.unwrap().is_some());
        store.mark_failed(row.id, serde_json::json!({})).await.unwrap();
        assert!(store.find_open_charge(user_id, "monthly").await.unwrap().is_none());
    }
}
