//! Common test utilities for anshim-billing-core integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anshim_billing_core::{
    BillingCharge, BillingConfig, BillingService, GatewayError, GatewayPayment, IssuedBillingKey,
    PaymentGateway,
};
use anshim_db::memory::MemoryStore;
use anshim_db::{PaymentRow, PlanRow, SubscriptionRow, UserRow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

pub const MONTHLY_PLAN: &str = "premium_monthly";
pub const MONTHLY_PRICE: i64 = 9_900;

/// Scripted payment gateway.
///
/// Captures are remembered by payment key; confirming a captured key again
/// answers `ALREADY_PROCESSED_PAYMENT` and charging a captured order again
/// answers `DUPLICATED_ORDER_ID` like the real gateway.
#[derive(Default)]
pub struct MockGateway {
    confirm_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    charge_calls: AtomicUsize,
    failures: Mutex<VecDeque<GatewayError>>,
    lost_responses: Mutex<VecDeque<GatewayError>>,
    captured: Mutex<HashMap<String, GatewayPayment>>,
    delay: Mutex<StdDuration>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next confirm or charge with `code`
    pub fn fail_next(&self, code: &str) {
        self.failures
            .lock()
            .unwrap()
            .push_back(GatewayError::new(code, "scripted failure"));
    }

    /// Capture the next charge but answer it with `code`, as when the
    /// response is lost on the way back
    pub fn lose_next_charge_response(&self, code: &str) {
        self.lost_responses
            .lock()
            .unwrap()
            .push_back(GatewayError::new(code, "response lost"));
    }

    /// Hold every confirm for `delay` before answering
    pub fn set_delay(&self, delay: StdDuration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Record a capture made outside this process
    pub fn capture(&self, payment_key: &str, order_id: &str, amount: i64) {
        self.captured
            .lock()
            .unwrap()
            .insert(payment_key.to_string(), done(payment_key, order_id, amount));
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn charge_calls(&self) -> usize {
        self.charge_calls.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self) -> Option<GatewayError> {
        self.failures.lock().unwrap().pop_front()
    }
}

fn done(payment_key: &str, order_id: &str, amount: i64) -> GatewayPayment {
    GatewayPayment {
        payment_key: payment_key.to_string(),
        order_id: order_id.to_string(),
        status: "DONE".to_string(),
        method: Some("카드".to_string()),
        total_amount: amount,
        approved_at: Some(Utc::now()),
        receipt_url: Some(format!("https://receipts.example/{payment_key}")),
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn confirm_payment(
        &self,
        payment_key: &str,
        order_id: &str,
        amount: i64,
    ) -> Result<GatewayPayment, GatewayError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        let mut captured = self.captured.lock().unwrap();
        if captured.contains_key(payment_key) {
            return Err(GatewayError::new("ALREADY_PROCESSED_PAYMENT", "already processed"));
        }
        let payment = done(payment_key, order_id, amount);
        captured.insert(payment_key.to_string(), payment.clone());
        Ok(payment)
    }

    async fn fetch_payment(&self, payment_key: &str) -> Result<GatewayPayment, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.captured
            .lock()
            .unwrap()
            .get(payment_key)
            .cloned()
            .ok_or_else(|| GatewayError::new("NOT_FOUND_PAYMENT", "no such payment"))
    }

    async fn fetch_payment_by_order(
        &self,
        order_id: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.captured
            .lock()
            .unwrap()
            .values()
            .find(|p| p.order_id == order_id)
            .cloned()
            .ok_or_else(|| GatewayError::new("NOT_FOUND_PAYMENT", "no such payment"))
    }

    async fn issue_billing_key(
        &self,
        auth_key: &str,
        customer_key: &str,
    ) -> Result<IssuedBillingKey, GatewayError> {
        if auth_key == "bad-auth" {
            return Err(GatewayError::new("INVALID_AUTH_KEY", "expired auth key"));
        }
        Ok(IssuedBillingKey {
            billing_key: format!("bk_{auth_key}"),
            customer_key: customer_key.to_string(),
            card_company: Some("신한".to_string()),
            card_number: Some("4330********123*".to_string()),
        })
    }

    async fn charge_billing_key(
        &self,
        billing_key: &str,
        charge: BillingCharge<'_>,
    ) -> Result<GatewayPayment, GatewayError> {
        self.charge_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        let mut captured = self.captured.lock().unwrap();
        if captured.values().any(|p| p.order_id == charge.order_id) {
            return Err(GatewayError::new("DUPLICATED_ORDER_ID", "order already charged"));
        }
        let payment_key = format!("{billing_key}_{}", charge.order_id);
        let payment = done(&payment_key, charge.order_id, charge.amount);
        captured.insert(payment_key, payment.clone());
        match self.lost_responses.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(payment),
        }
    }
}

/// Fast wait policy so contention tests finish quickly
pub fn config() -> BillingConfig {
    BillingConfig::new("test_sk_integration").with_wait(100, StdDuration::from_millis(20))
}

pub fn service(store: &MemoryStore, gateway: &Arc<MockGateway>) -> BillingService {
    let gateway: Arc<dyn PaymentGateway> = gateway.clone();
    BillingService::new(&store.shared(), gateway, config())
}

pub fn plan_row(id: &str, billing_period: &str, price: i64, duration_days: Option<i32>) -> PlanRow {
    PlanRow {
        id: id.to_string(),
        name: format!("Premium {billing_period}"),
        tier: "premium".to_string(),
        price,
        billing_period: billing_period.to_string(),
        duration_days,
        daily_limit: None,
        weekly_limit: None,
        monthly_limit: None,
        active: true,
        created_at: Utc::now(),
    }
}

pub fn monthly_plan() -> PlanRow {
    plan_row(MONTHLY_PLAN, "monthly", MONTHLY_PRICE, None)
}

pub fn user_row(tier: &str) -> UserRow {
    let now = Utc::now();
    UserRow {
        id: Uuid::new_v4(),
        tier: tier.to_string(),
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
    }
}

pub fn pending_payment(user_id: Uuid, order_id: &str, amount: i64) -> PaymentRow {
    let now = Utc::now();
    PaymentRow {
        id: Uuid::new_v4(),
        user_id,
        plan_id: MONTHLY_PLAN.to_string(),
        order_id: order_id.to_string(),
        payment_key: None,
        amount,
        status: "pending".to_string(),
        method: None,
        paid_at: None,
        metadata: json!({}),
        claimed_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn active_subscription(user_id: Uuid, end_date: DateTime<Utc>) -> SubscriptionRow {
    let start = end_date - Duration::days(30);
    SubscriptionRow {
        id: Uuid::new_v4(),
        user_id,
        plan_id: MONTHLY_PLAN.to_string(),
        status: "active".to_string(),
        start_date: start,
        end_date,
        auto_renew: false,
        payment_id: None,
        metadata: json!({}),
        created_at: start,
        updated_at: start,
    }
}

/// Store with the monthly plan, one basic user and a pending order for them
pub fn checkout_fixture(order_id: &str) -> (MemoryStore, Uuid) {
    let store = MemoryStore::new();
    store.put_plan(monthly_plan());
    let user = user_row("basic");
    let user_id = user.id;
    store.put_user(user);
    store.put_payment(pending_payment(user_id, order_id, MONTHLY_PRICE));
    (store, user_id)
}
