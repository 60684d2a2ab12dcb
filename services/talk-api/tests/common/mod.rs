//! Common test utilities for talk-api integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anshim_billing_core::{
    BillingCharge, BillingConfig, BillingService, GatewayError, GatewayPayment, IssuedBillingKey,
    PaymentGateway,
};
use anshim_db::memory::MemoryStore;
use anshim_db::PlanRow;
use anshim_quota_core::{QuotaConfig, QuotaService};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use talk_api::answer::{Answer, AnswerError, AnswerProvider, AnswerSource, ChatTurn};
use talk_api::{build_router, AppState};
use tower::ServiceExt;

pub const GUEST_SECRET: &str = "guest-pass-secret-for-api-tests-0123456789";
pub const PLAN_ID: &str = "premium_monthly";
pub const PLAN_PRICE: i64 = 9_900;

/// Answer service double
#[derive(Default)]
pub struct StubAnswers {
    calls: AtomicUsize,
    failing: AtomicBool,
    stall: Mutex<Option<Duration>>,
}

impl StubAnswers {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Wait `after` and then give up the way the answer client does
    pub fn time_out(&self, after: Duration) {
        *self.stall.lock().unwrap() = Some(after);
    }
}

#[async_trait]
impl AnswerProvider for StubAnswers {
    async fn answer(&self, question: &str, _history: &[ChatTurn]) -> Result<Answer, AnswerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stall = *self.stall.lock().unwrap();
        if let Some(after) = stall {
            tokio::time::sleep(after).await;
            return Err(AnswerError::Timeout);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AnswerError::Unavailable("HTTP 503".to_string()));
        }
        Ok(Answer {
            answer: format!("답변: {question}"),
            sources: vec![AnswerSource {
                title: "주택임대차보호법".to_string(),
                url: None,
            }],
        })
    }
}

/// Gateway that captures everything unless told to fail
#[derive(Default)]
pub struct StubGateway {
    calls: AtomicUsize,
    next_failure: Mutex<Option<String>>,
}

impl StubGateway {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, code: &str) {
        *self.next_failure.lock().unwrap() = Some(code.to_string());
    }

    fn outcome(&self, payment_key: &str, order_id: &str, amount: i64) -> Result<GatewayPayment, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.next_failure.lock().unwrap().take() {
            return Err(GatewayError::new(code, "scripted failure"));
        }
        Ok(GatewayPayment {
            payment_key: payment_key.to_string(),
            order_id: order_id.to_string(),
            status: "DONE".to_string(),
            method: Some("카드".to_string()),
            total_amount: amount,
            approved_at: Some(Utc::now()),
            receipt_url: None,
        })
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn confirm_payment(
        &self,
        payment_key: &str,
        order_id: &str,
        amount: i64,
    ) -> Result<GatewayPayment, GatewayError> {
        self.outcome(payment_key, order_id, amount)
    }

    async fn fetch_payment(&self, _payment_key: &str) -> Result<GatewayPayment, GatewayError> {
        Err(GatewayError::new("NOT_FOUND_PAYMENT", "no such payment"))
    }

    async fn fetch_payment_by_order(
        &self,
        _order_id: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        Err(GatewayError::new("NOT_FOUND_PAYMENT", "no such payment"))
    }

    async fn issue_billing_key(
        &self,
        auth_key: &str,
        customer_key: &str,
    ) -> Result<IssuedBillingKey, GatewayError> {
        Ok(IssuedBillingKey {
            billing_key: format!("bk_{auth_key}"),
            customer_key: customer_key.to_string(),
            card_company: None,
            card_number: None,
        })
    }

    async fn charge_billing_key(
        &self,
        billing_key: &str,
        charge: BillingCharge<'_>,
    ) -> Result<GatewayPayment, GatewayError> {
        self.outcome(billing_key, charge.order_id, charge.amount)
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub answers: Arc<StubAnswers>,
    pub gateway: Arc<StubGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_request_timeout(Duration::from_secs(5))
    }

    pub fn with_request_timeout(request_timeout: Duration) -> Self {
        let store = MemoryStore::new();
        store.put_plan(PlanRow {
            id: PLAN_ID.to_string(),
            name: "프리미엄 월간".to_string(),
            tier: "premium".to_string(),
            price: PLAN_PRICE,
            billing_period: "monthly".to_string(),
            duration_days: None,
            daily_limit: None,
            weekly_limit: None,
            monthly_limit: None,
            active: true,
            created_at: Utc::now(),
        });

        let repos = store.shared();
        let answers = Arc::new(StubAnswers::default());
        let gateway = Arc::new(StubGateway::default());

        let quota = QuotaService::new(&repos, QuotaConfig::new(GUEST_SECRET)).unwrap();
        let gateway_dyn: Arc<dyn PaymentGateway> = gateway.clone();
        let billing = BillingService::new(
            &repos,
            gateway_dyn,
            BillingConfig::new("test_sk_api").with_wait(10, Duration::from_millis(10)),
        );
        let answers_dyn: Arc<dyn AnswerProvider> = answers.clone();
        let state = AppState::new(quota, billing, answers_dyn, request_timeout);

        Self {
            router: build_router(state, None),
            store,
            answers,
            gateway,
        }
    }

    /// Send a request and decode the JSON body (`Null` when empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

pub fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post(uri: &str, headers: &[(&str, &str)], body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
