//! End-to-end HTTP tests against the in-memory store

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{get, post, TestApp, PLAN_ID, PLAN_PRICE};
use serde_json::{json, Value};
use uuid::Uuid;

fn member_headers(user: &str) -> [(&'static str, &str); 1] {
    [("x-user-id", user)]
}

async fn onboard(app: &TestApp, user: &str) {
    let (status, body) = app
        .send(post("/api/v1/users/onboard", &member_headers(user), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

async fn ask(app: &TestApp, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    app.send(post(
        "/api/v1/questions",
        headers,
        json!({ "question": "보증금을 돌려받지 못하면 어떻게 하나요?" }),
    ))
    .await
}

async fn checkout(app: &TestApp, user: &str) -> String {
    let (status, body) = app
        .send(post(
            "/api/v1/payment/checkout",
            &member_headers(user),
            json!({ "planId": PLAN_ID }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["amount"], PLAN_PRICE);
    body["data"]["orderId"].as_str().unwrap().to_string()
}

fn confirm_body(order_id: &str, amount: i64) -> Value {
    json!({ "paymentId": "tpk_api_1", "orderId": order_id, "amount": amount })
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/health", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(get("/ready", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "not_configured");
    assert_eq!(body["paymentsInFlight"], 0);
}

#[tokio::test]
async fn test_guest_gets_one_question() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/api/v1/questions/quota", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["canAsk"], true);
    assert_eq!(body["data"]["limitType"], "guest");
    assert_eq!(body["data"]["remainingQuestions"], 1);
    let pass = body["data"]["guestPass"].as_str().unwrap().to_string();

    let (status, body) = ask(&app, &[("x-guest-pass", pass.as_str())]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "answered");
    assert_eq!(body["data"]["remainingQuestions"], 0);
    let used_pass = body["data"]["guestPass"].as_str().unwrap().to_string();

    let (status, body) = ask(&app, &[("x-guest-pass", used_pass.as_str())]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "limitReached");
    assert_eq!(body["data"]["limitType"], "guest");
    assert_eq!(body["data"]["remainingQuestions"], 0);

    assert_eq!(app.answers.calls(), 1);
}

#[tokio::test]
async fn test_tampered_guest_pass_is_refused() {
    let app = TestApp::new();

    let (status, body) = ask(&app, &[("x-guest-pass", "forged.token")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "limitReached");
    assert_eq!(body["data"]["limitType"], Value::Null);
    assert_eq!(app.answers.calls(), 0);
}

#[tokio::test]
async fn test_member_daily_limit() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;

    for expected_remaining in [2, 1, 0] {
        let (status, body) = ask(&app, &member_headers(&user)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], "answered");
        assert_eq!(body["data"]["remainingQuestions"], expected_remaining);
    }

    let (status, body) = ask(&app, &member_headers(&user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "limitReached");
    assert_eq!(body["data"]["limitType"], "daily");
    assert!(body["data"]["resetTime"].is_string());

    assert_eq!(app.answers.calls(), 3);
    let row = app.store.user(Uuid::parse_str(&user).unwrap()).unwrap();
    assert_eq!(row.daily_questions_used, 3);
}

#[tokio::test]
async fn test_failed_answer_is_not_counted() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;
    app.answers.fail();

    let (status, body) = ask(&app, &member_headers(&user)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["retryable"], true);

    let row = app.store.user(Uuid::parse_str(&user).unwrap()).unwrap();
    assert_eq!(row.daily_questions_used, 0);
    assert_eq!(row.monthly_questions_used, 0);
}

#[tokio::test]
async fn test_slow_answer_gets_timeout_envelope() {
    let app = TestApp::with_request_timeout(Duration::from_millis(100));
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;
    app.answers.time_out(Duration::from_millis(500));

    let (status, body) = ask(&app, &member_headers(&user)).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT, "{body}");
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "ANSWER_UNAVAILABLE");
    assert_eq!(body["retryable"], true);

    let row = app.store.user(Uuid::parse_str(&user).unwrap()).unwrap();
    assert_eq!(row.daily_questions_used, 0);
}

#[tokio::test]
async fn test_member_without_profile_cannot_ask() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();

    let (status, body) = ask(&app, &member_headers(&user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "limitReached");
    assert_eq!(app.answers.calls(), 0);
}

#[tokio::test]
async fn test_question_validation() {
    let app = TestApp::new();

    let (status, body) = app
        .send(post("/api/v1/questions", &[], json!({ "question": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(app.answers.calls(), 0);
}

#[tokio::test]
async fn test_member_routes_require_identity() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/api/v1/subscription/status", &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app
        .send(post(
            "/api/v1/payment/checkout",
            &[("x-user-id", "not-a-uuid")],
            json!({ "planId": PLAN_ID }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plan_catalog() {
    let app = TestApp::new();

    let (status, body) = app.send(get("/api/v1/plans", &[])).await;
    assert_eq!(status, StatusCode::OK);
    let plans = body["data"].as_array().unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0]["id"], PLAN_ID);
    assert_eq!(plans[0]["price"], PLAN_PRICE);
}

#[tokio::test]
async fn test_checkout_confirm_and_replay() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;
    let order_id = checkout(&app, &user).await;

    let (status, body) = app
        .send(post(
            "/api/v1/payment/confirm",
            &member_headers(&user),
            confirm_body(&order_id, PLAN_PRICE),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["membershipTier"], "premium");
    assert_eq!(body["data"]["alreadyProcessed"], false);
    let subscription_id = body["data"]["subscriptionId"].clone();

    let (status, body) = app
        .send(post(
            "/api/v1/payment/confirm",
            &member_headers(&user),
            confirm_body(&order_id, PLAN_PRICE),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["alreadyProcessed"], true);
    assert_eq!(body["data"]["subscriptionId"], subscription_id);
    assert_eq!(app.gateway.calls(), 1);

    let (status, body) = app
        .send(get("/api/v1/subscription/status", &member_headers(&user)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["membershipTier"], "premium");
    assert_eq!(body["data"]["subscription"]["status"], "active");
    assert!(body["data"]["remainingDays"].as_u64().unwrap() >= 29);

    let (_, body) = app
        .send(get("/api/v1/questions/quota", &member_headers(&user)))
        .await;
    assert_eq!(body["data"]["canAsk"], true);
    assert_eq!(body["data"]["remainingQuestions"], Value::Null);
}

#[tokio::test]
async fn test_confirm_rejects_tampered_amount() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;
    let order_id = checkout(&app, &user).await;

    let (status, body) = app
        .send(post(
            "/api/v1/payment/confirm",
            &member_headers(&user),
            confirm_body(&order_id, 100),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AMOUNT_MISMATCH");
    assert_eq!(body["retryable"], false);
    assert_eq!(app.gateway.calls(), 0);
}

#[tokio::test]
async fn test_confirm_by_another_user_is_forbidden() {
    let app = TestApp::new();
    let owner = Uuid::new_v4().to_string();
    let intruder = Uuid::new_v4().to_string();
    onboard(&app, &owner).await;
    let order_id = checkout(&app, &owner).await;

    let (status, body) = app
        .send(post(
            "/api/v1/payment/confirm",
            &member_headers(&intruder),
            confirm_body(&order_id, PLAN_PRICE),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_gateway_outage_is_retryable() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;
    let order_id = checkout(&app, &user).await;
    app.gateway.fail_next("PROVIDER_ERROR");

    let (status, body) = app
        .send(post(
            "/api/v1/payment/confirm",
            &member_headers(&user),
            confirm_body(&order_id, PLAN_PRICE),
        ))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "PROVIDER_ERROR");
    assert_eq!(body["retryable"], true);

    let (status, body) = app
        .send(post(
            "/api/v1/payment/confirm",
            &member_headers(&user),
            confirm_body(&order_id, PLAN_PRICE),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["alreadyProcessed"], false);
}

#[tokio::test]
async fn test_declined_payment_is_final() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;
    let order_id = checkout(&app, &user).await;
    app.gateway.fail_next("REJECT_CARD_PAYMENT");

    let (status, body) = app
        .send(post(
            "/api/v1/payment/confirm",
            &member_headers(&user),
            confirm_body(&order_id, PLAN_PRICE),
        ))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "REJECT_CARD_PAYMENT");
    assert_eq!(body["retryable"], false);

    let (status, body) = app
        .send(post(
            "/api/v1/payment/confirm",
            &member_headers(&user),
            confirm_body(&order_id, PLAN_PRICE),
        ))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "REJECT_CARD_PAYMENT");
    assert_eq!(app.gateway.calls(), 1);
}

#[tokio::test]
async fn test_billing_key_charge_and_auto_renew() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;

    let (status, body) = app
        .send(post(
            "/api/v1/payment/billing/charge",
            &member_headers(&user),
            json!({ "planId": PLAN_ID }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "NO_BILLING_KEY");

    let (status, body) = app
        .send(post(
            "/api/v1/payment/billing-key",
            &member_headers(&user),
            json!({ "authKey": "auth_1", "customerKey": "cust_1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["customerKey"], "cust_1");

    let (status, body) = app
        .send(post(
            "/api/v1/payment/billing/charge",
            &member_headers(&user),
            json!({ "planId": PLAN_ID }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["membershipTier"], "premium");

    let (_, body) = app
        .send(get("/api/v1/subscription/status", &member_headers(&user)))
        .await;
    assert_eq!(body["data"]["autoRenew"], true);

    let (status, body) = app
        .send(post(
            "/api/v1/subscription/auto-renew",
            &member_headers(&user),
            json!({ "enabled": false }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["autoRenew"], false);
}

#[tokio::test]
async fn test_auto_renew_without_subscription() {
    let app = TestApp::new();
    let user = Uuid::new_v4().to_string();
    onboard(&app, &user).await;

    let (status, body) = app
        .send(post(
            "/api/v1/subscription/auto-renew",
            &member_headers(&user),
            json!({ "enabled": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SUBSCRIPTION_NOT_FOUND");
}
