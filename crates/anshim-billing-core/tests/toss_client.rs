//! Toss Payments client against a wiremock server

use std::time::Duration;

use anshim_billing_core::{BillingCharge, BillingConfig, PaymentGateway, TossPayments};
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "test_sk_wiremock";

fn client(server: &MockServer) -> TossPayments {
    let config = BillingConfig::new(SECRET)
        .with_api_base(server.uri())
        .with_gateway_timeout(Duration::from_millis(500));
    TossPayments::new(&config).unwrap()
}

fn toss_payment(order_id: &str, amount: i64) -> serde_json::Value {
    json!({
        "paymentKey": "pk_live_1",
        "orderId": order_id,
        "status": "DONE",
        "method": "카드",
        "totalAmount": amount,
        "approvedAt": "2026-10-14T15:00:00+09:00",
        "receipt": { "url": "https://dashboard.tosspayments.com/receipt/1" }
    })
}

#[tokio::test]
async fn test_confirm_sends_authenticated_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .and(basic_auth(SECRET, ""))
        .and(body_json(json!({
            "paymentKey": "pk_live_1",
            "orderId": "order_1",
            "amount": 9900
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(toss_payment("order_1", 9900)))
        .expect(1)
        .mount(&server)
        .await;

    let payment = client(&server)
        .confirm_payment("pk_live_1", "order_1", 9900)
        .await
        .unwrap();

    assert!(payment.is_done());
    assert_eq!(payment.total_amount, 9900);
    assert_eq!(
        payment.approved_at,
        Some(Utc.with_ymd_and_hms(2026, 10, 14, 6, 0, 0).unwrap())
    );
    assert_eq!(
        payment.receipt_url.as_deref(),
        Some("https://dashboard.tosspayments.com/receipt/1")
    );
}

#[tokio::test]
async fn test_rejection_code_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "REJECT_CARD_COMPANY",
            "message": "카드사에서 거절했습니다"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .confirm_payment("pk_live_1", "order_1", 9900)
        .await
        .unwrap_err();
    assert_eq!(err.code, "REJECT_CARD_COMPANY");
    assert!(!err.is_temporary());
}

#[tokio::test]
async fn test_already_processed_code_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "ALREADY_PROCESSED_PAYMENT",
            "message": "이미 처리된 결제 입니다"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .confirm_payment("pk_live_1", "order_1", 9900)
        .await
        .unwrap_err();
    assert!(err.is_already_processed());
}

#[tokio::test]
async fn test_payment_lookup_by_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/orders/order_charged"))
        .and(basic_auth(SECRET, ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(toss_payment("order_charged", 9900)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/orders/order_unknown"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "NOT_FOUND_PAYMENT",
            "message": "존재하지 않는 결제 정보 입니다."
        })))
        .mount(&server)
        .await;

    let toss = client(&server);
    let payment = toss.fetch_payment_by_order("order_charged").await.unwrap();
    assert!(payment.is_done());
    assert_eq!(payment.order_id, "order_charged");
    assert_eq!(payment.total_amount, 9900);

    let err = toss.fetch_payment_by_order("order_unknown").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_temporary());
}

#[tokio::test]
async fn test_server_error_without_body_is_temporary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server)
        .confirm_payment("pk_live_1", "order_1", 9900)
        .await
        .unwrap_err();
    assert_eq!(err.code, "PROVIDER_ERROR");
    assert!(err.is_temporary());
}

#[tokio::test]
async fn test_unparseable_success_body_is_temporary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/pk_live_1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_payment("pk_live_1").await.unwrap_err();
    assert_eq!(err.code, "INVALID_RESPONSE");
    assert!(err.is_temporary());
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/confirm"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(toss_payment("order_1", 9900))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .confirm_payment("pk_live_1", "order_1", 9900)
        .await
        .unwrap_err();
    assert_eq!(err.code, "NETWORK_TIMEOUT");
    assert!(err.is_temporary());
}

#[tokio::test]
async fn test_billing_key_issue_and_charge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/billing/authorizations/issue"))
        .and(body_json(json!({ "authKey": "auth_1", "customerKey": "cust_1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "billingKey": "bk_1",
            "customerKey": "cust_1",
            "cardCompany": "신한",
            "card": { "number": "4330********123*" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/billing/bk_1"))
        .and(body_json(json!({
            "customerKey": "cust_1",
            "amount": 9900,
            "orderId": "order_2",
            "orderName": "Premium monthly"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(toss_payment("order_2", 9900)))
        .expect(1)
        .mount(&server)
        .await;

    let toss = client(&server);
    let issued = toss.issue_billing_key("auth_1", "cust_1").await.unwrap();
    assert_eq!(issued.billing_key, "bk_1");
    assert_eq!(issued.card_number.as_deref(), Some("4330********123*"));

    let payment = toss
        .charge_billing_key(
            &issued.billing_key,
            BillingCharge {
                customer_key: &issued.customer_key,
                order_id: "order_2",
                order_name: "Premium monthly",
                amount: 9900,
            },
        )
        .await
        .unwrap();
    assert_eq!(payment.order_id, "order_2");
}
