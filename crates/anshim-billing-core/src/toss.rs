//! Toss Payments gateway implementation

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::config::BillingConfig;
use crate::provider::{BillingCharge, GatewayError, GatewayPayment, IssuedBillingKey, PaymentGateway};

/// Toss Payments client
#[derive(Clone)]
pub struct TossPayments {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl TossPayments {
    /// Create a new Toss Payments client
    pub fn new(config: &BillingConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.gateway_timeout).build()?;
        Ok(Self {
            client,
            api_base: config.toss_api_base.trim_end_matches('/').to_string(),
            secret_key: config.toss_secret_key.clone(),
        })
    }

    /// Make authenticated request to Toss. The secret key is the basic-auth
    /// user name with an empty password.
    async fn toss_request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{endpoint}", self.api_base);

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.secret_key, Some(""));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, endpoint, "Toss API request failed");
            if e.is_timeout() {
                GatewayError::new("NETWORK_TIMEOUT", e.to_string())
            } else {
                GatewayError::new("NETWORK_ERROR", e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = serde_json::from_str::<TossErrorBody>(&body)
                .map(|b| GatewayError::new(b.code, b.message))
                .unwrap_or_else(|_| {
                    GatewayError::new(
                        if status.is_server_error() {
                            "PROVIDER_ERROR"
                        } else {
                            "UNKNOWN_PAYMENT_ERROR"
                        },
                        format!("HTTP {status}"),
                    )
                });
            warn!(%status, code = %err.code, endpoint, "Toss API error");
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            error!(error = %e, endpoint, "Failed to parse Toss response");
            GatewayError::new("INVALID_RESPONSE", e.to_string())
        })
    }
}

#[async_trait]
impl PaymentGateway for TossPayments {
    #[instrument(skip(self, payment_key))]
    async fn confirm_payment(
        &self,
        payment_key: &str,
        order_id: &str,
        amount: i64,
    ) -> Result<GatewayPayment, GatewayError> {
        debug!("Confirming payment");

        let body = TossConfirmRequest {
            payment_key,
            order_id,
            amount,
        };
        let payment: TossPayment = self
            .toss_request(reqwest::Method::POST, "/v1/payments/confirm", Some(&body))
            .await?;

        Ok(payment.into())
    }

    #[instrument(skip(self, payment_key))]
    async fn fetch_payment(&self, payment_key: &str) -> Result<GatewayPayment, GatewayError> {
        debug!("Fetching payment");

        let payment: TossPayment = self
            .toss_request::<(), _>(
                reqwest::Method::GET,
                &format!("/v1/payments/{payment_key}"),
                None,
            )
            .await?;

        Ok(payment.into())
    }

    #[instrument(skip(self))]
    async fn fetch_payment_by_order(
        &self,
        order_id: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        debug!("Fetching payment by order");

        let payment: TossPayment = self
            .toss_request::<(), _>(
                reqwest::Method::GET,
                &format!("/v1/payments/orders/{order_id}"),
                None,
            )
            .await?;

        Ok(payment.into())
    }

    #[instrument(skip(self, auth_key))]
    async fn issue_billing_key(
        &self,
        auth_key: &str,
        customer_key: &str,
    ) -> Result<IssuedBillingKey, GatewayError> {
        debug!("Issuing billing key");

        let body = TossIssueBillingKeyRequest {
            auth_key,
            customer_key,
        };
        let issued: TossBillingKey = self
            .toss_request(
                reqwest::Method::POST,
                "/v1/billing/authorizations/issue",
                Some(&body),
            )
            .await?;

        Ok(IssuedBillingKey {
            billing_key: issued.billing_key,
            customer_key: issued.customer_key,
            card_company: issued.card_company,
            card_number: issued.card.and_then(|c| c.number),
        })
    }

    #[instrument(skip(self, billing_key, charge), fields(order_id = charge.order_id))]
    async fn charge_billing_key(
        &self,
        billing_key: &str,
        charge: BillingCharge<'_>,
    ) -> Result<GatewayPayment, GatewayError> {
        debug!(amount = charge.amount, "Charging billing key");

        let body = TossBillingChargeRequest {
            customer_key: charge.customer_key,
            amount: charge.amount,
            order_id: charge.order_id,
            order_name: charge.order_name,
        };
        let payment: TossPayment = self
            .toss_request(
                reqwest::Method::POST,
                &format!("/v1/billing/{billing_key}"),
                Some(&body),
            )
            .await?;

        Ok(payment.into())
    }
}

impl std::fmt::Debug for TossPayments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TossPayments")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

// Toss API types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TossConfirmRequest<'a> {
    payment_key: &'a str,
    order_id: &'a str,
    amount: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TossIssueBillingKeyRequest<'a> {
    auth_key: &'a str,
    customer_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TossBillingChargeRequest<'a> {
    customer_key: &'a str,
    amount: i64,
    order_id: &'a str,
    order_name: &'a str,
}

/// Toss error body
#[derive(Debug, Deserialize)]
pub struct TossErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Toss payment object
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TossPayment {
    pub payment_key: String,
    pub order_id: String,
    pub status: String,
    pub method: Option<String>,
    pub total_amount: i64,
    pub approved_at: Option<DateTime<FixedOffset>>,
    pub receipt: Option<TossReceipt>,
}

/// Toss receipt link
#[derive(Debug, Deserialize)]
pub struct TossReceipt {
    pub url: Option<String>,
}

/// Toss billing key object
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TossBillingKey {
    pub billing_key: String,
    pub customer_key: String,
    pub card_company: Option<String>,
    pub card: Option<TossCard>,
}

/// Masked card details
#[derive(Debug, Deserialize)]
pub struct TossCard {
    pub number: Option<String>,
}

impl From<TossPayment> for GatewayPayment {
    fn from(p: TossPayment) -> Self {
        Self {
            payment_key: p.payment_key,
            order_id: p.order_id,
            status: p.status,
            method: p.method,
            total_amount: p.total_amount,
            approved_at: p.approved_at.map(|t| t.with_timezone(&Utc)),
            receipt_url: p.receipt.and_then(|r| r.url),
        }
    }
}
