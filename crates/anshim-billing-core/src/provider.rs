//! Payment gateway abstraction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gateway failure codes that leave the payment retryable
const TEMPORARY_CODES: &[&str] = &[
    "PROVIDER_ERROR",
    "FAILED_INTERNAL_SYSTEM_PROCESSING",
    "FAILED_PAYMENT_INTERNAL_SYSTEM_PROCESSING",
    "NETWORK_ERROR",
    "INVALID_RESPONSE",
];

/// Gateway answer for a payment the caller already confirmed
pub const ALREADY_PROCESSED_PAYMENT: &str = "ALREADY_PROCESSED_PAYMENT";

/// Gateway answer for an order it has never seen
pub const NOT_FOUND_PAYMENT: &str = "NOT_FOUND_PAYMENT";

/// Gateway status of a captured payment
pub const STATUS_DONE: &str = "DONE";

/// Machine-readable gateway failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: String,
    pub message: String,
}

impl GatewayError {
    /// Create a gateway error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Failure the same request may recover from: gateway-side processing
    /// errors, timeouts and transport failures
    pub fn is_temporary(&self) -> bool {
        TEMPORARY_CODES.contains(&self.code.as_str()) || self.code.contains("TIMEOUT")
    }

    /// The gateway already captured this payment
    pub fn is_already_processed(&self) -> bool {
        self.code == ALREADY_PROCESSED_PAYMENT
    }

    /// The gateway has no payment under the looked-up key or order
    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND_PAYMENT
    }

    /// Metadata excerpt stored on the payment row
    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::json!({ "code": self.code, "message": self.message })
    }
}

/// Payment as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPayment {
    pub payment_key: String,
    pub order_id: String,
    /// Gateway status, `DONE` once captured
    pub status: String,
    pub method: Option<String>,
    pub total_amount: i64,
    pub approved_at: Option<DateTime<Utc>>,
    pub receipt_url: Option<String>,
}

impl GatewayPayment {
    /// Whether the money was captured
    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }
}

/// Card-on-file registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedBillingKey {
    pub billing_key: String,
    pub customer_key: String,
    pub card_company: Option<String>,
    pub card_number: Option<String>,
}

/// Charge against a stored billing key
#[derive(Debug, Clone)]
pub struct BillingCharge<'a> {
    pub customer_key: &'a str,
    pub order_id: &'a str,
    pub order_name: &'a str,
    pub amount: i64,
}

/// Payment gateway trait
///
/// Abstracts the card processor so the confirmation flow can be tested
/// without network access.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Capture a payment the client authorized in the checkout widget
    async fn confirm_payment(
        &self,
        payment_key: &str,
        order_id: &str,
        amount: i64,
    ) -> Result<GatewayPayment, GatewayError>;

    /// Look up a payment by its gateway key
    async fn fetch_payment(&self, payment_key: &str) -> Result<GatewayPayment, GatewayError>;

    /// Look up a payment by merchant order ID
    async fn fetch_payment_by_order(
        &self,
        order_id: &str,
    ) -> Result<GatewayPayment, GatewayError>;

    /// Exchange a card authorization for a reusable billing key
    async fn issue_billing_key(
        &self,
        auth_key: &str,
        customer_key: &str,
    ) -> Result<IssuedBillingKey, GatewayError>;

    /// Charge a stored billing key
    async fn charge_billing_key(
        &self,
        billing_key: &str,
        charge: BillingCharge<'_>,
    ) -> Result<GatewayPayment, GatewayError>;
}
