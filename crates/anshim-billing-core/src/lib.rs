//! Anshim Billing Core - Subscriptions and payments
//!
//! Plan catalog, checkout, payment confirmation through Toss Payments,
//! billing-key charges and the subscription lifecycle.
//!
//! # Example
//!
//! ```rust,ignore
//! use anshim_billing_core::{BillingConfig, BillingService, ConfirmRequest, TossPayments};
//!
//! let config = BillingConfig::new("test_sk_...");
//! let gateway = Arc::new(TossPayments::new(&config)?);
//! let billing = BillingService::new(&repos, gateway, config);
//!
//! let checkout = billing.checkout(user_id, "premium-monthly").await?;
//! let outcome = billing
//!     .confirm(ConfirmRequest {
//!         user_id,
//!         payment_key,
//!         order_id: checkout.order_id.0,
//!         amount: checkout.amount,
//!     })
//!     .await?;
//! ```

pub mod config;
pub mod confirm;
pub mod error;
pub mod inflight;
pub mod lifecycle;
pub mod provider;
pub mod service;
pub mod toss;

pub use config::BillingConfig;
pub use confirm::{ConfirmOutcome, ConfirmRequest, PaymentConfirmer};
pub use error::{BillingError, FailureKind};
pub use inflight::{InFlightGuard, InFlightOrders};
pub use lifecycle::{plan_grant, GrantPeriod, SubscriptionLifecycle};
pub use provider::{
    BillingCharge, GatewayError, GatewayPayment, IssuedBillingKey, PaymentGateway,
};
pub use service::{BillingKeyRegistration, BillingService, Checkout, MembershipStatus};
pub use toss::TossPayments;
