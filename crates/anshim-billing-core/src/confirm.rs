//! Payment confirmation
//!
//! Per order: in-flight gate, replay check, row claim, one gateway call,
//! then a single transaction that confirms the payment, grants the
//! subscription and upgrades the tier. The in-flight gate serializes requests
//! inside one process; the `pending -> confirming` claim does the same across
//! processes.

use std::sync::Arc;
use std::time::Instant;

use anshim_db::{
    BillingStore, ConfirmPayment, CreatePayment, PaymentRepository, PaymentRow, PlanRepository,
    SharedRepositories, SubscriptionRepository, UserRow, BILLING_KEY_FLOW,
};
use anshim_types::{
    MembershipTier, OrderId, PaymentStatus, Subscription, SubscriptionPlan, UserId,
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::inflight::InFlightOrders;
use crate::lifecycle::grant_in_tx;
use crate::provider::{BillingCharge, GatewayError, GatewayPayment, PaymentGateway};
use crate::{BillingError, FailureKind};

/// Client request to confirm a checkout
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub user_id: UserId,
    /// Gateway payment key returned to the client by the checkout widget
    pub payment_key: String,
    pub order_id: String,
    pub amount: i64,
}

/// Result of a successful confirmation or replay
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub payment_id: Uuid,
    pub order_id: String,
    pub subscription: Subscription,
    pub tier: MembershipTier,
    /// The order had already been confirmed by an earlier request
    pub already_processed: bool,
}

/// Confirms payments and charges billing keys
#[derive(Clone)]
pub struct PaymentConfirmer {
    payments: Arc<dyn PaymentRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
    inflight: InFlightOrders,
    config: BillingConfig,
}

impl PaymentConfirmer {
    /// Create a confirmer
    pub fn new(
        repos: &SharedRepositories,
        gateway: Arc<dyn PaymentGateway>,
        config: BillingConfig,
    ) -> Self {
        Self {
            payments: Arc::clone(&repos.payments),
            subscriptions: Arc::clone(&repos.subscriptions),
            plans: Arc::clone(&repos.plans),
            store: Arc::clone(&repos.store),
            gateway,
            inflight: InFlightOrders::new(),
            config,
        }
    }

    /// Orders currently held by this process
    pub fn in_flight(&self) -> &InFlightOrders {
        &self.inflight
    }

    /// Confirm a checkout payment
    #[instrument(skip_all, fields(order_id = %req.order_id, user_id = %req.user_id))]
    pub async fn confirm(&self, req: ConfirmRequest) -> Result<ConfirmOutcome, BillingError> {
        let started = Instant::now();
        let result = self.confirm_order(&req).await;
        observe("confirm", &result, started);
        result
    }

    async fn confirm_order(&self, req: &ConfirmRequest) -> Result<ConfirmOutcome, BillingError> {
        let _guard = self
            .inflight
            .enter(&req.order_id, self.config.wait_attempts, self.config.wait_interval)
            .await?;

        let payment = self
            .payments
            .find_by_order_id(&req.order_id)
            .await?
            .ok_or(BillingError::PaymentNotFound)?;

        if payment.user_id != req.user_id.0 {
            return Err(BillingError::NotOwner);
        }
        if payment.amount != req.amount {
            return Err(BillingError::AmountMismatch {
                expected: payment.amount,
                actual: req.amount,
            });
        }

        match payment.status()? {
            PaymentStatus::Confirmed => return self.replay(&payment).await,
            PaymentStatus::Failed => return Err(recorded_failure(&payment)),
            PaymentStatus::Pending | PaymentStatus::Confirming => {}
        }

        let plan = self.load_plan(&payment.plan_id).await?;

        if !self
            .payments
            .claim(&req.order_id, Some(&req.payment_key), self.stale_before())
            .await?
        {
            return self.after_lost_claim(&req.order_id).await;
        }

        let result = self
            .gateway
            .confirm_payment(&req.payment_key, &req.order_id, req.amount)
            .await;
        self.settle(&payment, &plan, Some(&req.payment_key), result, false)
            .await
    }

    /// Charge the user's stored billing key for `plan`.
    ///
    /// An unsettled charge order for the same plan is resumed instead of
    /// opening a new one, so a retry after a timed-out charge can never bill
    /// the card twice.
    #[instrument(skip_all, fields(user_id = %user.id, plan_id = %plan.id))]
    pub async fn charge_billing_key(
        &self,
        user: &UserRow,
        plan: &SubscriptionPlan,
    ) -> Result<ConfirmOutcome, BillingError> {
        let started = Instant::now();
        let result = self.charge(user, plan).await;
        observe("billing_charge", &result, started);
        result
    }

    async fn charge(
        &self,
        user: &UserRow,
        plan: &SubscriptionPlan,
    ) -> Result<ConfirmOutcome, BillingError> {
        let (Some(billing_key), Some(customer_key)) =
            (user.billing_key.as_deref(), user.customer_key.as_deref())
        else {
            return Err(BillingError::NoBillingKey);
        };

        let open = self.payments.find_open_charge(user.id, &plan.id.0).await?;
        let resumed = open.is_some();
        let payment = match open {
            Some(payment) => {
                info!(order_id = %payment.order_id, "Resuming unsettled charge");
                payment
            }
            None => {
                self.payments
                    .create(CreatePayment {
                        id: Uuid::new_v4(),
                        user_id: user.id,
                        plan_id: plan.id.0.clone(),
                        order_id: OrderId::generate().0,
                        amount: plan.price,
                        metadata: json!({ "flow": BILLING_KEY_FLOW, "orderName": plan.name }),
                    })
                    .await?
            }
        };

        let _guard = self
            .inflight
            .try_enter(&payment.order_id)
            .ok_or(BillingError::InFlight)?;
        if !self
            .payments
            .claim(&payment.order_id, None, self.stale_before())
            .await?
        {
            return self.after_lost_claim(&payment.order_id).await;
        }

        if resumed {
            match self.gateway.fetch_payment_by_order(&payment.order_id).await {
                Ok(captured) if captured.is_done() => {
                    info!(order_id = %payment.order_id, "Earlier charge was captured");
                    return self.settle(&payment, plan, None, Ok(captured), true).await;
                }
                Ok(captured) => {
                    let err = GatewayError::new(
                        "CHARGE_NOT_COMPLETED",
                        format!("earlier charge ended as {}", captured.status),
                    );
                    return Err(self.release_or_fail(&payment, err).await);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(self.release(&payment, e).await),
            }
        }

        let result = self
            .gateway
            .charge_billing_key(
                billing_key,
                BillingCharge {
                    customer_key,
                    order_id: &payment.order_id,
                    order_name: &plan.name,
                    amount: payment.amount,
                },
            )
            .await;
        self.settle(&payment, plan, None, result, true).await
    }

    /// Turn the gateway answer for a claimed payment into its final state
    async fn settle(
        &self,
        payment: &PaymentRow,
        plan: &SubscriptionPlan,
        payment_key: Option<&str>,
        result: Result<GatewayPayment, GatewayError>,
        auto_renew: bool,
    ) -> Result<ConfirmOutcome, BillingError> {
        let captured = match (result, payment_key) {
            (Ok(captured), _) => captured,
            (Err(e), Some(key)) if e.is_already_processed() => {
                info!(order_id = %payment.order_id, "Gateway already processed, reconciling");
                match self.gateway.fetch_payment(key).await {
                    Ok(captured) => captured,
                    Err(lookup) => return Err(self.release(payment, lookup).await),
                }
            }
            (Err(e), _) => return Err(self.release_or_fail(payment, e).await),
        };

        if !captured.is_done()
            || captured.order_id != payment.order_id
            || captured.total_amount != payment.amount
        {
            error!(
                order_id = %payment.order_id,
                gateway_order_id = %captured.order_id,
                gateway_status = %captured.status,
                expected = payment.amount,
                actual = captured.total_amount,
                "Gateway payment does not match the order"
            );
            let detail = json!({
                "failure": {
                    "code": "GATEWAY_MISMATCH",
                    "message": "gateway payment does not match the order",
                },
                "gateway": {
                    "status": captured.status,
                    "orderId": captured.order_id,
                    "totalAmount": captured.total_amount,
                },
            });
            if let Err(e) = self.payments.mark_failed(payment.id, detail).await {
                error!(error = %e, "Failed to mark payment failed");
            }
            return Err(BillingError::AmountMismatch {
                expected: payment.amount,
                actual: captured.total_amount,
            });
        }

        match self.commit(payment, plan, &captured, auto_renew).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // The gateway has the money; a retry reconciles through the
                // already-processed answer.
                error!(order_id = %payment.order_id, error = %e, "Failed to commit confirmed payment");
                let detail = json!({ "lastError": { "code": "COMMIT_FAILED", "message": e.to_string() } });
                if let Err(release) = self.payments.release(payment.id, detail).await {
                    error!(error = %release, "Failed to release claim");
                }
                Err(e)
            }
        }
    }

    async fn commit(
        &self,
        payment: &PaymentRow,
        plan: &SubscriptionPlan,
        captured: &GatewayPayment,
        auto_renew: bool,
    ) -> Result<ConfirmOutcome, BillingError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        tx.confirm_payment(
            payment.id,
            ConfirmPayment {
                payment_key: captured.payment_key.clone(),
                method: captured.method.clone(),
                paid_at: captured.approved_at.unwrap_or(now),
                metadata: json!({
                    "gatewayStatus": captured.status,
                    "receiptUrl": captured.receipt_url,
                }),
            },
        )
        .await?;
        let row = grant_in_tx(&mut *tx, payment.user_id, plan, Some(payment.id), auto_renew, now)
            .await?;
        tx.commit().await?;

        metrics::counter!("subscriptions_granted_total").increment(1);
        info!(
            order_id = %payment.order_id,
            subscription_id = %row.id,
            end_date = %row.end_date,
            "Payment confirmed"
        );

        Ok(ConfirmOutcome {
            payment_id: payment.id,
            order_id: payment.order_id.clone(),
            subscription: row.try_into()?,
            tier: plan.tier,
            already_processed: false,
        })
    }

    /// Temporary failures hand the order back for a retry; all others are final
    async fn release_or_fail(&self, payment: &PaymentRow, err: GatewayError) -> BillingError {
        if err.is_temporary() {
            return self.release(payment, err).await;
        }

        warn!(order_id = %payment.order_id, code = %err.code, "Payment rejected");
        let detail = json!({ "failure": err.to_metadata(), "failedAt": Utc::now() });
        if let Err(e) = self.payments.mark_failed(payment.id, detail).await {
            error!(error = %e, "Failed to mark payment failed");
        }
        BillingError::PaymentFailed {
            code: err.code,
            message: err.message,
        }
    }

    /// Hand a claimed order back as `pending`; the outcome is still open
    async fn release(&self, payment: &PaymentRow, err: GatewayError) -> BillingError {
        warn!(
            order_id = %payment.order_id,
            code = %err.code,
            "Gateway outcome unknown, releasing claim"
        );
        let detail = json!({ "lastError": err.to_metadata(), "lastErrorAt": Utc::now() });
        if let Err(e) = self.payments.release(payment.id, detail).await {
            error!(error = %e, "Failed to release claim");
        }
        BillingError::ProviderUnavailable {
            code: err.code,
            message: err.message,
        }
    }

    async fn replay(&self, payment: &PaymentRow) -> Result<ConfirmOutcome, BillingError> {
        let row = self
            .subscriptions
            .find_by_payment_id(payment.id)
            .await?
            .ok_or_else(|| {
                BillingError::InvalidState(format!(
                    "confirmed payment {} has no subscription",
                    payment.order_id
                ))
            })?;
        let plan = self.load_plan(&payment.plan_id).await?;

        Ok(ConfirmOutcome {
            payment_id: payment.id,
            order_id: payment.order_id.clone(),
            subscription: row.try_into()?,
            tier: plan.tier,
            already_processed: true,
        })
    }

    /// Someone else moved the payment between our read and our claim
    async fn after_lost_claim(&self, order_id: &str) -> Result<ConfirmOutcome, BillingError> {
        let payment = self
            .payments
            .find_by_order_id(order_id)
            .await?
            .ok_or(BillingError::PaymentNotFound)?;

        match payment.status()? {
            PaymentStatus::Confirmed => self.replay(&payment).await,
            PaymentStatus::Failed => Err(recorded_failure(&payment)),
            PaymentStatus::Pending | PaymentStatus::Confirming => Err(BillingError::InFlight),
        }
    }

    async fn load_plan(&self, plan_id: &str) -> Result<SubscriptionPlan, BillingError> {
        self.plans
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| BillingError::PlanNotFound(plan_id.to_string()))?
            .try_into()
            .map_err(BillingError::from)
    }

    fn stale_before(&self) -> chrono::DateTime<Utc> {
        let age = chrono::Duration::from_std(self.config.claim_stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        Utc::now() - age
    }
}

impl std::fmt::Debug for PaymentConfirmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfirmer")
            .field("inflight", &self.inflight)
            .finish_non_exhaustive()
    }
}

/// Error for a payment already marked `failed`
fn recorded_failure(payment: &PaymentRow) -> BillingError {
    let failure = payment.metadata.get("failure");
    let field = |name: &str| {
        failure
            .and_then(|f| f.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    BillingError::PaymentFailed {
        code: field("code").unwrap_or_else(|| "PAYMENT_FAILED".to_string()),
        message: field("message").unwrap_or_default(),
    }
}

fn observe(
    operation: &'static str,
    result: &Result<ConfirmOutcome, BillingError>,
    started: Instant,
) {
    let label = match result {
        Ok(o) if o.already_processed => "already_processed",
        Ok(_) => "confirmed",
        Err(e) => e.kind().as_str(),
    };
    if let Err(e) = result {
        if e.kind() == FailureKind::DataInconsistency {
            error!(operation, error = %e, "Payment data inconsistency");
        }
    }

    metrics::counter!("payment_confirmations_total", "result" => label).increment(1);
    metrics::histogram!(
        "talk_operation_duration_seconds",
        "operation" => operation,
        "result" => if result.is_ok() { "ok" } else { "error" },
    )
    .record(started.elapsed().as_secs_f64());
}
