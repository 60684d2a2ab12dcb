//! PostgreSQL unit of work for billing writes

use anshim_types::{MembershipTier, SubscriptionStatus};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::SubscriptionRow;
use crate::repo::{BillingStore, BillingTransaction, ConfirmPayment, CreateSubscription};

/// Opens database transactions for billing writes
#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    /// Create a new billing store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn begin(&self) -> DbResult<Box<dyn BillingTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgBillingTransaction { tx }))
    }
}

/// An open PostgreSQL transaction; rolled back on drop unless committed
pub struct PgBillingTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingTransaction for PgBillingTransaction {
    async fn lock_active_subscriptions(&mut self, user_id: Uuid) -> DbResult<Vec<SubscriptionRow>> {
        let subs = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan_id, status, start_date, end_date, auto_renew,
                   payment_id, metadata, created_at, updated_at
            FROM subscriptions
            WHERE user_id = $1 AND status = 'active'
            ORDER BY end_date DESC
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(subs)
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

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2, metadata = metadata || $3::jsonb, updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&metadata)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!("subscription {id} is not active")));
        }

        Ok(())
    }

    async fn insert_subscription(&mut self, sub: CreateSubscription) -> DbResult<SubscriptionRow> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO subscriptions
                (id, user_id, plan_id, status, start_date, end_date, auto_renew, payment_id, metadata)
            VALUES ($1, $2, $3, 'active', $4, $5, $6, $7, $8)
            RETURNING id, user_id, plan_id, status, start_date, end_date, auto_renew,
                      payment_id, metadata, created_at, updated_at
            "#,
        )
        .bind(sub.id)
        .bind(sub.user_id)
        .bind(&sub.plan_id)
        .bind(sub.start_date)
        .bind(sub.end_date)
        .bind(sub.auto_renew)
        .bind(sub.payment_id)
        .bind(&sub.metadata)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn confirm_payment(&mut self, id: Uuid, update: ConfirmPayment) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'confirmed', payment_key = $2, method = $3, paid_at = $4,
                metadata = metadata || $5::jsonb, updated_at = NOW()
            WHERE id = $1 AND status = 'confirming'
            "#,
        )
        .bind(id)
        .bind(&update.payment_key)
        .bind(&update.method)
        .bind(update.paid_at)
        .bind(&update.metadata)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!("payment {id} is not claimed")));
        }

        Ok(())
    }

    async fn update_user_tier(&mut self, user_id: Uuid, tier: MembershipTier) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE user_profiles SET tier = $1, updated_at = NOW() WHERE id = $2")
                .bind(tier.as_str())
                .bind(user_id)
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
