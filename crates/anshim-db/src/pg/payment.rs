//! PostgreSQL payment repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::PaymentRow;
use crate::repo::{CreatePayment, PaymentRepository, BILLING_KEY_FLOW};

/// PostgreSQL payment repository
#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    /// Create a new payment repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn find_by_order_id(&self, order_id: &str) -> DbResult<Option<PaymentRow>> {
        let payment = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, plan_id, order_id, payment_key, amount, status, method,
                   paid_at, metadata, claimed_at, created_at, updated_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn find_open_charge(
        &self,
        user_id: Uuid,
        plan_id: &str,
    ) -> DbResult<Option<PaymentRow>> {
        let payment = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, plan_id, order_id, payment_key, amount, status, method,
                   paid_at, metadata, claimed_at, created_at, updated_at
            FROM payments
            WHERE user_id = $1 AND plan_id = $2
              AND metadata->>'flow' = $3
              AND status IN ('pending', 'confirming')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(BILLING_KEY_FLOW)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn create(&self, payment: CreatePayment) -> DbResult<PaymentRow> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (id, user_id, plan_id, order_id, amount, status, metadata)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING id, user_id, plan_id, order_id, payment_key, amount, status, method,
                      paid_at, metadata, claimed_at, created_at, updated_at
            "#,
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(&payment.plan_id)
        .bind(&payment.order_id)
        .bind(payment.amount)
        .bind(&payment.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Conflict(format!("order {} already exists", payment.order_id))
            }
            other => DbError::Sqlx(other),
        })?;

        Ok(row)
    }

    async fn claim(
        &self,
        order_id: &str,
        payment_key: Option<&str>,
        stale_before: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'confirming', claimed_at = NOW(),
                payment_key = COALESCE($2, payment_key), updated_at = NOW()
            WHERE order_id = $1
              AND (status = 'pending' OR (status = 'confirming' AND claimed_at < $3))
            "#,
        )
        .bind(order_id)
        .bind(payment_key)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, id: Uuid, metadata: serde_json::Value) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'pending', claimed_at = NULL,
                metadata = metadata || $2::jsonb, updated_at = NOW()
            WHERE id = $1 AND status = 'confirming'
            "#,
        )
        .bind(id)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!("payment {id} is not claimed")));
        }

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, metadata: serde_json::Value) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', metadata = metadata || $2::jsonb, updated_at = NOW()
            WHERE id = $1 AND status = 'confirming'
            "#,
        )
        .bind(id)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!("payment {id} is not claimed")));
        }

        Ok(())
    }
}
