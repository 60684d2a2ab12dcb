//! PostgreSQL subscription repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::SubscriptionRow;
use crate::repo::SubscriptionRepository;

/// PostgreSQL subscription repository
#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    /// Create a new subscription repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn find_active_by_user_id(&self, user_id: Uuid) -> DbResult<Vec<SubscriptionRow>> {
        let subs = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan_id, status, start_date, end_date, auto_renew,
                   payment_id, metadata, created_at, updated_at
            FROM subscriptions
            WHERE user_id = $1 AND status = 'active'
            ORDER BY end_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subs)
    }

    async fn find_by_payment_id(&self, payment_id: Uuid) -> DbResult<Option<SubscriptionRow>> {
        let sub = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan_id, status, start_date, end_date, auto_renew,
                   payment_id, metadata, created_at, updated_at
            FROM subscriptions
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<SubscriptionRow>> {
        let subs = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan_id, status, start_date, end_date, auto_renew,
                   payment_id, metadata, created_at, updated_at
            FROM subscriptions
            WHERE status = 'active' AND end_date <= $1
            ORDER BY end_date ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(subs)
    }

    async fn set_auto_renew(&self, id: Uuid, auto_renew: bool) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET auto_renew = $1, updated_at = NOW()
            WHERE id = $2 AND status = 'active'
            "#,
        )
        .bind(auto_renew)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}
