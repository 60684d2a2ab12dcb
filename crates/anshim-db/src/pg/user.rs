//! PostgreSQL user profile repository implementation

use anshim_types::WindowStarts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::UserRow;
use crate::repo::UserRepository;

/// PostgreSQL user profile repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<UserRow>> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, tier, daily_questions_used, daily_window_start,
                   weekly_questions_used, weekly_window_start,
                   monthly_questions_used, monthly_window_start,
                   last_question_at, customer_key, billing_key, created_at, updated_at
            FROM user_profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_or_get(&self, id: Uuid) -> DbResult<UserRow> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO user_profiles (id, tier)
            VALUES ($1, 'basic')
            ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id
            RETURNING id, tier, daily_questions_used, daily_window_start,
                      weekly_questions_used, weekly_window_start,
                      monthly_questions_used, monthly_window_start,
                      last_question_at, customer_key, billing_key, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn record_question(
        &self,
        id: Uuid,
        windows: WindowStarts,
        at: DateTime<Utc>,
    ) -> DbResult<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE user_profiles SET
                daily_questions_used = CASE
                    WHEN daily_window_start >= $2 THEN daily_questions_used + 1 ELSE 1 END,
                daily_window_start = $2,
                weekly_questions_used = CASE
                    WHEN weekly_window_start >= $3 THEN weekly_questions_used + 1 ELSE 1 END,
                weekly_window_start = $3,
                monthly_questions_used = CASE
                    WHEN monthly_window_start >= $4 THEN monthly_questions_used + 1 ELSE 1 END,
                monthly_window_start = $4,
                last_question_at = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, tier, daily_questions_used, daily_window_start,
                      weekly_questions_used, weekly_window_start,
                      monthly_questions_used, monthly_window_start,
                      last_question_at, customer_key, billing_key, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(windows.daily)
        .bind(windows.weekly)
        .bind(windows.monthly)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(DbError::NotFound)
    }

    async fn set_billing_key(
        &self,
        id: Uuid,
        customer_key: &str,
        billing_key: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_profiles
            SET customer_key = $1, billing_key = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(customer_key)
        .bind(billing_key)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}
