//! PostgreSQL connection pool

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Pool shared by every repository
pub type DbPool = PgPool;

/// Upper bound on open connections per process
const MAX_CONNECTIONS: u32 = 20;

/// How long a query waits for a free connection before failing
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to `database_url`
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    tracing::debug!(max_connections = MAX_CONNECTIONS, "Connected to PostgreSQL");
    Ok(pool)
}
