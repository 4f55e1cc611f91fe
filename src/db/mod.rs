//! PostgreSQL pool setup for the ledger store

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Failed to run migrations: {0}")]
    Migration(String),

    #[error("Database health check failed: {0}")]
    HealthCheck(String),
}

/// Build the connection pool and verify it answers before handing it to the
/// store. Ledger operations complete in a single round trip, so acquire
/// waits are capped tightly.
pub async fn connect(config: &Config) -> Result<PgPool, DbError> {
    tracing::info!("Connecting to database at {}", config.database_url_masked());

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .idle_timeout(Duration::from_secs(300))
        .connect(&config.database_url)
        .await
        .map_err(|e| DbError::Connection(e.to_string()))?;

    check_health(&pool).await?;
    tracing::info!(
        max_connections = config.db_max_connections,
        "database pool ready"
    );

    Ok(pool)
}

/// Apply pending schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DbError::Migration(e.to_string()))?;

    tracing::info!("database migrations applied");
    Ok(())
}

/// Liveness probe, also usable by embedders' health endpoints
pub async fn check_health(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| DbError::HealthCheck(e.to_string()))?;

    Ok(())
}
