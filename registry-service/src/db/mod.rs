//! SQLite connection management and per-entity queries.
//!
//! Query functions take a `&mut SqliteConnection` so they run inside the
//! request's transaction.

pub mod access_keys;
pub mod credentials;
pub mod encryption_keys;
pub mod grants;
pub mod groups;
pub mod identities;
pub mod providers;
pub mod settings;

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;

/// Pooled SQLite handle shared by every request.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool. In-memory databases are pinned to one connection that is
    /// never recycled, since each connection would otherwise see its own
    /// empty database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        tracing::info!("Connecting to SQLite...");

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = config.url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(30));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        tracing::info!(in_memory, "Successfully connected to SQLite");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        Ok(self.pool.begin().await?)
    }
}

/// Timestamp used for records that never expire (9999-12-31T23:59:59Z).
pub fn never() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(253_402_300_799, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn memory_db() -> Database {
        let db = Database::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
        .expect("open in-memory database");
        db.run_migrations().await.expect("run migrations");
        db
    }
}
