use crate::{config::DatabaseConfig, DatabaseError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Postgres pool shared by the order reader and the order-event ledger
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Connect, verify the server answers, then apply migrations when enabled
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::new(config).await?;
        pool.health_check().await?;

        if config.run_migrations {
            pool.migrate().await?;
        } else {
            info!("Skipping migrations");
        }

        info!("Database ready");
        Ok(pool)
    }

    /// Apply the embedded `orders` and `order_events` migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Ok(())
    }

    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}
