use crate::config::RedisConfig;
use crate::{RedisError, Result};
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::info;

/// Shared Redis connection used by the publisher, the coordinator and the job queues
#[derive(Clone)]
pub struct RedisConnection {
    manager: ConnectionManager,
    config: RedisConfig,
}

impl RedisConnection {
    /// Connect and verify the server answers
    pub async fn new(config: RedisConfig) -> Result<Self> {
        info!(url = %config.url, "Connecting to Redis");

        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let connection = Self { manager, config };
        connection.health_check().await?;

        info!("Redis connection established");

        Ok(connection)
    }

    /// Multiplexed handle; cheap to clone per call
    pub fn get_connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;
        Ok(())
    }
}
