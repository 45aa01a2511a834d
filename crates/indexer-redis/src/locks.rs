//! Distributed locks and single-use dedup markers.
//!
//! Locks are advisory: nothing stops a caller that skips `acquire` from
//! touching the protected resource. TTL expiry is the only automatic release,
//! so a crashed holder's lock heals once its TTL elapses.

use crate::channels::{dedup_key, lock_key};
use crate::connection::RedisConnection;
use async_trait::async_trait;
use indexer_core::types::now_millis;
use indexer_core::{IndexerError, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Create the lock key only if absent. Never blocks or retries.
    async fn acquire(&self, name: &str, ttl_secs: Option<u64>) -> Result<bool>;

    /// Reset the expiry of an existing lock. Never creates one.
    async fn extend(&self, name: &str, ttl_secs: u64) -> Result<bool>;

    /// Unconditional, idempotent delete
    async fn release(&self, name: &str) -> Result<()>;

    /// True the first time `event_hash` is seen inside the TTL window
    async fn mark_if_new_event(&self, event_hash: &str, ttl_secs: u64) -> Result<bool>;
}

/// Run `f` while holding `name`. Returns `None` when another holder owns the lock.
pub async fn with_lock<C, F, T>(coordinator: &C, name: &str, ttl_secs: u64, f: F) -> Result<Option<T>>
where
    C: Coordinator + ?Sized,
    F: Future<Output = T>,
{
    if !coordinator.acquire(name, Some(ttl_secs)).await? {
        debug!(lock = %name, "Lock held elsewhere");
        return Ok(None);
    }

    let output = f.await;

    if let Err(e) = coordinator.release(name).await {
        warn!(lock = %name, error = %e, "Failed to release lock, it will expire after its TTL");
    }

    Ok(Some(output))
}

/// Coordinator backed by Redis `SET NX`
#[derive(Clone)]
pub struct RedisCoordinator {
    connection: Arc<RedisConnection>,
}

impl RedisCoordinator {
    pub fn new(connection: Arc<RedisConnection>) -> Self {
        Self { connection }
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl_secs: Option<u64>) -> Result<bool> {
        let mut conn = self.connection.get_connection();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl.max(1));
        }

        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(reply.is_some())
    }
}

#[async_trait]
impl Coordinator for RedisCoordinator {
    async fn acquire(&self, name: &str, ttl_secs: Option<u64>) -> Result<bool> {
        let holder = format!("{}:{}", std::process::id(), now_millis());
        self.set_if_absent(&lock_key(name), holder, ttl_secs).await
    }

    async fn extend(&self, name: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.connection.get_connection();
        let updated: i64 = redis::cmd("EXPIRE")
            .arg(lock_key(name))
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(updated == 1)
    }

    async fn release(&self, name: &str) -> Result<()> {
        let mut conn = self.connection.get_connection();
        redis::cmd("DEL")
            .arg(lock_key(name))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn mark_if_new_event(&self, event_hash: &str, ttl_secs: u64) -> Result<bool> {
        self.set_if_absent(
            &dedup_key(event_hash),
            now_millis().to_string(),
            Some(ttl_secs),
        )
        .await
    }
}

fn unavailable(err: redis::RedisError) -> IndexerError {
    IndexerError::CoordinationUnavailable(err.to_string())
}
