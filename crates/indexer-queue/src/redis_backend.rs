//! Redis queue backend.
//!
//! Keys for a queue named `q` share the `{q}` hash tag:
//! - `queue:{q}:jobs` hash of id to JSON [`JobRecord`]
//! - `queue:{q}:pending` zset scored by ready time (ms)
//! - `queue:{q}:active` zset scored by lease expiry (ms)
//! - `queue:{q}:parked` set
//! - `queue:{q}:leases` hash of id to the token of its live reservation
//! - `queue:{q}:lease-seq` counter the tokens are drawn from
//! - `queue:{q}:done:<id>` marker living for the completed-id retention

use crate::backend::{FailureOutcome, JobRecord, QueueBackend, QueueCounts};
use crate::retry::RetryPolicy;
use crate::{QueueError, Result};
use async_trait::async_trait;
use indexer_core::types::now_millis;
use indexer_redis::RedisConnection;
use redis::Script;
use std::sync::Arc;
use std::time::Duration;

const ENQUEUE: &str = r#"
if redis.call('EXISTS', KEYS[3]) == 1 then return 0 end
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then return 0 end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
return 1
"#;

const RESERVE: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ids == 0 then return false end
local id = ids[1]
local token = tostring(redis.call('INCR', KEYS[5]))
redis.call('ZREM', KEYS[2], id)
redis.call('ZADD', KEYS[3], ARGV[2], id)
redis.call('HSET', KEYS[4], id, token)
return {redis.call('HGET', KEYS[1], id), token}
"#;

const EXTEND: &str = r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then return 0 end
redis.call('ZADD', KEYS[1], 'XX', ARGV[3], ARGV[1])
return 1
"#;

const COMPLETE: &str = r#"
if redis.call('HGET', KEYS[3], ARGV[1]) ~= ARGV[2] then return 0 end
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
if tonumber(ARGV[3]) > 0 then
  redis.call('SET', KEYS[4], '1', 'PX', ARGV[3])
end
return 1
"#;

const RETRY: &str = r#"
if redis.call('HGET', KEYS[4], ARGV[1]) ~= ARGV[2] then return 0 end
redis.call('HDEL', KEYS[4], ARGV[1])
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('ZADD', KEYS[3], ARGV[4], ARGV[1])
return 1
"#;

const PARK: &str = r#"
if redis.call('HGET', KEYS[4], ARGV[1]) ~= ARGV[2] then return 0 end
redis.call('HDEL', KEYS[4], ARGV[1])
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('SADD', KEYS[3], ARGV[1])
return 1
"#;

const RECOVER: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('HDEL', KEYS[3], id)
  redis.call('ZADD', KEYS[2], ARGV[1], id)
end
return #ids
"#;

const RETRY_PARKED: &str = r#"
if redis.call('SREM', KEYS[2], ARGV[1]) == 0 then return 0 end
local raw = redis.call('HGET', KEYS[1], ARGV[1])
if not raw then return 0 end
local job = cjson.decode(raw)
job.attempts = 0
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(job))
redis.call('ZADD', KEYS[3], ARGV[2], ARGV[1])
return 1
"#;

struct Scripts {
    enqueue: Script,
    reserve: Script,
    extend: Script,
    complete: Script,
    retry: Script,
    park: Script,
    recover: Script,
    retry_parked: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            enqueue: Script::new(ENQUEUE),
            reserve: Script::new(RESERVE),
            extend: Script::new(EXTEND),
            complete: Script::new(COMPLETE),
            retry: Script::new(RETRY),
            park: Script::new(PARK),
            recover: Script::new(RECOVER),
            retry_parked: Script::new(RETRY_PARKED),
        }
    }
}

/// Queue backend whose state lives in Redis, shared by every process using the same name
pub struct RedisQueueBackend {
    connection: Arc<RedisConnection>,
    name: String,
    prefix: String,
    scripts: Scripts,
}

impl RedisQueueBackend {
    pub fn new(connection: Arc<RedisConnection>, name: impl Into<String>) -> Self {
        let name = name.into();
        let prefix = format!("queue:{{{}}}", name);
        Self {
            connection,
            name,
            prefix,
            scripts: Scripts::load(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    fn done_key(&self, id: &str) -> String {
        format!("{}:done:{}", self.prefix, id)
    }
}

/// `now + delay` in unix millis, saturating
fn lease_deadline(now: i64, delay: Duration) -> i64 {
    now.saturating_add(delay.as_millis().min(i64::MAX as u128) as i64)
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, id: &str, payload: String) -> Result<bool> {
        let record = serde_json::to_string(&JobRecord::new(id, payload))?;
        let mut conn = self.connection.get_connection();

        let added: i64 = self
            .scripts
            .enqueue
            .key(self.key("jobs"))
            .key(self.key("pending"))
            .key(self.done_key(id))
            .arg(id)
            .arg(record)
            .arg(now_millis())
            .invoke_async(&mut conn)
            .await?;

        Ok(added == 1)
    }

    async fn reserve(&self, lease: Duration) -> Result<Option<JobRecord>> {
        let now = now_millis();
        let mut conn = self.connection.get_connection();

        let reserved: Option<(String, String)> = self
            .scripts
            .reserve
            .key(self.key("jobs"))
            .key(self.key("pending"))
            .key(self.key("active"))
            .key(self.key("leases"))
            .key(self.key("lease-seq"))
            .arg(now)
            .arg(lease_deadline(now, lease))
            .invoke_async(&mut conn)
            .await?;

        let Some((raw, token)) = reserved else {
            return Ok(None);
        };
        let mut record: JobRecord = serde_json::from_str(&raw)?;
        record.lease_token = Some(token);
        Ok(Some(record))
    }

    async fn extend_lease(&self, job: &JobRecord, lease: Duration) -> Result<bool> {
        let mut conn = self.connection.get_connection();

        let extended: i64 = self
            .scripts
            .extend
            .key(self.key("active"))
            .key(self.key("leases"))
            .arg(&job.id)
            .arg(job.lease_token.as_deref().unwrap_or_default())
            .arg(lease_deadline(now_millis(), lease))
            .invoke_async(&mut conn)
            .await?;

        Ok(extended == 1)
    }

    async fn complete(&self, job: &JobRecord, retention: Duration) -> Result<()> {
        let mut conn = self.connection.get_connection();

        let completed: i64 = self
            .scripts
            .complete
            .key(self.key("jobs"))
            .key(self.key("active"))
            .key(self.key("leases"))
            .key(self.done_key(&job.id))
            .arg(&job.id)
            .arg(job.lease_token.as_deref().unwrap_or_default())
            .arg(retention.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        if completed == 0 {
            return Err(QueueError::LeaseLost(job.id.clone()));
        }
        Ok(())
    }

    async fn fail(
        &self,
        job: &JobRecord,
        error: &str,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome> {
        let token = job.lease_token.as_deref().unwrap_or_default();
        let mut record = job.clone();
        record.attempts = job.attempts + 1;
        record.last_error = Some(error.to_string());
        record.lease_token = None;
        let attempts = record.attempts;
        let encoded = serde_json::to_string(&record)?;
        let mut conn = self.connection.get_connection();

        if policy.is_exhausted(attempts) {
            let updated: i64 = self
                .scripts
                .park
                .key(self.key("jobs"))
                .key(self.key("active"))
                .key(self.key("parked"))
                .key(self.key("leases"))
                .arg(&job.id)
                .arg(token)
                .arg(encoded)
                .invoke_async(&mut conn)
                .await?;
            if updated == 0 {
                return Err(QueueError::LeaseLost(job.id.clone()));
            }
            return Ok(FailureOutcome::Parked { attempts });
        }

        let delay = policy.delay_for(attempts);
        let updated: i64 = self
            .scripts
            .retry
            .key(self.key("jobs"))
            .key(self.key("active"))
            .key(self.key("pending"))
            .key(self.key("leases"))
            .arg(&job.id)
            .arg(token)
            .arg(encoded)
            .arg(lease_deadline(now_millis(), delay))
            .invoke_async(&mut conn)
            .await?;
        if updated == 0 {
            return Err(QueueError::LeaseLost(job.id.clone()));
        }

        Ok(FailureOutcome::Retrying {
            attempt: attempts,
            delay,
        })
    }

    async fn recover_stalled(&self) -> Result<usize> {
        let mut conn = self.connection.get_connection();

        let recovered: i64 = self
            .scripts
            .recover
            .key(self.key("active"))
            .key(self.key("pending"))
            .key(self.key("leases"))
            .arg(now_millis())
            .invoke_async(&mut conn)
            .await?;

        Ok(recovered.max(0) as usize)
    }

    async fn parked(&self) -> Result<Vec<JobRecord>> {
        let mut conn = self.connection.get_connection();

        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.key("parked"))
            .query_async(&mut conn)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(self.key("jobs"))
            .arg(&ids)
            .query_async(&mut conn)
            .await?;

        raw.into_iter()
            .flatten()
            .map(|raw| serde_json::from_str(&raw).map_err(QueueError::from))
            .collect()
    }

    async fn retry_parked(&self, id: &str) -> Result<bool> {
        let mut conn = self.connection.get_connection();

        let moved: i64 = self
            .scripts
            .retry_parked
            .key(self.key("jobs"))
            .key(self.key("parked"))
            .key(self.key("pending"))
            .arg(id)
            .arg(now_millis())
            .invoke_async(&mut conn)
            .await?;

        Ok(moved == 1)
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let mut conn = self.connection.get_connection();

        let (pending, active, parked): (usize, usize, usize) = redis::pipe()
            .cmd("ZCARD")
            .arg(self.key("pending"))
            .cmd("ZCARD")
            .arg(self.key("active"))
            .cmd("SCARD")
            .arg(self.key("parked"))
            .query_async(&mut conn)
            .await?;

        Ok(QueueCounts {
            pending,
            active,
            parked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_redis::RedisConfig;

    /// Backend on a throwaway queue; `None` unless `REDIS_URL` points at a server
    async fn backend(tag: &str) -> Option<RedisQueueBackend> {
        if std::env::var("REDIS_URL").is_err() {
            eprintln!("REDIS_URL not set, skipping");
            return None;
        }
        let connection = RedisConnection::new(RedisConfig::from_env()).await.ok()?;
        let name = format!("test-{}-{}-{}", tag, std::process::id(), now_millis());
        Some(RedisQueueBackend::new(Arc::new(connection), name))
    }

    async fn cleanup(backend: &RedisQueueBackend, ids: &[&str]) {
        let mut conn = backend.connection.get_connection();
        let mut cmd = redis::cmd("DEL");
        for suffix in ["jobs", "pending", "active", "parked", "leases", "lease-seq"] {
            cmd.arg(backend.key(suffix));
        }
        for id in ids {
            cmd.arg(backend.done_key(id));
        }
        let _: redis::RedisResult<i64> = cmd.query_async(&mut conn).await;
    }

    #[tokio::test]
    async fn test_duplicate_ids_coalesce_in_every_state() {
        let Some(backend) = backend("coalesce").await else {
            return;
        };

        assert!(backend.enqueue("a", "1".into()).await.unwrap());
        assert!(!backend.enqueue("a", "2".into()).await.unwrap());

        let job = backend
            .reserve(Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.payload, "1");
        assert!(!backend.enqueue("a", "3".into()).await.unwrap());

        backend
            .complete(&job, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!backend.enqueue("a", "4".into()).await.unwrap());
        assert_eq!(backend.counts().await.unwrap().pending, 0);

        cleanup(&backend, &["a"]).await;
    }

    #[tokio::test]
    async fn test_failure_schedules_backoff_then_parks() {
        let Some(backend) = backend("backoff").await else {
            return;
        };
        let policy = RetryPolicy::new(2, Duration::from_secs(10));

        backend.enqueue("a", "{}".into()).await.unwrap();
        let job = backend
            .reserve(Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        let before = now_millis();
        let outcome = backend.fail(&job, "boom", &policy).await.unwrap();
        assert_eq!(
            outcome,
            FailureOutcome::Retrying {
                attempt: 1,
                delay: Duration::from_secs(10)
            }
        );

        let mut conn = backend.connection.get_connection();
        let score: f64 = redis::cmd("ZSCORE")
            .arg(backend.key("pending"))
            .arg("a")
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(score as i64 >= before + 10_000);
        assert!(backend.reserve(Duration::from_secs(30)).await.unwrap().is_none());

        // Make the retry due and run it out
        let _: i64 = redis::cmd("ZADD")
            .arg(backend.key("pending"))
            .arg(0)
            .arg("a")
            .query_async(&mut conn)
            .await
            .unwrap();
        let job = backend
            .reserve(Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempts, 1);
        let outcome = backend.fail(&job, "boom again", &policy).await.unwrap();
        assert_eq!(outcome, FailureOutcome::Parked { attempts: 2 });

        let parked = backend.parked().await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].last_error.as_deref(), Some("boom again"));

        assert!(backend.retry_parked("a").await.unwrap());
        let job = backend
            .reserve(Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempts, 0);

        cleanup(&backend, &["a"]).await;
    }

    #[tokio::test]
    async fn test_recovered_job_rejects_the_previous_reservation() {
        let Some(backend) = backend("lease").await else {
            return;
        };
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        backend.enqueue("a", "{}".into()).await.unwrap();
        let stale = backend.reserve(Duration::ZERO).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(backend.recover_stalled().await.unwrap(), 1);

        let current = backend
            .reserve(Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stale.lease_token, current.lease_token);

        assert!(!backend
            .extend_lease(&stale, Duration::from_secs(30))
            .await
            .unwrap());
        assert!(matches!(
            backend.fail(&stale, "late", &policy).await,
            Err(QueueError::LeaseLost(_))
        ));
        assert!(matches!(
            backend.complete(&stale, Duration::from_secs(60)).await,
            Err(QueueError::LeaseLost(_))
        ));
        assert_eq!(backend.counts().await.unwrap().active, 1);

        assert!(backend
            .extend_lease(&current, Duration::from_secs(30))
            .await
            .unwrap());
        backend
            .complete(&current, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(backend.counts().await.unwrap().active, 0);

        cleanup(&backend, &["a"]).await;
    }
}
