use crate::retry::RetryPolicy;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A job as stored by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    /// JSON-encoded job payload
    pub payload: String,
    /// Failed runs so far
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set on the copy handed out by `reserve`; identifies that reservation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_token: Option<String>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, payload: String) -> Self {
        Self {
            id: id.into(),
            payload,
            attempts: 0,
            last_error: None,
            lease_token: None,
        }
    }
}

/// What happened to a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying { attempt: u32, delay: Duration },
    Parked { attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: usize,
    pub active: usize,
    pub parked: usize,
}

/// Storage for one named queue
#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Add a job unless its id is pending, active, parked or recently completed.
    /// Returns whether the job was added.
    async fn enqueue(&self, id: &str, payload: String) -> Result<bool>;

    /// Take the next ready job and lease it for `lease`. The returned record
    /// carries a fresh lease token.
    async fn reserve(&self, lease: Duration) -> Result<Option<JobRecord>>;

    /// Push the lease of a running job to `now + lease`. Returns false when the
    /// reservation is no longer the current one.
    async fn extend_lease(&self, job: &JobRecord, lease: Duration) -> Result<bool>;

    /// Remove a finished job; its id keeps coalescing duplicates for `retention`.
    /// Fails with `LeaseLost` unless `job` holds the current reservation.
    async fn complete(&self, job: &JobRecord, retention: Duration) -> Result<()>;

    /// Record a failed run and either reschedule or park the job.
    /// Fails with `LeaseLost` unless `job` holds the current reservation.
    async fn fail(&self, job: &JobRecord, error: &str, policy: &RetryPolicy)
        -> Result<FailureOutcome>;

    /// Return jobs whose lease expired to pending. Returns how many were recovered.
    async fn recover_stalled(&self) -> Result<usize>;

    async fn parked(&self) -> Result<Vec<JobRecord>>;

    /// Move a parked job back to pending with a fresh attempt budget
    async fn retry_parked(&self, id: &str) -> Result<bool>;

    async fn counts(&self) -> Result<QueueCounts>;
}
