use crate::backend::{FailureOutcome, JobRecord, QueueBackend, QueueCounts};
use crate::retry::RetryPolicy;
use crate::{QueueError, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum JobState {
    Pending { ready_at: Instant, seq: u64 },
    Active { lease_until: Instant, token: u64 },
    Parked,
}

#[derive(Debug)]
struct StoredJob {
    record: JobRecord,
    state: JobState,
}

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<String, StoredJob>,
    /// (ready_at, insertion sequence, id)
    ready: BTreeSet<(Instant, u64, String)>,
    completed: HashMap<String, Instant>,
    seq: u64,
}

impl State {
    fn schedule(&mut self, id: &str, ready_at: Instant) -> JobState {
        self.seq += 1;
        self.ready.insert((ready_at, self.seq, id.to_string()));
        JobState::Pending {
            ready_at,
            seq: self.seq,
        }
    }

    /// Whether `job` holds the live reservation of its id
    fn holds_lease(&self, job: &JobRecord) -> bool {
        let Some(stored) = self.jobs.get(&job.id) else {
            return false;
        };
        match (stored.state, job.lease_token.as_deref()) {
            (JobState::Active { token, .. }, Some(held)) => held == token.to_string(),
            _ => false,
        }
    }

    fn unschedule(&mut self, id: &str, state: JobState) {
        if let JobState::Pending { ready_at, seq } = state {
            self.ready.remove(&(ready_at, seq, id.to_string()));
        }
    }
}

/// Single-process queue backend. Same contract as the Redis backend, nothing survives a restart.
#[derive(Debug)]
pub struct MemoryQueueBackend {
    name: String,
    state: Mutex<State>,
}

impl MemoryQueueBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Payloads of every job not yet completed, in no particular order
    pub async fn pending_payloads(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .jobs
            .values()
            .filter(|job| !matches!(job.state, JobState::Parked))
            .map(|job| job.record.payload.clone())
            .collect()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, id: &str, payload: String) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        state.completed.retain(|_, expires_at| *expires_at > now);
        if state.completed.contains_key(id) || state.jobs.contains_key(id) {
            return Ok(false);
        }

        let job_state = state.schedule(id, now);
        state.jobs.insert(
            id.to_string(),
            StoredJob {
                record: JobRecord::new(id, payload),
                state: job_state,
            },
        );
        Ok(true)
    }

    async fn reserve(&self, lease: Duration) -> Result<Option<JobRecord>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let due = matches!(state.ready.first(), Some((ready_at, _, _)) if *ready_at <= now);
        if !due {
            return Ok(None);
        }
        let Some((_, _, id)) = state.ready.pop_first() else {
            return Ok(None);
        };
        state.seq += 1;
        let token = state.seq;

        match state.jobs.get_mut(&id) {
            Some(job) => {
                job.state = JobState::Active {
                    lease_until: now + lease,
                    token,
                };
                let mut record = job.record.clone();
                record.lease_token = Some(token.to_string());
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn extend_lease(&self, job: &JobRecord, lease: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        if !state.holds_lease(job) {
            return Ok(false);
        }
        if let Some(stored) = state.jobs.get_mut(&job.id) {
            if let JobState::Active { token, .. } = stored.state {
                stored.state = JobState::Active {
                    lease_until: now + lease,
                    token,
                };
            }
        }
        Ok(true)
    }

    async fn complete(&self, job: &JobRecord, retention: Duration) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        if !state.holds_lease(job) {
            return Err(QueueError::LeaseLost(job.id.clone()));
        }
        state.jobs.remove(&job.id);
        if !retention.is_zero() {
            state.completed.insert(job.id.clone(), now + retention);
        }
        Ok(())
    }

    async fn fail(
        &self,
        job: &JobRecord,
        error: &str,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome> {
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !state.holds_lease(job) {
            return Err(QueueError::LeaseLost(job.id.clone()));
        }
        let stored = state
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| QueueError::NotFound(job.id.clone()))?;
        let previous = stored.state;
        stored.record.attempts = job.attempts + 1;
        stored.record.last_error = Some(error.to_string());
        let attempts = stored.record.attempts;

        state.unschedule(&job.id, previous);

        if policy.is_exhausted(attempts) {
            if let Some(stored) = state.jobs.get_mut(&job.id) {
                stored.state = JobState::Parked;
            }
            return Ok(FailureOutcome::Parked { attempts });
        }

        let delay = policy.delay_for(attempts);
        let next_state = state.schedule(&job.id, now + delay);
        if let Some(stored) = state.jobs.get_mut(&job.id) {
            stored.state = next_state;
        }
        Ok(FailureOutcome::Retrying {
            attempt: attempts,
            delay,
        })
    }

    async fn recover_stalled(&self) -> Result<usize> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let stalled: Vec<String> = state
            .jobs
            .iter()
            .filter(|(_, job)| {
                matches!(job.state, JobState::Active { lease_until, .. } if lease_until <= now)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stalled {
            let next_state = state.schedule(id, now);
            if let Some(job) = state.jobs.get_mut(id) {
                job.state = next_state;
            }
        }
        Ok(stalled.len())
    }

    async fn parked(&self) -> Result<Vec<JobRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| matches!(job.state, JobState::Parked))
            .map(|job| job.record.clone())
            .collect())
    }

    async fn retry_parked(&self, id: &str) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let is_parked = matches!(
            state.jobs.get(id).map(|job| job.state),
            Some(JobState::Parked)
        );
        if !is_parked {
            return Ok(false);
        }

        let next_state = state.schedule(id, now);
        if let Some(job) = state.jobs.get_mut(id) {
            job.record.attempts = 0;
            job.state = next_state;
        }
        Ok(true)
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for job in state.jobs.values() {
            match job.state {
                JobState::Pending { .. } => counts.pending += 1,
                JobState::Active { .. } => counts.active += 1,
                JobState::Parked => counts.parked += 1,
            }
        }
        Ok(counts)
    }
}
