use crate::backend::QueueBackend;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Typed handle over a queue backend. Payloads travel as JSON.
pub struct JobQueue<T> {
    backend: Arc<dyn QueueBackend>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _payload: PhantomData,
        }
    }
}

impl<T> JobQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            backend,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    /// Enqueue one job. Returns false when the id coalesced with an existing job.
    pub async fn add(&self, id: &str, payload: &T) -> Result<bool> {
        let encoded = serde_json::to_string(payload)?;
        let added = self.backend.enqueue(id, encoded).await?;
        if !added {
            debug!(queue = %self.name(), job_id = %id, "Job coalesced");
        }
        Ok(added)
    }

    /// Enqueue many jobs, stopping at the first store error. Returns how many were new.
    pub async fn add_bulk(&self, jobs: Vec<(String, T)>) -> Result<usize> {
        let mut added = 0;
        for (id, payload) in jobs {
            if self.add(&id, &payload).await? {
                added += 1;
            }
        }
        if added > 0 {
            indexer_metrics::counters::triggers_enqueued(self.name(), added as u64);
        }
        Ok(added)
    }

    pub fn decode(payload: &str) -> Result<T> {
        Ok(serde_json::from_str(payload)?)
    }
}
