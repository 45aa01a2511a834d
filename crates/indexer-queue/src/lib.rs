//! Durable at-least-once job queue.
//!
//! A job's identity is the id it is enqueued with. While a job with a given id
//! is pending, running, parked, or recently completed, enqueueing the same id
//! again is a no-op, so equal ids collapse into one executed unit of work.
//! Failed jobs are retried with exponential backoff up to a bounded number of
//! attempts and then parked for inspection.

mod backend;
mod memory;
mod queue;
mod redis_backend;
mod retry;
mod worker;

pub use backend::{FailureOutcome, JobRecord, QueueBackend, QueueCounts};
pub use memory::MemoryQueueBackend;
pub use queue::JobQueue;
pub use redis_backend::RedisQueueBackend;
pub use retry::RetryPolicy;
pub use worker::{JobHandler, QueueWorker, WorkerConfig};

use indexer_core::IndexerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Lease lost for job {0}")]
    LeaseLost(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

impl From<QueueError> for IndexerError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Unavailable(msg) => IndexerError::CoordinationUnavailable(msg),
            QueueError::Serialization(msg) => IndexerError::Decode(msg),
            QueueError::NotFound(msg) => IndexerError::Queue(format!("job not found: {}", msg)),
            QueueError::LeaseLost(msg) => IndexerError::Queue(format!("lease lost: {}", msg)),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
