use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The shared key-value store backing locks, dedup markers and queues is unreachable
    #[error("Coordination store unavailable: {0}")]
    CoordinationUnavailable(String),

    /// Malformed or unrecognized external payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Order or cache read/write failed; the job is retried
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexerError {
    /// Whether retrying the same unit of work can succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CoordinationUnavailable(_) | Self::Storage(_) | Self::Queue(_) | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        IndexerError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
