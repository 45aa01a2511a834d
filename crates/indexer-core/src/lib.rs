pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{FeedConfig, IndexerConfig, QueueConfig};
pub use error::{IndexerError, Result};
