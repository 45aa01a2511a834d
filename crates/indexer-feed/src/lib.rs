//! Marketplace push-feed intake: subscribe, dedup, decode, hand off

pub mod batch;
pub mod client;
pub mod decoder;
pub mod hash;
pub mod ingestor;
pub mod intake;

pub use batch::BidEventsBatch;
pub use client::StreamClient;
pub use decoder::{DecodeFailure, DecodedOrder, OrderFormat, ProtocolTable};
pub use ingestor::FeedIngestor;
pub use intake::{OrderCriteria, OrderIntake, OrderIntakeSink, ORDER_INTAKE_QUEUE};

use indexer_core::IndexerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Protocol(err.to_string())
    }
}

impl From<FeedError> for IndexerError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Config(msg) => IndexerError::InvalidConfig(msg),
            FeedError::Connection(msg) => {
                IndexerError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionAborted, msg))
            }
            FeedError::Protocol(msg) => IndexerError::Decode(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
