pub mod config;
pub mod models;
pub mod pool;
pub mod repositories;

pub use config::DatabaseConfig;
pub use pool::DatabasePool;

use indexer_core::IndexerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database configuration error: {0}")]
    Config(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::Query(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::Migration(err.to_string())
    }
}

impl From<DatabaseError> for IndexerError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Config(msg) => IndexerError::InvalidConfig(msg),
            other => IndexerError::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
