use crate::error::{IndexerError, Result};
use std::env;

/// Job queue tuning shared by every queue the indexer runs
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers per consumer
    pub concurrency: usize,
    /// Attempts before a job is parked
    pub max_attempts: u32,
    /// Base delay of the exponential backoff
    pub backoff_ms: u64,
    /// How long a completed job id keeps coalescing duplicates
    pub completed_retention_secs: u64,
    /// Time a reserved job may run before it is considered stalled
    pub lease_secs: u64,
    /// Idle poll interval when a queue is empty
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            concurrency: parse_env("WORKER_CONCURRENCY").unwrap_or(30),
            max_attempts: parse_env("JOB_MAX_ATTEMPTS").unwrap_or(5),
            backoff_ms: parse_env("JOB_BACKOFF_MS").unwrap_or(10_000),
            completed_retention_secs: parse_env("JOB_COMPLETED_RETENTION_SECS").unwrap_or(3600),
            lease_secs: parse_env("JOB_LEASE_SECS").unwrap_or(60),
            poll_interval_ms: parse_env("JOB_POLL_INTERVAL_MS").unwrap_or(250),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 30,
            max_attempts: 5,
            backoff_ms: 10_000,
            completed_retention_secs: 3600,
            lease_secs: 60,
            poll_interval_ms: 250,
        }
    }
}

/// Marketplace push-feed configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Disabled when no API key is configured
    pub enabled: bool,
    pub api_key: Option<String>,
    pub stream_url: String,
    /// Lifetime of a dedup marker
    pub dedup_ttl_secs: u64,
    /// Bid triggers buffered before a bulk submission
    pub bid_batch_size: usize,
    /// Oldest buffered bid age that forces a flush
    pub bid_batch_max_age_ms: u64,
}

impl FeedConfig {
    pub fn from_env(chain_id: u64) -> Self {
        let api_key = env::var("OPENSEA_API_KEY").ok().map(sanitize);
        let enabled = env::var("FEED_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(api_key.is_some());

        Self {
            enabled,
            api_key,
            stream_url: env::var("OPENSEA_STREAM_URL")
                .map(sanitize)
                .unwrap_or_else(|_| default_stream_url(chain_id).to_string()),
            dedup_ttl_secs: parse_env("DEDUP_TTL_SECS").unwrap_or(300),
            bid_batch_size: parse_env("BID_BATCH_SIZE")
                .unwrap_or_else(|| default_bid_batch_size(chain_id))
                .max(1),
            bid_batch_max_age_ms: parse_env("BID_BATCH_MAX_AGE_MS").unwrap_or(1000),
        }
    }
}

/// High-traffic networks batch bids; everything else submits them one by one
pub fn default_bid_batch_size(chain_id: u64) -> usize {
    match chain_id {
        1 => 200,
        _ => 1,
    }
}

fn default_stream_url(chain_id: u64) -> &'static str {
    match chain_id {
        5 | 11155111 | 80001 | 84532 => "wss://testnets-stream.openseabeta.com/socket/websocket",
        _ => "wss://stream.openseabeta.com/socket/websocket",
    }
}

/// Complete indexer configuration
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chain_id: u64,
    /// Chain name as spelled by the marketplace feed
    pub chain_name: String,
    pub feed: FeedConfig,
    pub queue: QueueConfig,
}

impl IndexerConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        let chain_id = env::var("CHAIN_ID")
            .map_err(|_| IndexerError::MissingEnvVar("CHAIN_ID".to_string()))?
            .parse::<u64>()
            .map_err(|_| IndexerError::InvalidConfig("CHAIN_ID must be an integer".to_string()))?;

        let chain_name = match env::var("CHAIN_NAME") {
            Ok(name) => sanitize(name),
            Err(_) => chain_name_for(chain_id)
                .ok_or_else(|| {
                    IndexerError::InvalidConfig(format!(
                        "CHAIN_NAME not set and chain {} has no known name",
                        chain_id
                    ))
                })?
                .to_string(),
        };

        Ok(Self {
            chain_id,
            chain_name,
            feed: FeedConfig::from_env(chain_id),
            queue: QueueConfig::from_env(),
        })
    }
}

/// Feed-side chain names
pub fn chain_name_for(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("ethereum"),
        10 => Some("optimism"),
        137 => Some("matic"),
        8453 => Some("base"),
        42161 => Some("arbitrum"),
        7777777 => Some("zora"),
        11155111 => Some("sepolia"),
        84532 => Some("base_sepolia"),
        _ => None,
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Strip whitespace and surrounding quotes
fn sanitize(value: String) -> String {
    let trimmed = value.trim();
    let unquoted = if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    unquoted.to_string()
}
