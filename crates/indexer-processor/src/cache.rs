//! Derived-cache recompute requests.
//!
//! The recompute workers live with the read APIs that own those caches; this
//! side only enqueues requests keyed by the triggering context.

use async_trait::async_trait;
use indexer_core::types::Trigger;
use indexer_core::Result;
use indexer_queue::JobQueue;
use serde::{Deserialize, Serialize};

pub const DERIVED_CACHE_QUEUE: &str = "derived-cache-recompute";

/// Which derived view to recompute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cache", rename_all = "kebab-case")]
pub enum CacheTarget {
    #[serde(rename_all = "camelCase")]
    TopBid { token_set_id: String },
    #[serde(rename_all = "camelCase")]
    FloorAsk { token_set_id: String },
    #[serde(rename_all = "camelCase")]
    NormalizedFloorAsk { token_set_id: String },
    /// Floor ask of one owner's balance of one token
    #[serde(rename_all = "camelCase")]
    NftBalanceFloorAsk {
        contract: Option<String>,
        token_id: Option<String>,
        owner: String,
    },
}

impl CacheTarget {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TopBid { .. } => "top-bid",
            Self::FloorAsk { .. } => "floor-ask",
            Self::NormalizedFloorAsk { .. } => "normalized-floor-ask",
            Self::NftBalanceFloorAsk { .. } => "nft-balance-floor-ask",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecompute {
    pub context: String,
    pub trigger: Trigger,
    #[serde(flatten)]
    pub target: CacheTarget,
}

impl CacheRecompute {
    /// One job per (cache, context)
    pub fn job_id(&self) -> String {
        format!("{}:{}", self.target.name(), self.context)
    }
}

#[async_trait]
pub trait DerivedCacheQueue: Send + Sync {
    async fn recompute(&self, request: CacheRecompute) -> Result<()>;
}

#[async_trait]
impl DerivedCacheQueue for JobQueue<CacheRecompute> {
    async fn recompute(&self, request: CacheRecompute) -> Result<()> {
        self.add(&request.job_id(), &request).await?;
        Ok(())
    }
}
