use crate::decoder::DecodedOrder;
use async_trait::async_trait;
use indexer_core::Result;
use indexer_queue::JobQueue;
use serde::{Deserialize, Serialize};

pub const ORDER_INTAKE_QUEUE: &str = "orderbook-orders";

/// Marketplace criteria of a collection or trait offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OrderCriteria {
    Collection {
        slug: String,
    },
    #[serde(rename_all = "camelCase")]
    Attribute {
        slug: String,
        trait_type: String,
        trait_name: String,
    },
}

/// Order handed to the order-saving stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntake {
    /// Protocol order hash as reported by the feed
    pub order_hash: String,
    /// Order kind tag, e.g. `seaport-v1.6`
    pub kind: String,
    pub order: DecodedOrder,
    /// Feed send time (unix millis)
    pub originated_at: i64,
    /// Set for orders observed on an external marketplace feed
    pub external: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<OrderCriteria>,
}

impl OrderIntake {
    pub fn job_id(&self) -> String {
        format!("{}:{}", self.kind, self.order_hash.to_lowercase())
    }
}

/// Destination of decoded feed orders
#[async_trait]
pub trait OrderIntakeSink: Send + Sync {
    async fn submit(&self, orders: Vec<OrderIntake>) -> Result<()>;
}

#[async_trait]
impl OrderIntakeSink for JobQueue<OrderIntake> {
    async fn submit(&self, orders: Vec<OrderIntake>) -> Result<()> {
        let jobs = orders
            .into_iter()
            .map(|order| (order.job_id(), order))
            .collect();
        self.add_bulk(jobs).await?;
        Ok(())
    }
}
