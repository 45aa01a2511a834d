use indexer_core::types::OrderEvent;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the append-only order_events ledger
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbOrderEvent {
    pub context: String,
    pub kind: String,
    pub status: String,
    pub contract: Option<String>,
    pub token_id: Option<String>,
    pub order_id: String,
    pub order_kind: String,
    pub order_source: Option<String>,
    pub order_valid_from: i64,
    pub order_valid_to: Option<i64>,
    pub order_quantity_remaining: String,
    pub order_nonce: Option<String>,
    pub maker: String,
    pub price: Option<String>,
    pub value: Option<String>,
    pub tx_hash: Option<String>,
    pub tx_timestamp: Option<i64>,
    pub log_index: Option<i64>,
    pub batch_index: Option<i64>,
    pub block_hash: Option<String>,
}

impl From<&OrderEvent> for DbOrderEvent {
    fn from(event: &OrderEvent) -> Self {
        Self {
            context: event.context.clone(),
            kind: event.kind.as_str().to_string(),
            status: event.status.as_str().to_string(),
            contract: event.contract.clone(),
            token_id: event.token_id.clone(),
            order_id: event.order_id.clone(),
            order_kind: event.order_kind.clone(),
            order_source: event.order_source.clone(),
            order_valid_from: event.order_valid_from,
            order_valid_to: event.order_valid_to,
            order_quantity_remaining: event.order_quantity_remaining.clone(),
            order_nonce: event.order_nonce.clone(),
            maker: event.maker.clone(),
            price: event.price.clone(),
            value: event.value.clone(),
            tx_hash: event.tx_hash.clone(),
            tx_timestamp: event.tx_timestamp,
            log_index: event.log_index.map(|v| v as i64),
            batch_index: event.batch_index.map(|v| v as i64),
            block_hash: event.block_hash.clone(),
        }
    }
}
