use crate::types::order::Order;
use crate::types::token_set::TokenSetId;
use crate::types::trigger::{Trigger, TriggerKind};
use serde::{Deserialize, Serialize};

/// Status recorded on a ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderEventStatus {
    Active,
    Inactive,
    Filled,
    Cancelled,
    Expired,
}

impl OrderEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

/// Append-only ledger row: a snapshot of a sell order at the moment of a mutation.
/// At most one row exists per (`context`, `order_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    /// Context of the update that produced the row
    pub context: String,
    pub kind: TriggerKind,
    pub status: OrderEventStatus,
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
    pub log_index: Option<u64>,
    pub batch_index: Option<u64>,
    pub block_hash: Option<String>,
}

impl OrderEvent {
    pub fn snapshot(context: &str, order: &Order, trigger: &Trigger) -> Self {
        let token = TokenSetId::new(&order.token_set_id).single_token();

        Self {
            context: context.to_string(),
            kind: trigger.kind,
            status: order.event_status(),
            contract: token.map(|(contract, _)| contract.to_string()),
            token_id: token.map(|(_, token_id)| token_id.to_string()),
            order_id: order.id.clone(),
            order_kind: order.kind.clone(),
            order_source: order.source.clone(),
            order_valid_from: order.valid_from,
            order_valid_to: order.valid_to,
            order_quantity_remaining: order.quantity_remaining.clone(),
            order_nonce: order.nonce.clone(),
            maker: order.maker.clone(),
            price: order.price.clone(),
            value: order.value.clone(),
            tx_hash: trigger.tx_hash.clone(),
            tx_timestamp: trigger.tx_timestamp,
            log_index: trigger.log_index,
            batch_index: trigger.batch_index,
            block_hash: trigger.block_hash.clone(),
        }
    }
}

/// Buy-side bookkeeping entry handed to the bid-events aggregation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidEventEntry {
    pub trigger: Trigger,
    pub order: Order,
}
