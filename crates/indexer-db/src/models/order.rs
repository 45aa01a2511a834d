use indexer_core::types::Order;
use indexer_core::IndexerError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the orders table. NUMERIC columns are selected as text and
/// timestamps as unix millis.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbOrder {
    pub id: String,
    /// Protocol tag, e.g. `seaport-v1.5`
    pub kind: String,
    /// `sell` or `buy`
    pub side: String,
    pub token_set_id: String,
    pub source: Option<String>,
    pub valid_from: i64,
    pub valid_to: Option<i64>,
    pub quantity_remaining: String,
    pub nonce: Option<String>,
    pub maker: String,
    pub price: Option<String>,
    pub value: Option<String>,
    pub normalized_value: Option<String>,
    pub currency: Option<String>,
    pub fillability_status: String,
    pub approval_status: String,
    pub raw_data: serde_json::Value,
    pub originated_at: Option<i64>,
    pub created_at: i64,
}

impl TryFrom<DbOrder> for Order {
    type Error = IndexerError;

    fn try_from(row: DbOrder) -> Result<Self, Self::Error> {
        Ok(Order {
            side: row.side.parse()?,
            fillability_status: row.fillability_status.parse()?,
            approval_status: row.approval_status.parse()?,
            id: row.id,
            kind: row.kind,
            token_set_id: row.token_set_id,
            source: row.source,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            quantity_remaining: row.quantity_remaining,
            nonce: row.nonce,
            maker: row.maker,
            price: row.price,
            value: row.value,
            normalized_value: row.normalized_value,
            currency: row.currency,
            raw_data: row.raw_data,
            originated_at: row.originated_at,
            created_at: row.created_at,
        })
    }
}
