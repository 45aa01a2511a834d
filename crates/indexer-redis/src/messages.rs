use serde::{Deserialize, Serialize};

/// Activity feed entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMessage {
    /// `newSellOrder`, `newBuyOrder`, `sellOrderCancelled`, `buyOrderCancelled`
    pub kind: String,
    pub order_id: String,
    pub tx_hash: Option<String>,
    pub log_index: Option<u64>,
    pub batch_index: Option<u64>,
    pub block_hash: Option<String>,
    pub timestamp: i64,
}

/// Order liveness signal for websocket subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketOrderMessage {
    /// `sell-order` or `buy-order`
    pub event: String,
    /// Trigger kind that caused the update
    pub trigger: String,
    pub order_id: String,
    pub timestamp: i64,
}

/// Stream message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    pub channel: String,
    pub data: String, // JSON stringified payload
    pub source: String,
    pub timestamp: u64,
}

impl StreamMessage {
    pub fn new(channel: String, data: impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            channel,
            data: serde_json::to_string(&data)?,
            source: "nft-order-indexer".to_string(),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        })
    }
}
