/// Channel and key builders for Redis

/// Activity feed channel, one per activity kind so consumers see each kind in order
pub fn activity_channel(kind: &str) -> String {
    format!("activities:{}", kind)
}

/// Websocket router channel for order events (`sell-order`, `buy-order`)
pub fn websocket_channel(event_kind: &str) -> String {
    format!("ws:{}", event_kind)
}

/// Normalized token metadata handed to the metadata writer
pub fn metadata_channel() -> String {
    "metadata:updates".to_string()
}

/// Distributed lock key
pub fn lock_key(name: &str) -> String {
    format!("lock:{}", name)
}

/// Single-use dedup marker key
pub fn dedup_key(event_hash: &str) -> String {
    format!("dedup:{}", event_hash)
}

/// List consumed by the bid-events aggregation job
pub const BID_EVENTS_LIST: &str = "bid-events";
