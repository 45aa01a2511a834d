mod order;
mod order_event;
mod token_metadata;
mod token_set;
mod trigger;

pub use order::{ApprovalStatus, FillabilityStatus, Order, OrderSide};
pub use order_event::{BidEventEntry, OrderEvent, OrderEventStatus};
pub use token_metadata::{TokenAttribute, TokenMetadata};
pub use token_set::{OrderType, TokenSetId};
pub use trigger::{OrderUpdateInfo, Trigger, TriggerKind, ZERO_ORDER_ID};

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Get current timestamp in seconds since Unix epoch
pub fn now_secs() -> i64 {
    now_millis() / 1000
}
