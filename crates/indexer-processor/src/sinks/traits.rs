use async_trait::async_trait;
use indexer_core::types::{BidEventEntry, OrderSide, TokenMetadata, Trigger, TriggerKind};
use indexer_core::Result;

/// Activity feed entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    NewSellOrder,
    NewBuyOrder,
    SellOrderCancelled,
    BuyOrderCancelled,
}

impl ActivityKind {
    pub fn created(side: OrderSide) -> Self {
        match side {
            OrderSide::Sell => Self::NewSellOrder,
            OrderSide::Buy => Self::NewBuyOrder,
        }
    }

    pub fn cancelled(side: OrderSide) -> Self {
        match side {
            OrderSide::Sell => Self::SellOrderCancelled,
            OrderSide::Buy => Self::BuyOrderCancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewSellOrder => "newSellOrder",
            Self::NewBuyOrder => "newBuyOrder",
            Self::SellOrderCancelled => "sellOrderCancelled",
            Self::BuyOrderCancelled => "buyOrderCancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub order_id: String,
    pub context: String,
    pub trigger: Trigger,
}

/// Websocket event kinds, tagged by order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebsocketEventKind {
    SellOrder,
    BuyOrder,
}

impl WebsocketEventKind {
    pub fn for_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Sell => Self::SellOrder,
            OrderSide::Buy => Self::BuyOrder,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SellOrder => "sell-order",
            Self::BuyOrder => "buy-order",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsocketEvent {
    pub kind: WebsocketEventKind,
    pub order_id: String,
    pub trigger: TriggerKind,
}

/// Persists activity entries; entries of one kind keep their order
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn add_activities(&self, events: Vec<ActivityEvent>) -> Result<()>;
}

/// Pushes order liveness signals to live subscribers. Best effort.
#[async_trait]
pub trait WebsocketRouter: Send + Sync {
    async fn route(&self, event: WebsocketEvent) -> Result<()>;
}

/// Buy-side bookkeeping consumed by the bid aggregation job
#[async_trait]
pub trait BidEventsSink: Send + Sync {
    async fn add_bid_events(&self, entries: Vec<BidEventEntry>) -> Result<()>;
}

/// Writer for normalized token metadata
#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn write_metadata(&self, records: Vec<TokenMetadata>) -> Result<()>;
}
