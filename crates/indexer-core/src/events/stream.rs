use serde::{Deserialize, Serialize};

/// A decoded push message. The variant is selected by `event_type`; kinds the
/// ingestor does not handle collapse into `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StreamEvent {
    ItemListed(StreamEventEnvelope<OrderEventPayload>),
    ItemReceivedBid(StreamEventEnvelope<OrderEventPayload>),
    CollectionOffer(StreamEventEnvelope<OrderEventPayload>),
    TraitOffer(StreamEventEnvelope<OrderEventPayload>),
    ItemMetadataUpdated(StreamEventEnvelope<MetadataEventPayload>),
    #[serde(other)]
    Other,
}

impl StreamEvent {
    /// Wire name of the event kind
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ItemListed(_) => "item_listed",
            Self::ItemReceivedBid(_) => "item_received_bid",
            Self::CollectionOffer(_) => "collection_offer",
            Self::TraitOffer(_) => "trait_offer",
            Self::ItemMetadataUpdated(_) => "item_metadata_updated",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamEventEnvelope<P> {
    /// RFC 3339 send time
    pub sent_at: String,
    pub payload: P,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderEventPayload {
    pub order_hash: String,
    pub protocol_address: String,
    /// Protocol-specific order parameters and signature
    pub protocol_data: serde_json::Value,
    #[serde(default)]
    pub item: Option<Item>,
    #[serde(default)]
    pub collection: Option<CollectionRef>,
    /// Sent on offers that carry no `item`
    #[serde(default)]
    pub chain: Option<Chain>,
    #[serde(default)]
    pub trait_criteria: Option<TraitCriteria>,
}

impl OrderEventPayload {
    /// Chain the order lives on, from the item or the payload itself
    pub fn chain_name(&self) -> Option<&str> {
        self.item
            .as_ref()
            .map(|item| &item.chain)
            .or(self.chain.as_ref())
            .map(|chain| chain.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataEventPayload {
    pub item: Item,
    #[serde(default)]
    pub collection: Option<CollectionRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    /// `{chain}/{contract}/{tokenId}`
    pub nft_id: String,
    pub chain: Chain,
    #[serde(default)]
    pub metadata: ItemMetadata,
    #[serde(default)]
    pub permalink: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chain {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub animation_url: Option<String>,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub traits: Vec<ItemTrait>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemTrait {
    pub trait_type: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub display_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRef {
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitCriteria {
    pub trait_type: String,
    pub trait_name: String,
}
