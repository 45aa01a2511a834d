//! Marketplace push-feed message types

mod stream;

pub use stream::{
    Chain, CollectionRef, Item, ItemMetadata, ItemTrait, MetadataEventPayload,
    OrderEventPayload, StreamEvent, StreamEventEnvelope, TraitCriteria,
};
