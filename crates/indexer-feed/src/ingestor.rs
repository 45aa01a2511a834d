//! Turns raw feed events into order intake and metadata writes.
//!
//! Every event is deduplicated through the coordinator before any work is
//! done, so a redelivered event inside the dedup window is a no-op. Listings
//! are submitted one at a time; bids and offers are buffered and submitted in
//! bulk from a detached task so the event loop never waits on the queue.

use crate::batch::BidEventsBatch;
use crate::decoder::{DecodeFailure, ProtocolTable};
use crate::hash::{metadata_event_hash, order_event_hash};
use crate::intake::{OrderCriteria, OrderIntake, OrderIntakeSink};
use chrono::{DateTime, Utc};
use indexer_core::events::{
    MetadataEventPayload, OrderEventPayload, StreamEvent, StreamEventEnvelope,
};
use indexer_core::types::{TokenAttribute, TokenMetadata};
use indexer_core::{FeedConfig, Result};
use indexer_metrics::{counters, gauges, histograms};
use indexer_processor::sinks::MetadataSink;
use indexer_redis::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const MIN_FLUSH_TICK: Duration = Duration::from_millis(10);

pub struct FeedIngestor {
    chain_name: String,
    protocols: ProtocolTable,
    coordinator: Arc<dyn Coordinator>,
    intake: Arc<dyn OrderIntakeSink>,
    metadata: Arc<dyn MetadataSink>,
    dedup_ttl_secs: u64,
    bid_max_age: Duration,
    bids: BidEventsBatch<OrderIntake>,
    flushes: JoinSet<()>,
}

impl FeedIngestor {
    pub fn new(
        config: &FeedConfig,
        chain_name: impl Into<String>,
        protocols: ProtocolTable,
        coordinator: Arc<dyn Coordinator>,
        intake: Arc<dyn OrderIntakeSink>,
        metadata: Arc<dyn MetadataSink>,
    ) -> Self {
        let bid_max_age = Duration::from_millis(config.bid_batch_max_age_ms);
        Self {
            chain_name: chain_name.into(),
            protocols,
            coordinator,
            intake,
            metadata,
            dedup_ttl_secs: config.dedup_ttl_secs,
            bid_max_age,
            bids: BidEventsBatch::new(config.bid_batch_size, bid_max_age),
            flushes: JoinSet::new(),
        }
    }

    /// Consume events until the channel closes or `shutdown` fires, then
    /// flush buffered bids and wait for every in-flight submission
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<StreamEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut flush_tick = tokio::time::interval((self.bid_max_age / 2).max(MIN_FLUSH_TICK));
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(chain = %self.chain_name, "Feed ingestor started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Feed ingestor received shutdown signal");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            error!(error = %e, "Failed to handle feed event");
                            counters::errors(1, "feed_event");
                        }
                    }
                    None => break,
                },
                _ = flush_tick.tick() => {
                    if let Some(batch) = self.bids.take_if_stale() {
                        self.spawn_flush(batch);
                    }
                    self.reap_flushes();
                }
            }
        }

        let remaining = self.bids.drain();
        if !remaining.is_empty() {
            self.spawn_flush(remaining);
        }
        self.wait_for_flushes().await;
        info!("Feed ingestor stopped");
    }

    pub async fn handle_event(&mut self, event: StreamEvent) -> Result<()> {
        let event_type = event.event_type();
        counters::feed_events_received(event_type);

        match event {
            StreamEvent::ItemListed(envelope) => {
                self.handle_order(event_type, envelope, false, None).await
            }
            StreamEvent::ItemReceivedBid(envelope) => {
                self.handle_order(event_type, envelope, true, None).await
            }
            StreamEvent::CollectionOffer(envelope) => {
                let criteria = envelope
                    .payload
                    .collection
                    .as_ref()
                    .map(|collection| OrderCriteria::Collection {
                        slug: collection.slug.clone(),
                    });
                self.handle_order(event_type, envelope, true, criteria).await
            }
            StreamEvent::TraitOffer(envelope) => {
                let criteria = match (&envelope.payload.collection, &envelope.payload.trait_criteria) {
                    (Some(collection), Some(criteria)) => Some(OrderCriteria::Attribute {
                        slug: collection.slug.clone(),
                        trait_type: criteria.trait_type.clone(),
                        trait_name: criteria.trait_name.clone(),
                    }),
                    _ => None,
                };
                self.handle_order(event_type, envelope, true, criteria).await
            }
            StreamEvent::ItemMetadataUpdated(envelope) => {
                self.handle_metadata(event_type, envelope).await
            }
            StreamEvent::Other => Ok(()),
        }
    }

    /// Wait for every detached bid submission
    pub async fn wait_for_flushes(&mut self) {
        while let Some(result) = self.flushes.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Bid flush task failed");
            }
        }
    }

    async fn handle_order(
        &mut self,
        event_type: &str,
        envelope: StreamEventEnvelope<OrderEventPayload>,
        is_bid: bool,
        criteria: Option<OrderCriteria>,
    ) -> Result<()> {
        let StreamEventEnvelope { sent_at, payload } = envelope;

        // Offers without any chain field are kept; the order-saving service
        // rejects orders whose contracts are not on this chain.
        if let Some(chain) = payload.chain_name() {
            if chain != self.chain_name {
                counters::feed_events_dropped("chain");
                return Ok(());
            }
        }

        let event_hash = order_event_hash(event_type, &payload.order_hash);
        if !self
            .coordinator
            .mark_if_new_event(&event_hash, self.dedup_ttl_secs)
            .await?
        {
            counters::feed_events_deduplicated();
            debug!(event_type, order_hash = %payload.order_hash, "Duplicate feed event");
            return Ok(());
        }

        let order = match self
            .protocols
            .decode(&payload.protocol_address, &payload.protocol_data)
        {
            Ok(order) => order,
            Err(e) => {
                let reason = match e {
                    DecodeFailure::UnknownProtocol(_) => "unknown_protocol",
                    DecodeFailure::Malformed(_) => "malformed",
                };
                warn!(event_type, order_hash = %payload.order_hash, error = %e, "Dropping undecodable order");
                counters::feed_events_dropped(reason);
                return Ok(());
            }
        };

        let intake = OrderIntake {
            order_hash: payload.order_hash,
            kind: order.format.kind().to_string(),
            order,
            originated_at: parse_sent_at(&sent_at),
            external: true,
            criteria,
        };

        if is_bid {
            if let Some(batch) = self.bids.push(intake) {
                self.spawn_flush(batch);
            }
            gauges::set_bid_batch_size(self.bids.len());
        } else {
            self.intake.submit(vec![intake]).await?;
            counters::orders_submitted(1, "listing");
        }

        Ok(())
    }

    async fn handle_metadata(
        &mut self,
        event_type: &str,
        envelope: StreamEventEnvelope<MetadataEventPayload>,
    ) -> Result<()> {
        let StreamEventEnvelope { sent_at, payload } = envelope;
        let MetadataEventPayload { item, collection } = payload;

        if item.chain.name != self.chain_name {
            counters::feed_events_dropped("chain");
            return Ok(());
        }

        let event_hash = metadata_event_hash(event_type, &item.nft_id, &sent_at);
        if !self
            .coordinator
            .mark_if_new_event(&event_hash, self.dedup_ttl_secs)
            .await?
        {
            counters::feed_events_deduplicated();
            return Ok(());
        }

        let Some((contract, token_id)) = parse_nft_id(&item.nft_id) else {
            warn!(nft_id = %item.nft_id, "Dropping metadata update with malformed nft id");
            counters::feed_events_dropped("malformed");
            return Ok(());
        };

        let metadata = item.metadata;
        let record = TokenMetadata {
            contract,
            token_id,
            collection: collection.map(|c| c.slug),
            name: metadata.name,
            description: metadata.description,
            image_url: metadata.image_url,
            animation_url: metadata.animation_url,
            metadata_url: metadata.metadata_url,
            background_color: metadata.background_color,
            permalink: item.permalink,
            attributes: metadata
                .traits
                .into_iter()
                .map(|t| TokenAttribute {
                    key: t.trait_type,
                    value: match t.value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    },
                    display_type: t.display_type,
                })
                .collect(),
            updated_at: parse_sent_at(&sent_at),
        };

        self.metadata.write_metadata(vec![record]).await?;
        counters::metadata_updates();
        Ok(())
    }

    fn spawn_flush(&mut self, batch: Vec<OrderIntake>) {
        gauges::set_bid_batch_size(self.bids.len());
        let intake = self.intake.clone();
        self.flushes.spawn(async move {
            let count = batch.len();
            let started = Instant::now();
            match intake.submit(batch).await {
                Ok(()) => {
                    histograms::bid_batch_flush_duration(started.elapsed());
                    counters::orders_submitted(count as u64, "bid");
                    debug!(count, "Flushed bid batch");
                }
                Err(e) => {
                    error!(count, error = %e, "Failed to submit bid batch");
                    counters::errors(count as u64, "bid_flush");
                }
            }
        });
    }

    fn reap_flushes(&mut self) {
        while let Some(result) = self.flushes.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Bid flush task failed");
            }
        }
    }
}

/// `{chain}/{contract}/{tokenId}` into a lowercased contract and the token id
fn parse_nft_id(nft_id: &str) -> Option<(String, String)> {
    let mut parts = nft_id.split('/');
    let (_chain, contract, token_id) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || contract.is_empty() || token_id.is_empty() {
        return None;
    }
    Some((contract.to_lowercase(), token_id.to_string()))
}

fn parse_sent_at(sent_at: &str) -> i64 {
    match DateTime::parse_from_rfc3339(sent_at) {
        Ok(at) => at.timestamp_millis(),
        Err(e) => {
            warn!(sent_at, error = %e, "Unparseable feed timestamp, using receive time");
            Utc::now().timestamp_millis()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::tests::protocol_data;
    use async_trait::async_trait;
    use indexer_redis::MemoryCoordinator;
    use parking_lot::Mutex;
    use serde_json::json;

    const SEAPORT_V1_6: &str = "0x0000000000000068F116a894984e2DB1123eB395";

    #[derive(Default)]
    struct Recorder {
        submissions: Mutex<Vec<Vec<OrderIntake>>>,
        metadata: Mutex<Vec<TokenMetadata>>,
    }

    #[async_trait]
    impl OrderIntakeSink for Recorder {
        async fn submit(&self, orders: Vec<OrderIntake>) -> Result<()> {
            self.submissions.lock().push(orders);
            Ok(())
        }
    }

    #[async_trait]
    impl MetadataSink for Recorder {
        async fn write_metadata(&self, records: Vec<TokenMetadata>) -> Result<()> {
            self.metadata.lock().extend(records);
            Ok(())
        }
    }

    fn config(bid_batch_size: usize) -> FeedConfig {
        FeedConfig {
            enabled: true,
            api_key: Some("key".to_string()),
            stream_url: "wss://stream.invalid/socket/websocket".to_string(),
            dedup_ttl_secs: 300,
            bid_batch_size,
            bid_batch_max_age_ms: 60_000,
        }
    }

    fn ingestor(bid_batch_size: usize) -> (FeedIngestor, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let ingestor = FeedIngestor::new(
            &config(bid_batch_size),
            "ethereum",
            ProtocolTable::for_chain(1),
            Arc::new(MemoryCoordinator::new()),
            recorder.clone(),
            recorder.clone(),
        );
        (ingestor, recorder)
    }

    fn order_event(event_type: &str, order_hash: &str, extra: serde_json::Value) -> StreamEvent {
        let mut payload = json!({
            "order_hash": order_hash,
            "protocol_address": SEAPORT_V1_6,
            "protocol_data": protocol_data(),
            "item": {"nft_id": "ethereum/0x2222222222222222222222222222222222222222/123", "chain": {"name": "ethereum"}},
            "collection": {"slug": "cool-cats"}
        });
        if let (Some(target), Some(extra)) = (payload.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(json!({
            "event_type": event_type,
            "sent_at": "2024-03-01T12:00:00+00:00",
            "payload": payload
        }))
        .unwrap()
    }

    fn metadata_event(chain: &str, nft_id: &str) -> StreamEvent {
        serde_json::from_value(json!({
            "event_type": "item_metadata_updated",
            "sent_at": "2024-03-01T12:00:00+00:00",
            "payload": {
                "item": {
                    "nft_id": nft_id,
                    "chain": {"name": chain},
                    "permalink": "https://opensea.io/assets/ethereum/0xabc/7",
                    "metadata": {
                        "name": "Cat #7",
                        "traits": [
                            {"trait_type": "Fur", "value": "Gold"},
                            {"trait_type": "Level", "value": 3, "display_type": "number"}
                        ]
                    }
                },
                "collection": {"slug": "cool-cats"}
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_listing_submitted_once() {
        let (mut ingestor, recorder) = ingestor(1);

        ingestor
            .handle_event(order_event("item_listed", "0xaa", json!({})))
            .await
            .unwrap();
        ingestor
            .handle_event(order_event("item_listed", "0xaa", json!({})))
            .await
            .unwrap();

        let submissions = recorder.submissions.lock();
        assert_eq!(submissions.len(), 1);
        let intake = &submissions[0][0];
        assert_eq!(intake.kind, "seaport-v1.6");
        assert!(intake.external);
        assert_eq!(intake.originated_at, 1_709_294_400_000);
        assert!(intake.criteria.is_none());
    }

    #[tokio::test]
    async fn test_unknown_protocol_is_dropped() {
        let (mut ingestor, recorder) = ingestor(1);

        let event = order_event(
            "item_listed",
            "0xaa",
            json!({"protocol_address": "0x00000000006c3852cbef3e08e8df289169ede581"}),
        );
        ingestor.handle_event(event).await.unwrap();

        assert!(recorder.submissions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_other_chain_listing_is_dropped() {
        let (mut ingestor, recorder) = ingestor(1);

        let event = order_event(
            "item_listed",
            "0xaa",
            json!({"item": {"nft_id": "matic/0xabc/1", "chain": {"name": "matic"}}}),
        );
        ingestor.handle_event(event).await.unwrap();

        assert!(recorder.submissions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_other_chain_collection_offer_is_dropped() {
        let (mut ingestor, recorder) = ingestor(1);

        let event = order_event(
            "collection_offer",
            "0xc1",
            json!({"item": null, "chain": {"name": "matic"}}),
        );
        ingestor.handle_event(event).await.unwrap();
        ingestor.wait_for_flushes().await;
        assert!(recorder.submissions.lock().is_empty());

        let event = order_event(
            "collection_offer",
            "0xc2",
            json!({"item": null, "chain": {"name": "ethereum"}}),
        );
        ingestor.handle_event(event).await.unwrap();
        ingestor.wait_for_flushes().await;
        assert_eq!(recorder.submissions.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_collection_offer_without_chain_is_kept() {
        let (mut ingestor, recorder) = ingestor(1);

        let event = order_event("collection_offer", "0xc3", json!({"item": null}));
        ingestor.handle_event(event).await.unwrap();
        ingestor.wait_for_flushes().await;

        let submissions = recorder.submissions.lock();
        assert_eq!(submissions.len(), 1);
        assert_eq!(
            submissions[0][0].criteria,
            Some(OrderCriteria::Collection { slug: "cool-cats".to_string() })
        );
    }

    #[tokio::test]
    async fn test_bids_flush_at_threshold() {
        let (mut ingestor, recorder) = ingestor(2);

        ingestor
            .handle_event(order_event("item_received_bid", "0xb1", json!({})))
            .await
            .unwrap();
        ingestor.wait_for_flushes().await;
        assert!(recorder.submissions.lock().is_empty());

        ingestor
            .handle_event(order_event("item_received_bid", "0xb2", json!({})))
            .await
            .unwrap();
        ingestor.wait_for_flushes().await;

        let submissions = recorder.submissions.lock();
        assert_eq!(submissions.len(), 1);
        let hashes: Vec<_> = submissions[0].iter().map(|o| o.order_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xb1", "0xb2"]);
    }

    #[tokio::test]
    async fn test_run_flushes_buffered_bids_on_exit() {
        let (ingestor, recorder) = ingestor(10);
        let (events_tx, events_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        events_tx
            .send(order_event("item_received_bid", "0xb1", json!({})))
            .await
            .unwrap();
        events_tx
            .send(order_event("collection_offer", "0xc1", json!({})))
            .await
            .unwrap();
        drop(events_tx);

        ingestor.run(events_rx, shutdown_rx).await;

        let submissions = recorder.submissions.lock();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].len(), 2);
        assert_eq!(
            submissions[0][1].criteria,
            Some(OrderCriteria::Collection { slug: "cool-cats".to_string() })
        );
    }

    #[tokio::test]
    async fn test_trait_offer_carries_attribute_criteria() {
        let (mut ingestor, recorder) = ingestor(1);

        let event = order_event(
            "trait_offer",
            "0xd1",
            json!({"trait_criteria": {"trait_type": "Fur", "trait_name": "Gold"}}),
        );
        ingestor.handle_event(event).await.unwrap();
        ingestor.wait_for_flushes().await;

        let submissions = recorder.submissions.lock();
        assert_eq!(
            submissions[0][0].criteria,
            Some(OrderCriteria::Attribute {
                slug: "cool-cats".to_string(),
                trait_type: "Fur".to_string(),
                trait_name: "Gold".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_metadata_update_filters_chain_and_normalizes() {
        let (mut ingestor, recorder) = ingestor(1);

        ingestor
            .handle_event(metadata_event("matic", "matic/0xABC/7"))
            .await
            .unwrap();
        assert!(recorder.metadata.lock().is_empty());

        ingestor
            .handle_event(metadata_event("ethereum", "ethereum/0xABC/7"))
            .await
            .unwrap();
        ingestor
            .handle_event(metadata_event("ethereum", "ethereum/0xABC/7"))
            .await
            .unwrap();

        let records = recorder.metadata.lock();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.contract, "0xabc");
        assert_eq!(record.token_id, "7");
        assert_eq!(record.collection.as_deref(), Some("cool-cats"));
        assert_eq!(record.attributes[1].value, "3");
        assert_eq!(record.attributes[1].display_type.as_deref(), Some("number"));
    }

    #[test]
    fn test_parse_nft_id() {
        assert_eq!(
            parse_nft_id("ethereum/0xAbC/42"),
            Some(("0xabc".to_string(), "42".to_string()))
        );
        assert_eq!(parse_nft_id("ethereum/0xabc"), None);
        assert_eq!(parse_nft_id("ethereum//1"), None);
        assert_eq!(parse_nft_id("a/b/c/d"), None);
    }
}
