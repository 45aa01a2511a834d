use super::traits::{
    ActivityEvent, ActivitySink, BidEventsSink, MetadataSink, WebsocketEvent, WebsocketRouter,
};
use async_trait::async_trait;
use indexer_core::types::{now_millis, BidEventEntry, TokenMetadata};
use indexer_core::{IndexerError, Result};
use indexer_redis::channels::{activity_channel, metadata_channel, websocket_channel, BID_EVENTS_LIST};
use indexer_redis::messages::{ActivityMessage, WebsocketOrderMessage};
use indexer_redis::{RedisConnection, RedisPublisher};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Notification sinks backed by the Redis stream publisher and the bid-events list
pub struct RedisSink {
    publisher: Arc<RedisPublisher>,
    connection: Arc<RedisConnection>,
}

impl RedisSink {
    pub fn new(publisher: Arc<RedisPublisher>, connection: Arc<RedisConnection>) -> Self {
        Self {
            publisher,
            connection,
        }
    }
}

#[async_trait]
impl ActivitySink for RedisSink {
    async fn add_activities(&self, events: Vec<ActivityEvent>) -> Result<()> {
        for event in events {
            let msg = ActivityMessage {
                kind: event.kind.as_str().to_string(),
                order_id: event.order_id,
                tx_hash: event.trigger.tx_hash,
                log_index: event.trigger.log_index,
                batch_index: event.trigger.batch_index,
                block_hash: event.trigger.block_hash,
                timestamp: now_millis(),
            };

            let started = Instant::now();
            self.publisher
                .publish_durable(activity_channel(event.kind.as_str()), &msg)
                .await?;
            indexer_metrics::histograms::redis_publish_duration(started.elapsed());
            indexer_metrics::counters::activities_published(event.kind.as_str());
        }
        Ok(())
    }
}

#[async_trait]
impl WebsocketRouter for RedisSink {
    async fn route(&self, event: WebsocketEvent) -> Result<()> {
        let msg = WebsocketOrderMessage {
            event: event.kind.as_str().to_string(),
            trigger: event.trigger.as_str().to_string(),
            order_id: event.order_id,
            timestamp: now_millis(),
        };

        self.publisher
            .publish(websocket_channel(event.kind.as_str()), &msg)
            .await?;
        indexer_metrics::counters::websocket_events_published(event.kind.as_str());
        Ok(())
    }
}

#[async_trait]
impl BidEventsSink for RedisSink {
    async fn add_bid_events(&self, entries: Vec<BidEventEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let encoded = entries
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut conn = self.connection.get_connection();
        redis::cmd("RPUSH")
            .arg(BID_EVENTS_LIST)
            .arg(&encoded)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| IndexerError::CoordinationUnavailable(e.to_string()))?;

        debug!(count = encoded.len(), "Queued bid events");
        Ok(())
    }
}

#[async_trait]
impl MetadataSink for RedisSink {
    async fn write_metadata(&self, records: Vec<TokenMetadata>) -> Result<()> {
        for record in records {
            self.publisher.publish(metadata_channel(), &record).await?;
        }
        Ok(())
    }
}
