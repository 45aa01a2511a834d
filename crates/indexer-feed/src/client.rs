//! Phoenix-channel websocket client for the marketplace stream

use crate::{FeedError, Result};
use futures_util::{SinkExt, StreamExt};
use indexer_core::events::StreamEvent;
use indexer_core::FeedConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const TOPIC: &str = "collection:*";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    reference: Option<serde_json::Value>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload: serde_json::json!({}),
            reference: Some(serde_json::Value::from(reference.to_string())),
        }
    }

    fn join(topic: &str, reference: u64) -> Self {
        Self::new(topic, "phx_join", reference)
    }

    fn heartbeat(reference: u64) -> Self {
        Self::new("phoenix", "heartbeat", reference)
    }

    fn into_message(self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(&self)?))
    }
}

/// Decode one text frame. Control replies, unparseable frames and event kinds
/// the ingestor does not handle yield `None`.
fn parse_frame(text: &str) -> Option<StreamEvent> {
    let message: PhoenixMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Skipping unparseable feed frame");
            return None;
        }
    };

    if message.event.starts_with("phx_") {
        let status = message.payload.get("status").and_then(|s| s.as_str());
        match status {
            Some("ok") | None => debug!(event = %message.event, topic = %message.topic, "Channel reply"),
            Some(other) => warn!(event = %message.event, status = %other, "Channel replied with error"),
        }
        return None;
    }

    match serde_json::from_value::<StreamEvent>(message.payload) {
        Ok(StreamEvent::Other) => {
            debug!(event = %message.event, "Ignoring unhandled feed event");
            None
        }
        Ok(event) => Some(event),
        Err(e) => {
            warn!(event = %message.event, error = %e, "Skipping malformed feed event");
            indexer_metrics::counters::feed_events_dropped("malformed");
            None
        }
    }
}

/// Long-lived subscription that forwards decoded events and reconnects on failure
pub struct StreamClient {
    url: String,
    api_key: String,
}

impl StreamClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| FeedError::Config("OPENSEA_API_KEY must be set".to_string()))?;

        Ok(Self {
            url: config.stream_url.clone(),
            api_key,
        })
    }

    /// Run until `shutdown` fires or the event receiver is dropped
    pub async fn run(self, events: mpsc::Sender<StreamEvent>, mut shutdown: broadcast::Receiver<()>) {
        let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                result = self.connect_and_stream(&events) => {
                    indexer_metrics::gauges::set_feed_connected(false);
                    match result {
                        Ok(()) if events.is_closed() => break,
                        Ok(()) => {
                            info!("Feed connection closed");
                            reconnect_delay = INITIAL_RECONNECT_DELAY;
                        }
                        Err(e) => {
                            error!(error = %e, "Feed connection failed");
                        }
                    }
                }
            }

            warn!(delay_secs = reconnect_delay.as_secs(), "Reconnecting to feed");
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(reconnect_delay) => {}
            }
            reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
        }

        indexer_metrics::gauges::set_feed_connected(false);
        info!("Feed client stopped");
    }

    async fn connect_and_stream(&self, events: &mpsc::Sender<StreamEvent>) -> Result<()> {
        info!(url = %self.url, "Connecting to feed");
        let request = format!("{}?token={}", self.url, self.api_key);
        let (stream, _) = connect_async(request.as_str()).await?;
        let (mut write, mut read) = stream.split();

        let mut reference = 1u64;
        write.send(PhoenixMessage::join(TOPIC, reference).into_message()?).await?;
        indexer_metrics::gauges::set_feed_connected(true);
        info!(topic = TOPIC, "Joined feed channel");

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    reference += 1;
                    write.send(PhoenixMessage::heartbeat(reference).into_message()?).await?;
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_frame(&text) {
                            if events.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "Feed closed the connection");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                },
            }
        }
    }
}
