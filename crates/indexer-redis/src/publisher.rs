use crate::connection::RedisConnection;
use crate::messages::StreamMessage;
use crate::{RedisError, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Redis stream publisher with fire-and-forget batching.
///
/// In async mode every message goes through one channel and one background
/// task, so messages published from a single caller keep their order.
pub struct RedisPublisher {
    connection: Arc<RedisConnection>,
    async_sender: Option<mpsc::Sender<StreamMessage>>,
}

impl RedisPublisher {
    pub fn new(connection: Arc<RedisConnection>) -> Self {
        let async_mode = connection.config().async_mode;
        let queue_capacity = connection.config().queue_capacity;
        let batch_size = connection.config().batch_size;

        let async_sender = if async_mode {
            let (sender, receiver) = mpsc::channel(queue_capacity);
            let conn = connection.clone();

            info!(
                queue_capacity = queue_capacity,
                batch_size = batch_size,
                "Redis async publisher initialized"
            );

            tokio::spawn(Self::async_publisher_loop(conn, receiver, batch_size));

            Some(sender)
        } else {
            None
        };

        Self {
            connection,
            async_sender,
        }
    }

    /// Publish a message to a channel (goes to the stream)
    pub async fn publish<T: Serialize>(&self, channel: String, data: T) -> Result<()> {
        let message = StreamMessage::new(channel, data)?;

        if let Some(sender) = &self.async_sender {
            if sender.try_send(message).is_err() {
                warn!("Redis publish queue full, dropping message");
            }
            Ok(())
        } else {
            self.publish_sync(message).await
        }
    }

    /// Publish with a direct XADD, returning once the stream holds the message.
    /// Bypasses the async queue, so a failure reaches the caller.
    pub async fn publish_durable<T: Serialize>(&self, channel: String, data: T) -> Result<()> {
        let message = StreamMessage::new(channel, data)?;
        self.publish_sync(message).await
    }

    async fn publish_sync(&self, message: StreamMessage) -> Result<()> {
        let mut conn = self.connection.get_connection();
        let stream_key = &self.connection.config().stream_key;
        let max_len = self.connection.config().max_len;

        redis::cmd("XADD")
            .arg(stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(max_len)
            .arg("*")
            .arg("channel")
            .arg(&message.channel)
            .arg("data")
            .arg(&message.data)
            .arg("source")
            .arg(&message.source)
            .arg("timestamp")
            .arg(message.timestamp)
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| RedisError::Publish(e.to_string()))?;

        debug!(channel = %message.channel, "Published message to Redis");
        Ok(())
    }

    async fn async_publisher_loop(
        connection: Arc<RedisConnection>,
        mut receiver: mpsc::Receiver<StreamMessage>,
        batch_size: usize,
    ) {
        let stream_key = connection.config().stream_key.clone();
        let max_len = connection.config().max_len;
        let mut batch: Vec<StreamMessage> = Vec::with_capacity(batch_size);

        loop {
            batch.clear();

            match receiver.recv().await {
                Some(msg) => batch.push(msg),
                None => break,
            }

            while batch.len() < batch_size {
                match receiver.try_recv() {
                    Ok(msg) => batch.push(msg),
                    Err(_) => break,
                }
            }

            let mut conn = connection.get_connection();
            let mut pipe = redis::pipe();

            for message in &batch {
                pipe.cmd("XADD")
                    .arg(&stream_key)
                    .arg("MAXLEN")
                    .arg("~")
                    .arg(max_len)
                    .arg("*")
                    .arg("channel")
                    .arg(&message.channel)
                    .arg("data")
                    .arg(&message.data)
                    .arg("source")
                    .arg(&message.source)
                    .arg("timestamp")
                    .arg(message.timestamp)
                    .ignore();
            }

            let result: std::result::Result<(), redis::RedisError> =
                pipe.query_async(&mut conn).await;

            if let Err(e) = result {
                error!(error = %e, batch_size = batch.len(), "Failed to publish batch to Redis");
            } else {
                debug!(batch_size = batch.len(), "Published batch to Redis");
            }
        }
    }
}

impl Clone for RedisPublisher {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            async_sender: self.async_sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[tokio::test]
    async fn test_durable_publish_lands_before_returning_in_async_mode() {
        if std::env::var("REDIS_URL").is_err() {
            eprintln!("REDIS_URL not set, skipping");
            return;
        }
        let mut config = RedisConfig::from_env();
        config.async_mode = true;
        config.stream_key = format!("test:events:{}", std::process::id());
        let stream_key = config.stream_key.clone();
        let connection = Arc::new(RedisConnection::new(config).await.unwrap());
        let publisher = RedisPublisher::new(connection.clone());

        publisher
            .publish_durable("activity:newSellOrder".to_string(), &serde_json::json!({"orderId": "0x1"}))
            .await
            .unwrap();

        let mut conn = connection.get_connection();
        let entries: Vec<(String, Vec<String>)> = redis::cmd("XRANGE")
            .arg(&stream_key)
            .arg("-")
            .arg("+")
            .query_async(&mut conn)
            .await
            .unwrap();
        let _: redis::RedisResult<i64> = redis::cmd("DEL").arg(&stream_key).query_async(&mut conn).await;

        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.iter().any(|field| field == "activity:newSellOrder"));
    }
}
