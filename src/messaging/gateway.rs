//! Entry point for obtaining channels and subscribing consumers.

use std::env;
use std::sync::Arc;

use tracing::{error, info};

use super::callback::ConsumerCallback;
use super::channel::{BrokerChannel, ChannelError};
use super::connection::{ConnectionError, ConnectionFactory};

/// Environment variable holding the broker connection URI.
pub const CLOUDAMQP_URL: &str = "CLOUDAMQP_URL";

/// Creates channels and registers consumers on them.
///
/// Consumers are always registered with automatic acknowledgement: the broker
/// treats a message as handled once delivered, so a failed delivery is only
/// reported, never redelivered. Nothing here retries.
pub struct MessageQueue<F> {
    factory: F,
}

impl<F: ConnectionFactory> MessageQueue<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Resolves [`CLOUDAMQP_URL`] now, connects and opens a channel.
    pub async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, MessagingError> {
        let uri = env::var(CLOUDAMQP_URL).map_err(|_| {
            error!(variable = CLOUDAMQP_URL, "Broker URI is not configured");
            MessagingError::Connection(ConnectionError::MissingUri(CLOUDAMQP_URL))
        })?;

        let connection = self
            .factory
            .new_connection(&uri)
            .await
            .map_err(MessagingError::Connection)?;

        let channel = connection
            .create_channel()
            .await
            .map_err(MessagingError::Channel)?;

        info!(channel_id = channel.id(), "RabbitMQ channel ready");
        Ok(channel)
    }

    /// Subscribes `consumer` to its queue and returns the consumer tag.
    pub async fn register_consumer(
        &self,
        consumer_tag: &str,
        channel: &dyn BrokerChannel,
        consumer: Arc<dyn ConsumerCallback>,
    ) -> Result<String, MessagingError> {
        let queue = consumer.queue_name().to_string();

        let tag = channel
            .basic_consume(&queue, true, consumer_tag, consumer)
            .await
            .map_err(MessagingError::Consume)?;

        info!(queue = %queue, consumer_tag = %tag, "Consumer registered");
        Ok(tag)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Failed to create channel")]
    Connection(#[source] ConnectionError),

    #[error("Failed to create channel")]
    Channel(#[source] ChannelError),

    #[error("Failed to consume message")]
    Consume(#[source] ChannelError),
}
