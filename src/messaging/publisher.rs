use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::channel::BrokerChannel;
use crate::contracts::{
    codec, Context, EncodeTransportError, Message, OrizuruPublisherError,
};

/// Sends typed messages to a destination queue.
#[async_trait]
pub trait Publisher<M: Message>: Send + Sync {
    fn queue_name(&self) -> &str;

    /// Encodes `message` and sends it, returning the bytes that were sent.
    async fn publish(
        &self,
        context: &Context<'_>,
        message: M,
    ) -> Result<Vec<u8>, OrizuruPublisherError>;
}

/// Publishes through the default exchange, routed by queue name.
pub struct DefaultPublisher {
    channel: Arc<dyn BrokerChannel>,
    queue_name: String,
}

impl DefaultPublisher {
    pub fn new(channel: Arc<dyn BrokerChannel>, queue_name: impl Into<String>) -> Self {
        Self {
            channel,
            queue_name: queue_name.into(),
        }
    }
}

#[async_trait]
impl<M: Message> Publisher<M> for DefaultPublisher {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn publish(
        &self,
        context: &Context<'_>,
        message: M,
    ) -> Result<Vec<u8>, OrizuruPublisherError> {
        let schema = message.schema();
        let body = codec::encode(schema, &message).map_err(|e| {
            error!(error = %e, schema = %schema, queue = %self.queue_name, "Failed to encode message");
            OrizuruPublisherError::Encode(EncodeTransportError::new(schema.name(), e))
        })?;

        self.channel
            .basic_publish("", &self.queue_name, &body)
            .await
            .map_err(OrizuruPublisherError::Send)?;

        debug!(
            queue = %self.queue_name,
            schema = %schema,
            input_schema = %context.schema(),
            payload_size = body.len(),
            "Message published"
        );

        Ok(body)
    }
}
