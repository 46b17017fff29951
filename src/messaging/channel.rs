use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{options::*, types::FieldTable, BasicProperties, Channel};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::callback::ConsumerCallback;
use super::connection::RabbitMqConnection;
use crate::contracts::DeliveryError;

/// Channel operations the transport needs from the broker client.
///
/// Implementations report subscription lifecycle events back through the
/// [`ConsumerCallback`] handed to [`basic_consume`](BrokerChannel::basic_consume).
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    fn id(&self) -> u16;

    /// Subscribes `consumer` to `queue` and returns the broker-assigned tag.
    /// An empty `consumer_tag` lets the broker pick one.
    async fn basic_consume(
        &self,
        queue: &str,
        auto_ack: bool,
        consumer_tag: &str,
        consumer: Arc<dyn ConsumerCallback>,
    ) -> Result<String, ChannelError>;

    async fn basic_cancel(&self, consumer_tag: &str) -> Result<(), ChannelError>;

    async fn basic_recover(&self) -> Result<(), ChannelError>;

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ChannelError>;

    async fn close(&self) -> Result<(), ChannelError>;
}

type ConsumerRegistry = Arc<Mutex<HashMap<String, Weak<dyn ConsumerCallback>>>>;

/// [`BrokerChannel`] backed by a `lapin` channel.
///
/// Owns the connection it was opened on, so the connection lives as long as
/// the channel does and is closed together with it.
pub struct LapinChannel {
    channel: Channel,
    connection: RabbitMqConnection,
    consumers: ConsumerRegistry,
}

impl LapinChannel {
    pub async fn open(connection: RabbitMqConnection) -> Result<Self, ChannelError> {
        info!("Creating RabbitMQ channel");

        let channel = connection
            .get_connection()
            .create_channel()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to create RabbitMQ channel");
                ChannelError::CreationFailed(e.to_string())
            })?;

        info!(channel_id = channel.id(), "Channel created successfully");

        Ok(Self {
            channel,
            connection,
            consumers: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn live_consumers(&self) -> Vec<(String, Arc<dyn ConsumerCallback>)> {
        self.consumers
            .lock()
            .iter()
            .filter_map(|(tag, consumer)| consumer.upgrade().map(|c| (tag.clone(), c)))
            .collect()
    }
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    fn id(&self) -> u16 {
        self.channel.id()
    }

    async fn basic_consume(
        &self,
        queue: &str,
        auto_ack: bool,
        consumer_tag: &str,
        consumer: Arc<dyn ConsumerCallback>,
    ) -> Result<String, ChannelError> {
        info!(
            queue,
            consumer_tag,
            auto_ack,
            channel_id = self.id(),
            "Starting RabbitMQ consumer"
        );

        let stream = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: auto_ack,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                error!(error = %e, queue, "Failed to start consumer");
                ChannelError::ConsumeFailed(e.to_string())
            })?;

        let tag = stream.tag().as_str().to_string();
        self.consumers
            .lock()
            .insert(tag.clone(), Arc::downgrade(&consumer));
        consumer.handle_consume_ok(&tag);

        info!(queue, consumer_tag = %tag, "Consumer started successfully");

        tokio::spawn(dispatch(stream, tag.clone(), consumer, self.consumers.clone()));

        Ok(tag)
    }

    async fn basic_cancel(&self, consumer_tag: &str) -> Result<(), ChannelError> {
        info!(consumer_tag, "Cancelling consumer");

        let consumer = cancel_unregistered(
            &self.consumers,
            consumer_tag,
            self.channel
                .basic_cancel(consumer_tag, BasicCancelOptions::default()),
        )
        .await
        .map_err(|e| {
            error!(error = %e, consumer_tag, "Failed to cancel consumer");
            ChannelError::CancelFailed(e.to_string())
        })?;

        if let Some(consumer) = consumer {
            consumer.handle_cancel_ok(consumer_tag);
        }

        Ok(())
    }

    async fn basic_recover(&self) -> Result<(), ChannelError> {
        info!(channel_id = self.id(), "Recovering unacknowledged messages");

        self.channel
            .basic_recover(BasicRecoverOptions { requeue: true })
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to recover channel");
                ChannelError::RecoverFailed(e.to_string())
            })?;

        for (tag, consumer) in self.live_consumers() {
            consumer.handle_recover_ok(&tag);
        }

        Ok(())
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ChannelError> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| {
                error!(error = %e, routing_key, "Failed to publish message");
                ChannelError::PublishFailed(e.to_string())
            })?
            .await
            .map_err(|e| {
                error!(error = %e, routing_key, "Publish was not confirmed");
                ChannelError::PublishFailed(e.to_string())
            })?;

        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let channel_id = self.id();
        info!(channel_id, "Closing RabbitMQ channel");

        let result = self
            .channel
            .close(200, "Normal shutdown")
            .await
            .map_err(|e| {
                error!(error = %e, channel_id, "Failed to close channel gracefully");
                ChannelError::CloseFailed(e.to_string())
            });

        let consumers = self.live_consumers();
        self.consumers.lock().clear();
        for (tag, consumer) in consumers {
            consumer.handle_shutdown_signal(&tag, "channel closed by application");
        }

        if let Err(e) = self.connection.shutdown().await {
            warn!(error = %e, channel_id, "Connection did not shut down cleanly");
        }

        result?;
        info!(channel_id, "Channel closed successfully");
        Ok(())
    }
}

async fn dispatch(
    mut stream: lapin::Consumer,
    tag: String,
    consumer: Arc<dyn ConsumerCallback>,
    registry: ConsumerRegistry,
) {
    while let Some(delivery) = stream.next().await {
        match delivery {
            Ok(delivery) => {
                if let Err(e) = consumer.handle_delivery(&tag, &delivery.data).await {
                    error!(
                        consumer_tag = %tag,
                        delivery_tag = delivery.delivery_tag,
                        stage = e.cause().stage(),
                        error = %cause_chain(&e),
                        "Delivery failed"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, consumer_tag = %tag, "Error receiving message from RabbitMQ");
                let registered = registry.lock().remove(&tag).is_some();
                if registered {
                    consumer.handle_shutdown_signal(&tag, &e.to_string());
                }
                return;
            }
        }
    }

    // Client-side cancel and close unregister first; anything else is the broker.
    let registered = registry.lock().remove(&tag).is_some();
    if registered {
        warn!(consumer_tag = %tag, "Consumer stream ended");
        consumer.handle_cancel(&tag);
    }
}

/// Runs a client-side cancel with the consumer already unregistered, so the
/// stream closing under it is not taken for a broker cancel. The registration
/// is restored if the cancel fails.
async fn cancel_unregistered<F, E>(
    registry: &ConsumerRegistry,
    tag: &str,
    cancel: F,
) -> Result<Option<Arc<dyn ConsumerCallback>>, E>
where
    F: std::future::Future<Output = Result<(), E>>,
{
    let consumer = registry.lock().remove(tag);

    if let Err(e) = cancel.await {
        if let Some(consumer) = consumer {
            registry.lock().insert(tag.to_string(), consumer);
        }
        return Err(e);
    }

    Ok(consumer.and_then(|c| c.upgrade()))
}

fn cause_chain(err: &DeliveryError) -> String {
    let mut chain = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to create channel: {0}")]
    CreationFailed(String),

    #[error("Failed to start consumer: {0}")]
    ConsumeFailed(String),

    #[error("Failed to cancel consumer: {0}")]
    CancelFailed(String),

    #[error("Failed to recover channel: {0}")]
    RecoverFailed(String),

    #[error("Failed to publish message: {0}")]
    PublishFailed(String),

    #[error("Failed to close channel: {0}")]
    CloseFailed(String),

    #[error("Channel is closed")]
    Closed,
}
