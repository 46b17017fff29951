use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::callback::ConsumerCallback;
use super::channel::BrokerChannel;
use super::handler::MessageHandler;
use super::publisher::{DefaultPublisher, Publisher};
use crate::contracts::{
    codec, Context, DecodeTransportError, DeliveryError, Message, OrizuruError,
};
use crate::metrics::Metrics;

/// Incoming queue plus the optional queue handler results are published to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub incoming: String,
    pub outgoing: Option<String>,
}

/// Decodes deliveries, runs the handler and republishes its results.
///
/// The consumer tag is unset until the broker confirms the subscription and
/// goes back to unset on cancel, broker cancel, shutdown or recover. The
/// consumer stays usable afterwards and can be registered again.
pub struct Consumer<H: MessageHandler> {
    channel: Arc<dyn BrokerChannel>,
    queues: QueueNames,
    handler: H,
    publisher: RwLock<Option<Arc<dyn Publisher<H::Output>>>>,
    consumer_tag: RwLock<Option<String>>,
    metrics: Option<Arc<Metrics>>,
}

impl<H: MessageHandler> Consumer<H> {
    /// Builds a consumer; a [`DefaultPublisher`] is attached only when
    /// `outgoing_queue` is given.
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        incoming_queue: impl Into<String>,
        outgoing_queue: Option<String>,
        handler: H,
    ) -> Self {
        let publisher = outgoing_queue.as_ref().map(|queue| {
            Arc::new(DefaultPublisher::new(channel.clone(), queue.clone()))
                as Arc<dyn Publisher<H::Output>>
        });

        Self {
            channel,
            queues: QueueNames {
                incoming: incoming_queue.into(),
                outgoing: outgoing_queue,
            },
            handler,
            publisher: RwLock::new(publisher),
            consumer_tag: RwLock::new(None),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn channel(&self) -> &Arc<dyn BrokerChannel> {
        &self.channel
    }

    pub fn queue_names(&self) -> &QueueNames {
        &self.queues
    }

    pub fn consumer_tag(&self) -> Option<String> {
        self.consumer_tag.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.consumer_tag.read().is_some()
    }

    pub fn publisher(&self) -> Option<Arc<dyn Publisher<H::Output>>> {
        self.publisher.read().clone()
    }

    /// Replaces the publisher, independent of the outgoing queue given at
    /// construction.
    pub fn set_publisher(&self, publisher: Arc<dyn Publisher<H::Output>>) {
        *self.publisher.write() = Some(publisher);
    }

    /// Runs one decode, handle, publish cycle.
    ///
    /// Returns the published bytes when the handler produced output and a
    /// publisher is configured.
    pub async fn consume(&self, body: &[u8]) -> Result<Option<Vec<u8>>, OrizuruError> {
        let schema = H::Input::message_schema();
        let input: H::Input = codec::decode(schema, body)
            .map_err(|e| DecodeTransportError::new(schema.name(), e))?;

        let context = Context::new(schema, body);
        let Some(output) = self.handler.handle_message(&context, input).await? else {
            debug!(queue = %self.queues.incoming, "Handler produced no output");
            return Ok(None);
        };

        let Some(publisher) = self.publisher() else {
            debug!(
                queue = %self.queues.incoming,
                "No outgoing queue configured, dropping handler output"
            );
            return Ok(None);
        };

        let published = publisher.publish(&context, output).await?;
        if let Some(metrics) = &self.metrics {
            metrics
                .messages_published_total
                .with_label_values(&[publisher.queue_name()])
                .inc();
        }

        Ok(Some(published))
    }

    /// [`consume`](Self::consume) wrapped into the transport-level error.
    pub async fn deliver(&self, body: &[u8]) -> Result<Option<Vec<u8>>, DeliveryError> {
        let start = Instant::now();
        let result = self.consume(body).await;
        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(published) => {
                debug!(
                    queue = %self.queues.incoming,
                    payload_size = body.len(),
                    published = published.is_some(),
                    duration_ms = duration * 1000.0,
                    "Message processed successfully"
                );
                self.record_outcome(None, duration);
                Ok(published)
            }
            Err(cause) => {
                self.record_outcome(Some(cause.stage()), duration);
                Err(DeliveryError::new(cause))
            }
        }
    }

    fn record_outcome(&self, failed_stage: Option<&str>, duration: f64) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let queue = self.queues.incoming.as_str();

        match failed_stage {
            None => {
                metrics.messages_processed_total.with_label_values(&[queue]).inc();
                metrics
                    .message_processing_duration_seconds
                    .with_label_values(&[queue, "success"])
                    .observe(duration);
            }
            Some(stage) => {
                metrics
                    .messages_failed_total
                    .with_label_values(&[queue, stage])
                    .inc();
                metrics
                    .message_processing_duration_seconds
                    .with_label_values(&[queue, "failure"])
                    .observe(duration);
            }
        }
    }

    fn reset_registration(&self, event: &str, consumer_tag: &str) {
        let previous = self.consumer_tag.write().take();
        if previous.is_some() {
            if let Some(metrics) = &self.metrics {
                metrics.active_consumers.dec();
            }
        }
        info!(
            queue = %self.queues.incoming,
            consumer_tag,
            event,
            "Consumer registration reset"
        );
    }
}

#[async_trait]
impl<H: MessageHandler> ConsumerCallback for Consumer<H> {
    fn queue_name(&self) -> &str {
        &self.queues.incoming
    }

    fn handle_consume_ok(&self, consumer_tag: &str) {
        let previous = self.consumer_tag.write().replace(consumer_tag.to_string());
        match previous {
            Some(previous) => warn!(
                previous = %previous,
                consumer_tag,
                "Subscription confirmed while already active, replacing tag"
            ),
            None => {
                if let Some(metrics) = &self.metrics {
                    metrics.active_consumers.inc();
                }
            }
        }
        info!(queue = %self.queues.incoming, consumer_tag, "Subscription confirmed");
    }

    fn handle_cancel_ok(&self, consumer_tag: &str) {
        self.reset_registration("cancel_ok", consumer_tag);
    }

    fn handle_cancel(&self, consumer_tag: &str) {
        self.reset_registration("cancel", consumer_tag);
    }

    fn handle_shutdown_signal(&self, consumer_tag: &str, reason: &str) {
        warn!(consumer_tag, reason, "Shutdown signal received");
        self.reset_registration("shutdown", consumer_tag);
    }

    fn handle_recover_ok(&self, consumer_tag: &str) {
        self.reset_registration("recover_ok", consumer_tag);
    }

    async fn handle_delivery(&self, _consumer_tag: &str, body: &[u8]) -> Result<(), DeliveryError> {
        self.deliver(body).await.map(|_| ())
    }
}
