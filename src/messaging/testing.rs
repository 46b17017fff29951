//! In-memory broker doubles for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::callback::ConsumerCallback;
use super::channel::{BrokerChannel, ChannelError};
use super::connection::{BrokerConnection, ConnectionError, ConnectionFactory};
use crate::contracts::DeliveryError;

#[derive(Debug, Clone)]
pub(crate) struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}

struct Subscription {
    queue: String,
    auto_ack: bool,
    tag: String,
    consumer: Arc<dyn ConsumerCallback>,
}

/// Records every publish and drives subscribed consumers by hand.
#[derive(Default)]
pub(crate) struct RecordingChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<Subscription>>,
    fail_publish: AtomicBool,
    fail_consume: AtomicBool,
    closed: AtomicBool,
    next_tag: AtomicUsize,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_publish(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    pub fn fail_consume(&self) {
        self.fail_consume.store(true, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// `(queue, auto_ack, tag)` for every live subscription.
    pub fn subscriptions(&self) -> Vec<(String, bool, String)> {
        self.subscriptions
            .lock()
            .iter()
            .map(|s| (s.queue.clone(), s.auto_ack, s.tag.clone()))
            .collect()
    }

    pub async fn deliver(&self, consumer_tag: &str, body: &[u8]) -> Result<(), DeliveryError> {
        let consumer = self
            .find(consumer_tag)
            .unwrap_or_else(|| panic!("no subscription for {consumer_tag}"));
        consumer.handle_delivery(consumer_tag, body).await
    }

    /// Simulates the broker cancelling a subscription.
    pub fn broker_cancel(&self, consumer_tag: &str) {
        if let Some(consumer) = self.remove(consumer_tag) {
            consumer.handle_cancel(consumer_tag);
        }
    }

    fn find(&self, consumer_tag: &str) -> Option<Arc<dyn ConsumerCallback>> {
        self.subscriptions
            .lock()
            .iter()
            .find(|s| s.tag == consumer_tag)
            .map(|s| s.consumer.clone())
    }

    fn remove(&self, consumer_tag: &str) -> Option<Arc<dyn ConsumerCallback>> {
        let mut subscriptions = self.subscriptions.lock();
        let index = subscriptions.iter().position(|s| s.tag == consumer_tag)?;
        Some(subscriptions.remove(index).consumer)
    }
}

#[async_trait]
impl BrokerChannel for RecordingChannel {
    fn id(&self) -> u16 {
        1
    }

    async fn basic_consume(
        &self,
        queue: &str,
        auto_ack: bool,
        consumer_tag: &str,
        consumer: Arc<dyn ConsumerCallback>,
    ) -> Result<String, ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        if self.fail_consume.load(Ordering::SeqCst) {
            return Err(ChannelError::ConsumeFailed(format!(
                "NOT_FOUND - no queue '{queue}'"
            )));
        }

        let tag = if consumer_tag.is_empty() {
            format!("amq.ctag-{}", self.next_tag.fetch_add(1, Ordering::SeqCst))
        } else {
            consumer_tag.to_string()
        };

        self.subscriptions.lock().push(Subscription {
            queue: queue.to_string(),
            auto_ack,
            tag: tag.clone(),
            consumer: consumer.clone(),
        });
        consumer.handle_consume_ok(&tag);

        Ok(tag)
    }

    async fn basic_cancel(&self, consumer_tag: &str) -> Result<(), ChannelError> {
        if let Some(consumer) = self.remove(consumer_tag) {
            consumer.handle_cancel_ok(consumer_tag);
        }
        Ok(())
    }

    async fn basic_recover(&self) -> Result<(), ChannelError> {
        let consumers: Vec<_> = self
            .subscriptions
            .lock()
            .iter()
            .map(|s| (s.tag.clone(), s.consumer.clone()))
            .collect();
        for (tag, consumer) in consumers {
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
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ChannelError::PublishFailed("connection reset".to_string()));
        }

        self.published.lock().push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        let subscriptions: Vec<_> = self.subscriptions.lock().drain(..).collect();
        for subscription in subscriptions {
            subscription
                .consumer
                .handle_shutdown_signal(&subscription.tag, "channel closed by application");
        }
        Ok(())
    }
}

pub(crate) struct StubConnectionFactory {
    channel: Arc<RecordingChannel>,
    fail_connect: bool,
    fail_channel: bool,
    uris: Mutex<Vec<String>>,
}

impl StubConnectionFactory {
    pub fn new(channel: Arc<RecordingChannel>) -> Self {
        Self {
            channel,
            fail_connect: false,
            fail_channel: false,
            uris: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing_connections(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn refusing_channels(mut self) -> Self {
        self.fail_channel = true;
        self
    }

    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().clone()
    }
}

#[async_trait]
impl ConnectionFactory for StubConnectionFactory {
    async fn new_connection(&self, uri: &str) -> Result<Box<dyn BrokerConnection>, ConnectionError> {
        self.uris.lock().push(uri.to_string());
        if self.fail_connect {
            return Err(ConnectionError::ConnectionFailed("connection refused".to_string()));
        }
        Ok(Box::new(StubConnection {
            channel: self.channel.clone(),
            fail_channel: self.fail_channel,
        }))
    }
}

struct StubConnection {
    channel: Arc<RecordingChannel>,
    fail_channel: bool,
}

#[async_trait]
impl BrokerConnection for StubConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, ChannelError> {
        if self.fail_channel {
            return Err(ChannelError::CreationFailed("channel_max reached".to_string()));
        }
        Ok(self.channel.clone())
    }

    fn is_connected(&self) -> bool {
        true
    }
}
