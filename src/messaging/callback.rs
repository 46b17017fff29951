use async_trait::async_trait;

use crate::contracts::DeliveryError;

/// Notifications a broker channel delivers to a subscribed consumer.
///
/// Lifecycle methods may be called from the broker client's tasks while a
/// delivery is in flight, so implementations keep their state behind
/// thread-safe cells.
#[async_trait]
pub trait ConsumerCallback: Send + Sync {
    /// Queue this consumer subscribes to.
    fn queue_name(&self) -> &str;

    fn handle_consume_ok(&self, consumer_tag: &str);

    fn handle_cancel_ok(&self, consumer_tag: &str);

    /// The broker cancelled the subscription, e.g. because the queue was deleted.
    fn handle_cancel(&self, consumer_tag: &str);

    fn handle_shutdown_signal(&self, consumer_tag: &str, reason: &str);

    fn handle_recover_ok(&self, consumer_tag: &str);

    /// Processes one delivered message to completion.
    ///
    /// The message is already acknowledged when this runs; an error is
    /// reported to the caller and never causes redelivery.
    async fn handle_delivery(&self, consumer_tag: &str, body: &[u8]) -> Result<(), DeliveryError>;
}
