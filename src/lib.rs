//! RabbitMQ transport for schema-typed messages.
//!
//! A [`Consumer`](messaging::Consumer) decodes each delivery into its handler's
//! input type, runs the [`MessageHandler`](messaging::MessageHandler) and
//! republishes the result through a [`Publisher`](messaging::Publisher) when an
//! outgoing queue is configured. [`MessageQueue`](messaging::MessageQueue)
//! creates channels and registers consumers with automatic acknowledgement.

pub mod config;
pub mod contracts;
pub mod messaging;
pub mod metrics;
