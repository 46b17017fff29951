pub mod callback;
pub mod channel;
pub mod connection;
pub mod consumer;
pub mod gateway;
pub mod handler;
pub mod publisher;

#[cfg(test)]
pub(crate) mod testing;

pub use callback::ConsumerCallback;
pub use channel::{BrokerChannel, ChannelError, LapinChannel};
pub use connection::{
    BrokerConnection, ConnectionError, ConnectionFactory, LapinConnectionFactory,
    RabbitMqConnection,
};
pub use consumer::{Consumer, QueueNames};
pub use gateway::{MessageQueue, MessagingError, CLOUDAMQP_URL};
pub use handler::MessageHandler;
pub use publisher::{DefaultPublisher, Publisher};
