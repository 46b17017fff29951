use orizuru_transport_rabbitmq::contracts::{Context, Message, Schema};
use orizuru_transport_rabbitmq::messaging::{
    BrokerChannel, DefaultPublisher, LapinConnectionFactory, MessageQueue, Publisher,
};
use serde::{Deserialize, Serialize};

const PING_SCHEMA: Schema = Schema::record("Ping", &["id", "body"]);

#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    id: String,
    body: String,
}

impl Message for Ping {
    fn message_schema() -> &'static Schema {
        &PING_SCHEMA
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let queue_name = std::env::var("INCOMING_QUEUE").unwrap_or_else(|_| "input".to_string());

    println!("Connecting to RabbitMQ...");
    let queue = MessageQueue::new(LapinConnectionFactory::default());
    let channel = queue.create_channel().await?;
    let publisher = DefaultPublisher::new(channel.clone(), queue_name.clone());
    let context = Context::new(Ping::message_schema(), &[]);

    println!("Publishing pings to {}...", queue_name);

    for i in 1..=5 {
        let ping = Ping {
            id: format!("ping-{}", i),
            body: format!("hello {}", i),
        };
        publisher.publish(&context, ping).await?;

        println!("Published ping {}", i);
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
    }

    // Not valid JSON; the worker logs "Failed to consume message" and moves on.
    channel.basic_publish("", &queue_name, b"test").await?;
    println!("Published malformed payload");

    channel.close().await?;
    println!("Done!");
    Ok(())
}
