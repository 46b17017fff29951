use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use orizuru_transport_rabbitmq::config::Config;
use orizuru_transport_rabbitmq::contracts::{Context, HandleMessageError, Message, Schema};
use orizuru_transport_rabbitmq::messaging::{
    BrokerChannel, Consumer, LapinConnectionFactory, MessageHandler, MessageQueue,
};
use orizuru_transport_rabbitmq::metrics::{server::start_metrics_server, Metrics};

const PING_SCHEMA: Schema = Schema::record("Ping", &["id", "body"]);
const PONG_SCHEMA: Schema = Schema::record("Pong", &["id", "reply", "handled_by"]);

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

#[derive(Debug, Serialize, Deserialize)]
struct Pong {
    id: String,
    reply: String,
    handled_by: String,
}

impl Message for Pong {
    fn message_schema() -> &'static Schema {
        &PONG_SCHEMA
    }
}

struct RelayHandler {
    service_name: String,
}

#[async_trait]
impl MessageHandler for RelayHandler {
    type Input = Ping;
    type Output = Pong;

    async fn handle_message(
        &self,
        context: &Context<'_>,
        input: Ping,
    ) -> Result<Option<Pong>, HandleMessageError> {
        info!(
            id = %input.id,
            schema = %context.schema(),
            payload_size = context.data_buffer().len(),
            "Handling ping"
        );

        if input.body.is_empty() {
            return Err(HandleMessageError::new(format!("ping {} has an empty body", input.id)));
        }

        Ok(Some(Pong {
            id: input.id,
            reply: input.body.to_uppercase(),
            handled_by: self.service_name.clone(),
        }))
    }
}

#[tokio::main]
async fn main() {
    setup_panic_handler();
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    setup_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        service_name = %config.service_name,
        incoming_queue = %config.incoming_queue,
        outgoing_queue = ?config.outgoing_queue,
        "Orizuru worker starting"
    );

    let metrics = match Metrics::new() {
        Ok(metrics) => metrics,
        Err(e) => {
            eprintln!("Failed to create metrics: {}", e);
            std::process::exit(1);
        }
    };

    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_clone, metrics_port).await {
            eprintln!("Metrics server error: {}", e);
        }
    });

    let queue = MessageQueue::new(LapinConnectionFactory::default());

    let channel = match queue.create_channel().await {
        Ok(ch) => ch,
        Err(e) => {
            eprintln!("Failed to create RabbitMQ channel: {:?}", e);
            std::process::exit(1);
        }
    };

    let handler = RelayHandler {
        service_name: config.service_name.clone(),
    };
    let consumer = Arc::new(
        Consumer::new(
            channel.clone(),
            config.incoming_queue.clone(),
            config.outgoing_queue.clone(),
            handler,
        )
        .with_metrics(metrics.clone()),
    );

    let consumer_tag = match queue
        .register_consumer(&config.consumer_tag, channel.as_ref(), consumer.clone())
        .await
    {
        Ok(tag) => tag,
        Err(e) => {
            eprintln!("Failed to register consumer: {:?}", e);
            std::process::exit(1);
        }
    };

    info!(consumer_tag = %consumer_tag, "Ready to relay messages");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }

    warn!("Shutdown signal received, cleaning up...");

    if consumer.is_active() {
        if let Err(e) = channel.basic_cancel(&consumer_tag).await {
            warn!(error = %e, "Failed to cancel consumer");
        }
    }

    if let Err(e) = channel.close().await {
        eprintln!("Error during shutdown: {}", e);
    }

    info!("Orizuru worker stopped");
}

fn setup_logging(rust_log: &str) {
    let log_level = match rust_log.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        eprintln!("PANIC: {} at {}", message, location);
        eprintln!("Thread: {:?}", std::thread::current().name());
    }));
}
