use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

pub mod server;

pub struct Metrics {
    pub messages_processed_total: CounterVec,
    pub messages_failed_total: CounterVec,
    pub messages_published_total: CounterVec,
    pub message_processing_duration_seconds: HistogramVec,
    pub active_consumers: Gauge,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let messages_processed_total = CounterVec::new(
            Opts::new(
                "orizuru_messages_processed_total",
                "Total number of messages successfully consumed",
            ),
            &["queue"],
        )?;

        let messages_failed_total = CounterVec::new(
            Opts::new(
                "orizuru_messages_failed_total",
                "Total number of deliveries that failed, by pipeline stage",
            ),
            &["queue", "stage"],
        )?;

        let messages_published_total = CounterVec::new(
            Opts::new(
                "orizuru_messages_published_total",
                "Total number of handler results published to an outgoing queue",
            ),
            &["queue"],
        )?;

        let message_processing_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "orizuru_message_processing_duration_seconds",
                "Time taken to decode, handle and publish a message",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["queue", "status"],
        )?;

        let active_consumers = Gauge::new(
            "orizuru_active_consumers",
            "Number of consumers holding an active broker subscription",
        )?;

        registry.register(Box::new(messages_processed_total.clone()))?;
        registry.register(Box::new(messages_failed_total.clone()))?;
        registry.register(Box::new(messages_published_total.clone()))?;
        registry.register(Box::new(message_processing_duration_seconds.clone()))?;
        registry.register(Box::new(active_consumers.clone()))?;

        Ok(Arc::new(Self {
            messages_processed_total,
            messages_failed_total,
            messages_published_total,
            message_processing_duration_seconds,
            active_consumers,
            registry,
        }))
    }
}
