use std::env;

/// Worker settings read from the environment.
///
/// The broker URI is not part of this; the gateway resolves `CLOUDAMQP_URL`
/// itself each time it opens a channel.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub incoming_queue: String,
    pub outgoing_queue: Option<String>,
    pub consumer_tag: String,
    pub metrics_port: u16,
    pub rust_log: String,
}

const DEFAULT_METRICS_PORT: u16 = 9090;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_name = required("SERVICE_NAME")?;
        let incoming_queue = required("INCOMING_QUEUE")?;

        let outgoing_queue = env::var("OUTGOING_QUEUE")
            .ok()
            .filter(|queue| !queue.trim().is_empty());

        let consumer_tag = env::var("CONSUMER_TAG")
            .unwrap_or_else(|_| format!("{}-{}", service_name, uuid::Uuid::new_v4()));

        let metrics_port = match env::var("METRICS_PORT") {
            Ok(port) => port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "METRICS_PORT",
                value: port,
            })?,
            Err(_) => DEFAULT_METRICS_PORT,
        };

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            service_name,
            incoming_queue,
            outgoing_queue,
            consumer_tag,
            metrics_port,
            rust_log,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingRequired(name))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
