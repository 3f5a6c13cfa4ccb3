use super::publisher::{BusChannel, BusConnector};
use super::TOPICS;
use anyhow::{Context, Result};
use async_nats::connection::State;
use async_nats::jetstream::{self, stream};
use async_nats::HeaderMap;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Message bus configuration
#[derive(Clone, Debug, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

fn default_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_publish_timeout_ms() -> u64 {
    2000
}

fn default_max_age_days() -> u64 {
    7
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl BusConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Opens JetStream channels to NATS, one durable stream per topic
pub struct NatsConnector {
    config: BusConfig,
}

impl NatsConnector {
    pub fn new(config: BusConfig) -> Self {
        Self { config }
    }

    /// Stream name for a topic (e.g. "air_quality_events" -> "AIR_QUALITY_EVENTS")
    pub fn stream_name(topic: &str) -> String {
        topic.to_uppercase()
    }

    /// Ensure the topic's stream exists with file storage
    async fn ensure_stream(&self, jetstream: &jetstream::Context, topic: &str) -> Result<()> {
        let name = Self::stream_name(topic);

        if jetstream.get_stream(&name).await.is_ok() {
            info!(stream = %name, "Stream already exists");
            return Ok(());
        }

        let stream_config = stream::Config {
            name: name.clone(),
            subjects: vec![format!("{}.>", topic)],
            max_age: Duration::from_secs(self.config.max_age_days * 86400),
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        jetstream
            .create_stream(stream_config)
            .await
            .context(format!("Failed to create stream '{}'", name))?;

        info!(stream = %name, "Created stream");
        Ok(())
    }
}

#[async_trait]
impl BusConnector for NatsConnector {
    async fn connect(&self) -> Result<Box<dyn BusChannel>> {
        info!(url = %self.config.url, "Connecting to NATS");

        let client = async_nats::connect(&self.config.url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        for topic in TOPICS {
            self.ensure_stream(&jetstream, topic).await?;
        }

        info!("Connected to NATS");
        Ok(Box::new(NatsChannel { client, jetstream }))
    }
}

/// Live JetStream channel
pub struct NatsChannel {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

#[async_trait]
impl BusChannel for NatsChannel {
    fn is_open(&self) -> bool {
        matches!(self.client.connection_state(), State::Connected)
    }

    /// Publish to subject `{topic}.{routing_key}` and wait for the ack
    async fn publish(&self, topic: &str, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        let subject = format!("{}.{}", topic, routing_key);

        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/json");

        self.jetstream
            .publish_with_headers(subject.clone(), headers, payload.into())
            .await
            .context(format!("Failed to publish to subject '{}'", subject))?
            .await
            .context("Failed to await publish ack")?;

        Ok(())
    }
}
