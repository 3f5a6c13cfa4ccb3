use super::{AIR_QUALITY_EVENTS, CROSS_DOMAIN_ALERT_KEY, SMART_CITY_EVENTS};
use crate::alert::AlertEvent;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Opens channels to the message bus
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BusChannel>>;
}

/// A live channel to the message bus
#[async_trait]
pub trait BusChannel: Send + Sync {
    /// False once the underlying connection has gone away
    fn is_open(&self) -> bool;

    async fn publish(&self, topic: &str, routing_key: &str, payload: Vec<u8>) -> Result<()>;
}

/// Publisher connection state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Link {
    state: ConnectionState,
    channel: Option<Box<dyn BusChannel>>,
}

/// Fire-and-forget event publisher with reconnect-on-publish.
///
/// Publishing never returns an error to the caller: a missing or stale channel
/// triggers a reconnect, and any connect or publish failure is logged and
/// leaves the publisher `Disconnected` for the next attempt.
pub struct EventPublisher {
    connector: Arc<dyn BusConnector>,
    link: Mutex<Link>,
    connect_timeout: Duration,
    publish_timeout: Duration,
}

impl EventPublisher {
    pub fn new(
        connector: Arc<dyn BusConnector>,
        connect_timeout: Duration,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                channel: None,
            }),
            connect_timeout,
            publish_timeout,
        }
    }

    /// Current connection state.
    ///
    /// Connects hold the link lock, so callers only ever observe the settled
    /// `Connected` or `Disconnected` states; `Connecting` is internal.
    pub async fn state(&self) -> ConnectionState {
        self.link.lock().await.state
    }

    /// Connect eagerly (startup); failure is logged and retried on publish
    pub async fn connect(&self) -> bool {
        let mut link = self.link.lock().await;
        self.ensure_channel(&mut link).await
    }

    /// Publish a JSON event. Returns whether the bus acknowledged it.
    pub async fn publish<T: Serialize>(&self, topic: &str, routing_key: &str, event: &T) -> bool {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, topic = %topic, "Failed to serialize event");
                return false;
            }
        };

        let mut link = self.link.lock().await;
        if !self.ensure_channel(&mut link).await {
            error!(topic = %topic, routing_key = %routing_key, "Bus unavailable, event dropped");
            return false;
        }

        let Some(channel) = link.channel.as_ref() else {
            return false;
        };

        let result = timeout(
            self.publish_timeout,
            channel.publish(topic, routing_key, payload),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                info!(topic = %topic, routing_key = %routing_key, "Published event");
                true
            }
            Ok(Err(e)) => {
                error!(error = %e, topic = %topic, routing_key = %routing_key, "Failed to publish event");
                Self::drop_channel(&mut link);
                false
            }
            Err(_) => {
                error!(topic = %topic, routing_key = %routing_key, "Publish timed out");
                Self::drop_channel(&mut link);
                false
            }
        }
    }

    /// Publish an alert to the air quality topic and the smart city topic.
    ///
    /// Returns the number of acknowledged deliveries (0..=2).
    pub async fn publish_alert(&self, alert: &AlertEvent) -> usize {
        let mut delivered = 0;

        if self
            .publish(AIR_QUALITY_EVENTS, &alert.severity.routing_key(), alert)
            .await
        {
            delivered += 1;
        }
        if self
            .publish(SMART_CITY_EVENTS, CROSS_DOMAIN_ALERT_KEY, alert)
            .await
        {
            delivered += 1;
        }

        debug!(sensor_id = %alert.sensor_id, delivered = delivered, "Alert handed to bus");
        delivered
    }

    /// Make sure `link` holds an open channel, reconnecting if needed
    async fn ensure_channel(&self, link: &mut Link) -> bool {
        if let Some(channel) = link.channel.as_ref() {
            if channel.is_open() {
                return true;
            }
            warn!("Bus channel is stale, reconnecting");
            Self::drop_channel(link);
        }

        link.state = ConnectionState::Connecting;

        match timeout(self.connect_timeout, self.connector.connect()).await {
            Ok(Ok(channel)) => {
                link.channel = Some(channel);
                link.state = ConnectionState::Connected;
                true
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to bus");
                link.state = ConnectionState::Disconnected;
                false
            }
            Err(_) => {
                error!("Bus connect timed out");
                link.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    fn drop_channel(link: &mut Link) {
        link.channel = None;
        link.state = ConnectionState::Disconnected;
    }
}
