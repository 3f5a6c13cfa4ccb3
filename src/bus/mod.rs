// Alert delivery to the topic-based message bus

mod client;
mod publisher;
mod queue;

pub use client::{BusConfig, NatsChannel, NatsConnector};
pub use publisher::{BusChannel, BusConnector, ConnectionState, EventPublisher};
pub use queue::{AlertQueue, DEFAULT_ALERT_QUEUE_DEPTH};

/// Air quality topic (routing keys `alert.high`, `alert.moderate`)
pub const AIR_QUALITY_EVENTS: &str = "air_quality_events";

/// Cross-domain smart city topic
pub const SMART_CITY_EVENTS: &str = "smart_city_events";

/// Routing key for alerts on the smart city topic
pub const CROSS_DOMAIN_ALERT_KEY: &str = "air_quality.alert";

/// Topics declared durable on connect
pub const TOPICS: [&str; 2] = [AIR_QUALITY_EVENTS, SMART_CITY_EVENTS];
