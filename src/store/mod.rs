// Persistence collaborators: alert store, time-series readings, sensor registry, fast cache

mod cache;
mod sqlite;

pub use cache::{latest_reading_key, MemoryCache};
pub use sqlite::SqliteStore;

use crate::alert::AlertEvent;
use crate::reading::{Reading, Sensor};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Freshness window for cached latest readings
pub const LATEST_READING_TTL: Duration = Duration::from_secs(300);

/// Durable alert store
pub trait AlertStore: Send + Sync {
    /// Persist an alert, returning its id
    fn save_alert(&self, alert: &AlertEvent) -> Result<i64>;
}

/// Time-series reading store
pub trait ReadingStore: Send + Sync {
    fn save_reading(&self, sensor_id: &str, reading: &Reading) -> Result<()>;

    /// Most recent stored reading per sensor
    fn latest_per_sensor(&self) -> Result<Vec<Reading>>;

    /// Most recent stored reading for one sensor
    fn latest_for(&self, sensor_id: &str) -> Result<Option<Reading>>;
}

/// Registered sensors with their status
pub trait SensorRegistry: Send + Sync {
    fn upsert_sensor(&self, sensor: &Sensor) -> Result<()>;

    fn list_sensors(&self) -> Result<Vec<SensorRecord>>;
}

/// Key-value cache with per-entry TTL
pub trait Cache: Send + Sync {
    fn set(&self, key: &str, value: String, ttl: Duration);

    fn get(&self, key: &str) -> Option<String>;
}

/// Sensor as held by the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    pub id: String,
    pub location: String,
    pub coordinates: [f64; 2],
    pub status: String,
    #[serde(rename = "lastUpdate")]
    pub last_update: DateTime<Utc>,
}

impl SensorRecord {
    pub fn sensor(&self) -> Sensor {
        Sensor {
            id: self.id.clone(),
            location: self.location.clone(),
            coordinates: self.coordinates,
        }
    }
}
