use crate::history::HistoryBuffer;
use crate::reading::{AirQualityCategory, Reading, ReadingGenerator, Sensor};
use crate::store::{latest_reading_key, Cache, ReadingStore, SensorRecord, SensorRegistry};
use crate::subscription::{SnapshotSink, SubscriberId, SubscriberRegistry};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Default number of readings returned by a sensor history query
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default window of a historical query
pub const DEFAULT_HISTORY_HOURS: i64 = 24;

pub const ACTIVE_ALERT_TYPE: &str = "air_quality_warning";

const SERVICE_NAME: &str = "air-quality-service";

/// Query error types
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Sensor is not registered
    NotFound(String),
    /// Request parameters out of range
    BadRequest(String),
    /// A backing store could not answer
    Unavailable(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::NotFound(id) => write!(f, "sensor '{}' not found", id),
            QueryError::BadRequest(reason) => write!(f, "bad request: {}", reason),
            QueryError::Unavailable(reason) => write!(f, "store unavailable: {}", reason),
        }
    }
}

impl std::error::Error for QueryError {}

/// Sensor currently reporting unhealthy air (latest reading category index ≥ 3)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlert {
    pub sensor_id: String,
    pub location: String,
    pub alert_type: String,
    pub message: String,
    /// "high" at category index ≥ 4, else "medium"
    pub severity: String,
    pub timestamp: DateTime<Utc>,
}

impl ActiveAlert {
    fn from_latest(reading: &Reading) -> Option<Self> {
        let category = AirQualityCategory::from_pm25(reading.pm25());
        if category.index() < 3 {
            return None;
        }

        let severity = if category.index() >= 4 { "high" } else { "medium" };

        Some(Self {
            sensor_id: reading.sensor_id.clone(),
            location: reading.location.clone(),
            alert_type: ACTIVE_ALERT_TYPE.to_string(),
            message: format!("Air quality is {} in {}", category.label(), reading.location),
            severity: severity.to_string(),
            timestamp: reading.timestamp,
        })
    }
}

/// Result of a historical window query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HistoricalData {
    /// One sensor: `{ "sensor_id": ..., "data": [...] }`
    Single { sensor_id: String, data: Vec<Reading> },
    /// Every sensor keyed by id
    All(HashMap<String, Vec<Reading>>),
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: DateTime<Utc>,
    pub sensors: usize,
    pub active_connections: usize,
}

/// Answers read-side queries without touching the scheduler
pub struct QueryService {
    sensors: Vec<Sensor>,
    generator: Arc<ReadingGenerator>,
    history: Arc<HistoryBuffer>,
    subscribers: Arc<SubscriberRegistry>,
    sensor_registry: Arc<dyn SensorRegistry>,
    reading_store: Arc<dyn ReadingStore>,
    cache: Arc<dyn Cache>,
}

impl QueryService {
    pub fn new(
        sensors: Vec<Sensor>,
        generator: Arc<ReadingGenerator>,
        history: Arc<HistoryBuffer>,
        subscribers: Arc<SubscriberRegistry>,
        sensor_registry: Arc<dyn SensorRegistry>,
        reading_store: Arc<dyn ReadingStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            sensors,
            generator,
            history,
            subscribers,
            sensor_registry,
            reading_store,
            cache,
        }
    }

    fn sensor(&self, sensor_id: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id == sensor_id)
    }

    /// Registered sensors with their status
    pub fn sensors(&self) -> Result<Vec<SensorRecord>, QueryError> {
        self.sensor_registry
            .list_sensors()
            .map_err(|e| QueryError::Unavailable(e.to_string()))
    }

    /// Latest reading for a sensor.
    ///
    /// Falls back to a freshly generated reading when nothing has been
    /// recorded yet. The fallback is not stored anywhere.
    pub fn current(&self, sensor_id: &str) -> Result<Reading, QueryError> {
        let sensor = self
            .sensor(sensor_id)
            .ok_or_else(|| QueryError::NotFound(sensor_id.to_string()))?;

        Ok(self
            .history
            .latest(sensor_id)
            .unwrap_or_else(|| self.generator.generate_now(sensor)))
    }

    /// Fresh unrecorded reading for every sensor
    pub fn current_all(&self) -> Vec<Reading> {
        self.sensors
            .iter()
            .map(|sensor| self.generator.generate_now(sensor))
            .collect()
    }

    /// Up to `limit` most recent readings, oldest first.
    /// Unknown sensors yield an empty list.
    pub fn sensor_history(&self, sensor_id: &str, limit: usize) -> Result<Vec<Reading>, QueryError> {
        if limit == 0 {
            return Err(QueryError::BadRequest("limit must be positive".to_string()));
        }
        Ok(self.history.recent(sensor_id, limit))
    }

    /// Readings from the last `hours` hours, for one sensor or all of them
    pub fn historical(
        &self,
        hours: i64,
        sensor_id: Option<&str>,
    ) -> Result<HistoricalData, QueryError> {
        self.historical_at(Utc::now(), hours, sensor_id)
    }

    pub fn historical_at(
        &self,
        now: DateTime<Utc>,
        hours: i64,
        sensor_id: Option<&str>,
    ) -> Result<HistoricalData, QueryError> {
        if hours <= 0 {
            return Err(QueryError::BadRequest("hours must be positive".to_string()));
        }
        let since = ChronoDuration::try_hours(hours)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Ok(match sensor_id {
            Some(id) => HistoricalData::Single {
                sensor_id: id.to_string(),
                data: self.history.window(id, since),
            },
            None => {
                let mut all = self.history.window_all(since);
                // Sensors without history still get an entry
                for sensor in &self.sensors {
                    all.entry(sensor.id.clone()).or_default();
                }
                HistoricalData::All(all)
            }
        })
    }

    /// Latest persisted reading: cache first, then the time-series store.
    ///
    /// With no sensor id every sensor's latest stored reading is returned.
    pub fn latest_stored(&self, sensor_id: Option<&str>) -> Result<Vec<Reading>, QueryError> {
        let Some(id) = sensor_id else {
            return self
                .reading_store
                .latest_per_sensor()
                .map_err(|e| QueryError::Unavailable(e.to_string()));
        };

        if let Some(cached) = self.cache.get(&latest_reading_key(id)) {
            match serde_json::from_str::<Reading>(&cached) {
                Ok(reading) => return Ok(vec![reading]),
                Err(e) => warn!(sensor_id = %id, error = %e, "Discarding unreadable cache entry"),
            }
        }

        self.reading_store
            .latest_for(id)
            .map(|reading| reading.into_iter().collect())
            .map_err(|e| QueryError::Unavailable(e.to_string()))
    }

    /// Sensors whose latest reading is Unhealthy for Sensitive Groups or worse
    pub fn active_alerts(&self) -> Vec<ActiveAlert> {
        self.sensors
            .iter()
            .filter_map(|sensor| self.history.latest(&sensor.id))
            .filter_map(|reading| ActiveAlert::from_latest(&reading))
            .collect()
    }

    pub fn subscribe(&self, sink: Arc<dyn SnapshotSink>) -> SubscriberId {
        self.subscribers.register(sink)
    }

    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn health(&self) -> HealthInfo {
        HealthInfo {
            status: "healthy",
            service: SERVICE_NAME,
            timestamp: Utc::now(),
            sensors: self.sensors.len(),
            active_connections: self.subscribers.len(),
        }
    }
}
