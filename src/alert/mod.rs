// Threshold alert evaluation

use crate::reading::Reading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;


/// pm2.5 above this is unhealthy and raises an alert (µg/m³)
pub const UNHEALTHY_PM25_THRESHOLD: f64 = 25.0;

/// pm2.5 above this raises a `high` alert instead of `moderate` (µg/m³)
pub const HIGH_PM25_THRESHOLD: f64 = 50.0;

pub const ALERT_EVENT_TYPE: &str = "air_quality_alert";

/// Alert severity tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Moderate,
    High,
}

impl Severity {
    pub fn from_pm25(pm25: f64) -> Self {
        if pm25 > HIGH_PM25_THRESHOLD {
            Severity::High
        } else {
            Severity::Moderate
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Moderate => "moderate",
            Severity::High => "high",
        }
    }

    /// Routing key on the air quality topic (e.g. "alert.high")
    pub fn routing_key(self) -> String {
        format!("alert.{}", self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert raised for one reading. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub event_type: String,
    pub sensor_id: String,
    pub location: String,
    pub coordinates: [f64; 2],
    pub pm25_value: f64,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Evaluate a reading against the unhealthy threshold.
///
/// Stateless: a sustained exceedance alerts again on every reading.
pub fn evaluate(reading: &Reading) -> Option<AlertEvent> {
    let pm25 = reading.pm25();
    if pm25 <= UNHEALTHY_PM25_THRESHOLD {
        return None;
    }

    Some(AlertEvent {
        event_type: ALERT_EVENT_TYPE.to_string(),
        sensor_id: reading.sensor_id.clone(),
        location: reading.location.clone(),
        coordinates: reading.coordinates,
        pm25_value: pm25,
        severity: Severity::from_pm25(pm25),
        message: format!(
            "Air quality alert: PM2.5 level {} μg/m³ detected at {}",
            pm25, reading.location
        ),
        timestamp: reading.timestamp,
    })
}
