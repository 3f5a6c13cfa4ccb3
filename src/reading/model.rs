use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static sensor identity (owned by the sensor registry)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Unique sensor identifier (e.g., "sensor-001")
    pub id: String,

    /// Human-readable location label
    pub location: String,

    /// Geographic coordinates as [lat, lon]
    pub coordinates: [f64; 2],
}

impl Sensor {
    pub fn new(id: &str, location: &str, lat: f64, lon: f64) -> Self {
        Self {
            id: id.to_string(),
            location: location.to_string(),
            coordinates: [lat, lon],
        }
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lon(&self) -> f64 {
        self.coordinates[1]
    }
}

/// Sensors seeded into an empty registry
pub fn default_sensors() -> Vec<Sensor> {
    vec![
        Sensor::new("sensor-001", "Centar", 44.7866, 20.4489),
        Sensor::new("sensor-002", "Novi Beograd", 44.8058, 20.3833),
        Sensor::new("sensor-003", "Zvezdara", 44.7870, 20.5156),
        Sensor::new("sensor-004", "Vračar", 44.7992, 20.4706),
        Sensor::new("sensor-005", "Stari Grad", 44.8176, 20.4565),
    ]
}

/// Measured values of one reading, plus the derived composite index.
///
/// Pollutants are in µg/m³ (co in mg/m³), temperature in °C,
/// humidity in %, pressure in hPa.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadingData {
    pub pm25: f64,
    pub pm10: f64,
    pub o3: f64,
    pub no2: f64,
    pub co: f64,
    pub so2: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,

    /// Composite air-quality index derived from pm25
    pub aqi: u32,
}

/// One simulated observation for one sensor at one tick. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "id")]
    pub sensor_id: String,
    pub location: String,
    pub coordinates: [f64; 2],
    pub timestamp: DateTime<Utc>,
    pub data: ReadingData,
}

impl Reading {
    pub fn pm25(&self) -> f64 {
        self.data.pm25
    }

    pub fn aqi(&self) -> u32 {
        self.data.aqi
    }
}
