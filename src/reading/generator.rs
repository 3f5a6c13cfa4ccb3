use super::index::composite_index;
use super::model::{Reading, ReadingData, Sensor};
use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

const JITTER_MIN: f64 = 0.8;
const JITTER_MAX: f64 = 1.2;

/// Baseline values before time-of-day and jitter scaling
#[derive(Clone, Debug, PartialEq)]
pub struct Baseline {
    pub pm25: f64,
    pub pm10: f64,
    pub o3: f64,
    pub no2: f64,
    pub co: f64,
    pub so2: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            pm25: 15.0,
            pm10: 25.0,
            o3: 80.0,
            no2: 35.0,
            co: 1.2,
            so2: 12.0,
            temperature: 22.0,
            humidity: 65.0,
            pressure: 1013.25,
        }
    }
}

/// Source of the per-reading jitter factor
pub enum Jitter {
    /// Uniform draw from [0.8, 1.2]
    Random(Mutex<StdRng>),
    /// Constant factor (deterministic runs)
    Fixed(f64),
}

impl Jitter {
    pub fn random() -> Self {
        Self::Random(Mutex::new(StdRng::from_entropy()))
    }

    pub fn seeded(seed: u64) -> Self {
        Self::Random(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    fn next(&self) -> f64 {
        match self {
            Self::Random(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .gen_range(JITTER_MIN..=JITTER_MAX),
            Self::Fixed(factor) => *factor,
        }
    }
}

/// Time-of-day multiplier for pollutant concentrations.
///
/// Rush hours (07-09, 17-19 inclusive) 1.3, night (22-06) 0.7, otherwise 1.0.
pub fn time_of_day_multiplier(hour: u32) -> f64 {
    match hour {
        7..=9 | 17..=19 => 1.3,
        h if h >= 22 || h <= 6 => 0.7,
        _ => 1.0,
    }
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Produces synthetic multi-pollutant readings
pub struct ReadingGenerator {
    baseline: Baseline,
    jitter: Jitter,
}

impl ReadingGenerator {
    pub fn new(baseline: Baseline, jitter: Jitter) -> Self {
        Self { baseline, jitter }
    }

    /// Generator with default baselines and random jitter
    pub fn random() -> Self {
        Self::new(Baseline::default(), Jitter::random())
    }

    /// Generator with default baselines and a constant jitter factor
    pub fn with_fixed_jitter(factor: f64) -> Self {
        Self::new(Baseline::default(), Jitter::Fixed(factor))
    }

    /// Generate a reading for `sensor` at the current wall-clock time
    pub fn generate_now(&self, sensor: &Sensor) -> Reading {
        self.generate(sensor, Local::now())
    }

    /// Generate a reading for `sensor` at `now`.
    ///
    /// The multiplier uses `now`'s hour in its own timezone. One jitter draw is
    /// shared by every field; ambient fields skip the time-of-day multiplier.
    pub fn generate<Tz: TimeZone>(&self, sensor: &Sensor, now: DateTime<Tz>) -> Reading {
        let multiplier = time_of_day_multiplier(now.hour());
        let jitter = self.jitter.next();
        let b = &self.baseline;

        let pollutant = |base: f64| round2(base * multiplier * jitter);
        let ambient = |base: f64| round2(base * jitter);

        let pm25 = pollutant(b.pm25);
        let data = ReadingData {
            pm25,
            pm10: pollutant(b.pm10),
            o3: pollutant(b.o3),
            no2: pollutant(b.no2),
            co: pollutant(b.co),
            so2: pollutant(b.so2),
            temperature: ambient(b.temperature),
            humidity: ambient(b.humidity),
            pressure: ambient(b.pressure),
            aqi: composite_index(pm25),
        };

        Reading {
            sensor_id: sensor.id.clone(),
            location: sensor.location.clone(),
            coordinates: sensor.coordinates,
            timestamp: now.with_timezone(&Utc),
            data,
        }
    }
}

impl Default for ReadingGenerator {
    fn default() -> Self {
        Self::random()
    }
}
