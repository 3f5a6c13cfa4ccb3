use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

// Re-export existing config types
pub use crate::bus::BusConfig;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::reading::{default_sensors, Sensor};
use crate::store::LATEST_READING_TTL;

/// Shortest tick interval the pipeline will run with
pub const MIN_TICK_INTERVAL_SECONDS: u64 = 1;

/// Complete airwatch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AirwatchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_sensors")]
    pub sensors: Vec<Sensor>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Scheduler and fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Delay between the end of one tick and the start of the next
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
    /// Readings retained per sensor
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Per-subscriber send deadline within a broadcast
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_subscriber_queue_depth")]
    pub subscriber_queue_depth: usize,
}

fn default_tick_interval() -> u64 {
    5
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_send_timeout_ms() -> u64 {
    500
}

fn default_subscriber_queue_depth() -> usize {
    16
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_tick_interval(),
            history_capacity: default_history_capacity(),
            send_timeout_ms: default_send_timeout_ms(),
            subscriber_queue_depth: default_subscriber_queue_depth(),
        }
    }
}

impl PipelineConfig {
    /// Tick interval, never shorter than one second
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds.max(MIN_TICK_INTERVAL_SECONDS))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Freshness window of cached latest readings
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

fn default_database_path() -> String {
    "airwatch.db".to_string()
}

fn default_cache_ttl() -> u64 {
    LATEST_READING_TTL.as_secs()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

impl StorageConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

impl Default for AirwatchConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bus: BusConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            sensors: default_sensors(),
        }
    }
}

impl AirwatchConfig {
    /// Apply env var overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AIRWATCH_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("NATS_URL") {
            self.bus.url = v;
        }
        if let Some(v) = lookup("AIRWATCH_TICK_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.pipeline.tick_interval_seconds = n;
            }
        }
        if let Some(v) = lookup("AIRWATCH_DATABASE_PATH") {
            self.storage.database_path = v;
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AirwatchConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: AirwatchConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(config)
}
