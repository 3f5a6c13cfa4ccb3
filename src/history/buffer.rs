use crate::reading::Reading;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Readings retained per sensor
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

type SensorHistory = Arc<RwLock<VecDeque<Reading>>>;

/// Bounded, time-ordered reading history per sensor.
///
/// Each sensor's buffer has its own lock; the outer map only hands out
/// buffer handles, so writes to one sensor never serialize behind another.
/// Reads copy the requested readings out.
pub struct HistoryBuffer {
    capacity: usize,
    sensors: DashMap<String, SensorHistory>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sensors: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a reading, evicting the oldest entry when at capacity.
    ///
    /// A reading older than the sensor's newest entry is rejected so the buffer
    /// stays in timestamp order. Returns whether the reading was stored.
    pub fn append(&self, sensor_id: &str, reading: Reading) -> bool {
        let history = self.history_for(sensor_id);
        let mut entries = history.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(newest) = entries.back() {
            if reading.timestamp < newest.timestamp {
                warn!(
                    sensor_id = %sensor_id,
                    timestamp = %reading.timestamp,
                    newest = %newest.timestamp,
                    "Rejecting out-of-order reading"
                );
                return false;
            }
        }

        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(reading);
        true
    }

    /// Most recent reading for a sensor
    pub fn latest(&self, sensor_id: &str) -> Option<Reading> {
        let history = self.existing(sensor_id)?;
        let entries = history.read().unwrap_or_else(PoisonError::into_inner);
        entries.back().cloned()
    }

    /// Readings with timestamp >= `since`, oldest first
    pub fn window(&self, sensor_id: &str, since: DateTime<Utc>) -> Vec<Reading> {
        match self.existing(sensor_id) {
            Some(history) => Self::filter_since(&history, since),
            None => Vec::new(),
        }
    }

    /// `window` applied to every known sensor
    pub fn window_all(&self, since: DateTime<Utc>) -> HashMap<String, Vec<Reading>> {
        // Collect handles first so no map shard stays locked while copying
        let handles: Vec<(String, SensorHistory)> = self
            .sensors
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        handles
            .into_iter()
            .map(|(sensor_id, history)| (sensor_id, Self::filter_since(&history, since)))
            .collect()
    }

    /// Last `limit` readings, oldest first
    pub fn recent(&self, sensor_id: &str, limit: usize) -> Vec<Reading> {
        let Some(history) = self.existing(sensor_id) else {
            return Vec::new();
        };
        let entries = history.read().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of readings held for a sensor
    pub fn len(&self, sensor_id: &str) -> usize {
        self.existing(sensor_id)
            .map(|history| history.read().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    /// Sensors with at least one recorded reading
    pub fn sensor_ids(&self) -> Vec<String> {
        self.sensors.iter().map(|entry| entry.key().clone()).collect()
    }

    fn history_for(&self, sensor_id: &str) -> SensorHistory {
        if let Some(history) = self.existing(sensor_id) {
            return history;
        }
        let history = self
            .sensors
            .entry(sensor_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(VecDeque::with_capacity(self.capacity))));
        Arc::clone(history.value())
    }

    fn existing(&self, sensor_id: &str) -> Option<SensorHistory> {
        self.sensors.get(sensor_id).map(|entry| Arc::clone(entry.value()))
    }

    fn filter_since(history: &RwLock<VecDeque<Reading>>, since: DateTime<Utc>) -> Vec<Reading> {
        let entries = history.read().unwrap_or_else(PoisonError::into_inner);
        // Entries are time-ordered, so everything after the first match qualifies
        let start = entries.partition_point(|r| r.timestamp < since);
        entries.range(start..).cloned().collect()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}
