use super::Cache;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Cache key for a sensor's latest reading
pub fn latest_reading_key(sensor_id: &str) -> String {
    format!("air_quality:{}:latest", sensor_id)
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL cache.
///
/// Expired entries are dropped lazily on read and by `purge_expired`.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        // Guard released above; remove only if still expired
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("air_quality:sensor-001:latest", "{}".to_string(), Duration::from_secs(300));

        assert_eq!(
            cache.get("air_quality:sensor-001:latest"),
            Some("{}".to_string())
        );
        assert_eq!(cache.get("air_quality:sensor-002:latest"), None);
    }

    #[test]
    fn test_entry_expires() {
        let cache = MemoryCache::new();
        cache.set("key", "value".to_string(), Duration::from_millis(20));

        thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("key"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites_and_refreshes() {
        let cache = MemoryCache::new();
        cache.set("key", "old".to_string(), Duration::from_millis(20));
        cache.set("key", "new".to_string(), Duration::from_secs(300));

        thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("key"), Some("new".to_string()));
    }

    #[test]
    fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("short", "a".to_string(), Duration::from_millis(10));
        cache.set("long", "b".to_string(), Duration::from_secs(300));

        thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_latest_reading_key() {
        assert_eq!(latest_reading_key("sensor-004"), "air_quality:sensor-004:latest");
    }
}
