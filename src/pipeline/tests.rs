use super::*;
use crate::alert::AlertEvent;
use crate::bus::{
    AlertQueue, BusChannel, BusConnector, EventPublisher, AIR_QUALITY_EVENTS, DEFAULT_ALERT_QUEUE_DEPTH,
    SMART_CITY_EVENTS,
};
use crate::history::HistoryBuffer;
use crate::reading::{default_sensors, Baseline, Jitter, ReadingGenerator};
use crate::store::{latest_reading_key, AlertStore, Cache, MemoryCache, ReadingStore, SqliteStore};
use crate::subscription::{ChannelSink, SnapshotMessage, SnapshotSink, SubscriberRegistry};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Published = Arc<Mutex<Vec<(String, String)>>>;

/// Bus that records topic and routing key of every publish
#[derive(Default)]
struct RecordingBus {
    published: Published,
}

struct RecordingChannel {
    published: Published,
}

#[async_trait]
impl BusConnector for RecordingBus {
    async fn connect(&self) -> Result<Box<dyn BusChannel>> {
        Ok(Box::new(RecordingChannel {
            published: Arc::clone(&self.published),
        }))
    }
}

#[async_trait]
impl BusChannel for RecordingChannel {
    fn is_open(&self) -> bool {
        true
    }

    async fn publish(&self, topic: &str, routing_key: &str, _payload: Vec<u8>) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), routing_key.to_string()));
        Ok(())
    }
}

/// Bus that is never reachable
struct DownBus;

#[async_trait]
impl BusConnector for DownBus {
    async fn connect(&self) -> Result<Box<dyn BusChannel>> {
        Err(anyhow!("connection refused"))
    }
}

/// Bus whose connect never completes
struct HangingBus;

#[async_trait]
impl BusConnector for HangingBus {
    async fn connect(&self) -> Result<Box<dyn BusChannel>> {
        futures::future::pending::<()>().await;
        Err(anyhow!("unreachable"))
    }
}

/// Store whose writes always fail
struct BrokenStore;

impl AlertStore for BrokenStore {
    fn save_alert(&self, _alert: &AlertEvent) -> Result<i64> {
        Err(anyhow!("database is locked"))
    }
}

impl ReadingStore for BrokenStore {
    fn save_reading(&self, _sensor_id: &str, _reading: &crate::reading::Reading) -> Result<()> {
        Err(anyhow!("database is locked"))
    }

    fn latest_per_sensor(&self) -> Result<Vec<crate::reading::Reading>> {
        Err(anyhow!("database is locked"))
    }

    fn latest_for(&self, _sensor_id: &str) -> Result<Option<crate::reading::Reading>> {
        Err(anyhow!("database is locked"))
    }
}

struct FailingSink;

#[async_trait]
impl SnapshotSink for FailingSink {
    async fn send(&self, _payload: Arc<str>) -> Result<()> {
        Err(anyhow!("broken pipe"))
    }
}

struct Harness {
    pipeline: Pipeline,
    history: Arc<HistoryBuffer>,
    registry: Arc<SubscriberRegistry>,
    store: Arc<SqliteStore>,
    cache: Arc<MemoryCache>,
}

fn harness(pm25_baseline: f64, connector: Arc<dyn BusConnector>) -> Harness {
    harness_with_bus_timeout(pm25_baseline, connector, Duration::from_millis(100))
}

fn alert_queue(connector: Arc<dyn BusConnector>, bus_timeout: Duration) -> AlertQueue {
    let publisher = Arc::new(EventPublisher::new(connector, bus_timeout, bus_timeout));
    let (queue, _handle) = AlertQueue::spawn(publisher, DEFAULT_ALERT_QUEUE_DEPTH);
    queue
}

fn harness_with_bus_timeout(
    pm25_baseline: f64,
    connector: Arc<dyn BusConnector>,
    bus_timeout: Duration,
) -> Harness {
    let generator = ReadingGenerator::new(
        Baseline {
            pm25: pm25_baseline,
            ..Baseline::default()
        },
        Jitter::Fixed(1.0),
    );
    let history = Arc::new(HistoryBuffer::new());
    let registry = Arc::new(SubscriberRegistry::new(Duration::from_millis(100)));
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let cache = Arc::new(MemoryCache::new());

    let parts = PipelineParts {
        sensors: default_sensors(),
        generator: Arc::new(generator),
        history: Arc::clone(&history),
        registry: Arc::clone(&registry),
        alerts: alert_queue(connector, bus_timeout),
        alert_store: store.clone(),
        reading_store: store.clone(),
        cache: cache.clone(),
        cache_ttl: Duration::from_secs(300),
    };

    Harness {
        pipeline: Pipeline::new(parts, Duration::from_millis(20)),
        history,
        registry,
        store,
        cache,
    }
}

fn noon() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

async fn wait_for_published(bus: &RecordingBus, count: usize) -> Vec<(String, String)> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let published = bus.published.lock().unwrap().clone();
            if published.len() >= count {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("alerts should reach the bus")
}

#[tokio::test]
async fn test_tick_skipped_without_subscribers() {
    let h = harness(15.0, Arc::new(DownBus));

    let report = h.pipeline.tick_at(noon()).await.unwrap();

    assert!(report.skipped);
    assert_eq!(report.readings, 0);
    assert!(h.history.sensor_ids().is_empty());
    assert_eq!(h.store.reading_count().unwrap(), 0);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_tick_records_and_broadcasts_snapshot() {
    let h = harness(15.0, Arc::new(DownBus));
    let (sink, mut rx) = ChannelSink::channel(4);
    h.registry.register(Arc::new(sink));

    let report = h.pipeline.tick_at(noon()).await.unwrap();

    assert!(!report.skipped);
    assert_eq!(report.readings, 5);
    assert_eq!(report.alerts, 0);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.pruned, 0);

    // Every sensor recorded in history, store and cache
    for sensor in h.pipeline.sensors() {
        let latest = h.history.latest(&sensor.id).unwrap();
        assert_eq!(latest.pm25(), 15.0);
        assert!(h.cache.get(&latest_reading_key(&sensor.id)).is_some());
    }
    assert_eq!(h.store.reading_count().unwrap(), 5);

    let payload = rx.recv().await.unwrap();
    let message: SnapshotMessage = serde_json::from_str(&payload).unwrap();
    assert_eq!(message.msg_type, "air_quality_update");
    assert_eq!(message.data.len(), 5);
    assert_eq!(message.data[0].sensor_id, "sensor-001");
    assert_eq!(message.data[0].aqi(), 56);
}

#[tokio::test]
async fn test_alerts_persisted_and_published() {
    let bus = Arc::new(RecordingBus::default());
    // Baseline 30 at noon: every sensor reads 30, a moderate alert
    let h = harness(30.0, bus.clone());
    let (sink, _rx) = ChannelSink::channel(4);
    h.registry.register(Arc::new(sink));

    let report = h.pipeline.tick_at(noon()).await.unwrap();

    assert_eq!(report.alerts, 5);
    assert_eq!(h.store.alert_count().unwrap(), 5);

    let published = wait_for_published(&bus, 10).await;
    assert_eq!(published.len(), 10);
    assert!(published
        .iter()
        .filter(|(topic, _)| topic == AIR_QUALITY_EVENTS)
        .all(|(_, key)| key == "alert.moderate"));
    assert_eq!(
        published.iter().filter(|(topic, _)| topic == SMART_CITY_EVENTS).count(),
        5
    );
}

#[tokio::test]
async fn test_high_alerts_at_rush_hour() {
    let bus = Arc::new(RecordingBus::default());
    // 40 * 1.3 = 52, above the high threshold
    let h = harness(40.0, bus.clone());
    let (sink, _rx) = ChannelSink::channel(4);
    h.registry.register(Arc::new(sink));

    let rush = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    let report = h.pipeline.tick_at(rush).await.unwrap();

    assert_eq!(report.alerts, 5);
    let published = wait_for_published(&bus, 10).await;
    assert!(published
        .iter()
        .filter(|(topic, _)| topic == AIR_QUALITY_EVENTS)
        .all(|(_, key)| key == "alert.high"));
}

#[tokio::test]
async fn test_unreachable_bus_does_not_fail_tick() {
    let h = harness(30.0, Arc::new(DownBus));
    let (sink, _rx) = ChannelSink::channel(4);
    h.registry.register(Arc::new(sink));

    let report = h.pipeline.tick_at(noon()).await.unwrap();

    assert_eq!(report.alerts, 5);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.store.alert_count().unwrap(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_hung_bus_does_not_stall_tick() {
    // Five alerts against a bus that never answers, with production timeouts
    let h = harness_with_bus_timeout(30.0, Arc::new(HangingBus), Duration::from_secs(2));
    let (sink, mut rx) = ChannelSink::channel(4);
    h.registry.register(Arc::new(sink));

    let started = tokio::time::Instant::now();
    let report = h.pipeline.tick_at(noon()).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(1), "tick took {:?}", elapsed);
    assert_eq!(report.alerts, 5);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.store.alert_count().unwrap(), 5);
    assert!(rx.recv().await.is_some());
}

#[tokio::test]
async fn test_store_failures_do_not_fail_tick() {
    let history = Arc::new(HistoryBuffer::new());
    let registry = Arc::new(SubscriberRegistry::new(Duration::from_millis(100)));
    let cache = Arc::new(MemoryCache::new());
    let broken = Arc::new(BrokenStore);
    let parts = PipelineParts {
        sensors: default_sensors(),
        generator: Arc::new(ReadingGenerator::new(
            Baseline {
                pm25: 30.0,
                ..Baseline::default()
            },
            Jitter::Fixed(1.0),
        )),
        history: Arc::clone(&history),
        registry: Arc::clone(&registry),
        alerts: alert_queue(Arc::new(DownBus), Duration::from_millis(100)),
        alert_store: broken.clone(),
        reading_store: broken,
        cache: cache.clone(),
        cache_ttl: Duration::from_secs(300),
    };
    let pipeline = Pipeline::new(parts, Duration::from_secs(5));
    let (sink, mut rx) = ChannelSink::channel(4);
    registry.register(Arc::new(sink));

    let report = pipeline.tick_at(noon()).await.unwrap();

    assert_eq!(report.readings, 5);
    assert_eq!(report.alerts, 5);
    assert_eq!(history.len("sensor-003"), 1);
    assert_eq!(cache.len(), 5);
    assert!(rx.recv().await.is_some());
}

#[tokio::test]
async fn test_failed_subscriber_pruned_during_tick() {
    let h = harness(15.0, Arc::new(DownBus));
    let (sink, mut rx) = ChannelSink::channel(4);
    let healthy = h.registry.register(Arc::new(sink));
    let failing = h.registry.register(Arc::new(FailingSink));

    let report = h.pipeline.tick_at(noon()).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.pruned, 1);
    assert!(h.registry.contains(&healthy));
    assert!(!h.registry.contains(&failing));
    assert!(rx.recv().await.is_some());

    // The last subscriber leaving pauses generation
    h.registry.remove(&healthy);
    let report = h.pipeline.tick_at(noon() + chrono::Duration::seconds(5)).await.unwrap();
    assert!(report.skipped);
    assert_eq!(h.history.len("sensor-001"), 1);
}

#[tokio::test]
async fn test_consecutive_ticks_grow_history() {
    let h = harness(15.0, Arc::new(DownBus));
    let (sink, mut rx) = ChannelSink::channel(8);
    h.registry.register(Arc::new(sink));

    for i in 0..3 {
        let at = noon() + chrono::Duration::seconds(5 * i);
        h.pipeline.tick_at(at).await.unwrap();
        assert!(rx.recv().await.is_some());
    }

    assert_eq!(h.history.len("sensor-005"), 3);
    assert_eq!(h.store.reading_count().unwrap(), 15);
    assert_eq!(
        h.history.latest("sensor-005").unwrap().timestamp,
        noon() + chrono::Duration::seconds(10)
    );
}

#[tokio::test]
async fn test_run_loop_keeps_ticking() {
    let h = harness(15.0, Arc::new(DownBus));
    let (sink, mut rx) = ChannelSink::channel(8);
    h.registry.register(Arc::new(sink));
    let history = Arc::clone(&h.history);

    let handle = tokio::spawn(Arc::new(h.pipeline).run());

    for _ in 0..2 {
        let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("pipeline should tick on its interval");
        assert!(payload.is_some());
    }

    handle.abort();
    assert!(history.len("sensor-001") >= 2);
}
