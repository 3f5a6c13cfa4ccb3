use crate::alert;
use crate::bus::AlertQueue;
use crate::history::HistoryBuffer;
use crate::reading::{Reading, ReadingGenerator, Sensor};
use crate::store::{latest_reading_key, AlertStore, Cache, ReadingStore};
use crate::subscription::{SnapshotMessage, SubscriberRegistry};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shared components the scheduler drives
pub struct PipelineParts {
    pub sensors: Vec<Sensor>,
    pub generator: Arc<ReadingGenerator>,
    pub history: Arc<HistoryBuffer>,
    pub registry: Arc<SubscriberRegistry>,
    /// Alerts go to the bus through this queue; the tick never waits on it
    pub alerts: AlertQueue,
    pub alert_store: Arc<dyn AlertStore>,
    pub reading_store: Arc<dyn ReadingStore>,
    pub cache: Arc<dyn Cache>,
    pub cache_ttl: Duration,
}

/// What one tick did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// True when the tick was skipped for lack of subscribers
    pub skipped: bool,
    pub readings: usize,
    pub alerts: usize,
    pub delivered: usize,
    pub pruned: usize,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Single-flight telemetry pipeline.
///
/// Each tick generates one reading per sensor, records it, raises alerts and
/// broadcasts a snapshot to every live subscriber. The next tick starts only
/// after the previous one finished and the fixed delay elapsed.
pub struct Pipeline {
    parts: PipelineParts,
    interval: Duration,
}

impl Pipeline {
    pub fn new(parts: PipelineParts, interval: Duration) -> Self {
        Self { parts, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.parts.sensors
    }

    /// Run ticks forever. Errors and panics inside a tick are logged and the
    /// loop carries on after the normal delay.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_seconds = self.interval.as_secs_f64(),
            sensors = self.parts.sensors.len(),
            "Starting telemetry pipeline"
        );

        loop {
            match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(Ok(report)) if report.skipped => {
                    debug!("No subscribers, tick skipped");
                }
                Ok(Ok(report)) => {
                    debug!(
                        readings = report.readings,
                        alerts = report.alerts,
                        delivered = report.delivered,
                        pruned = report.pruned,
                        "Tick complete"
                    );
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Tick failed");
                }
                Err(_) => {
                    error!("Tick panicked");
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Run one tick at the current wall-clock time
    pub async fn tick(&self) -> Result<TickReport> {
        self.tick_at(Local::now()).await
    }

    /// Run one tick as if the clock read `now`
    pub async fn tick_at<Tz>(&self, now: DateTime<Tz>) -> Result<TickReport>
    where
        Tz: TimeZone,
        Tz::Offset: Send,
    {
        if self.parts.registry.is_empty() {
            return Ok(TickReport::skipped());
        }

        let mut report = TickReport::default();
        let mut readings = Vec::with_capacity(self.parts.sensors.len());

        for sensor in &self.parts.sensors {
            let reading = self.parts.generator.generate(sensor, now.clone());
            if self.record(sensor, &reading) {
                report.alerts += 1;
            }
            readings.push(reading);
        }
        report.readings = readings.len();

        let message = SnapshotMessage::new(readings, Utc::now());
        let payload = message.to_json().context("Failed to serialize snapshot")?;

        let broadcast = self.parts.registry.broadcast(Arc::from(payload)).await;
        report.delivered = broadcast.delivered;
        report.pruned = broadcast.removed.len();

        Ok(report)
    }

    /// Store a reading everywhere it belongs and raise its alert, if any.
    ///
    /// Collaborator failures are logged and never abort the tick.
    /// Returns whether an alert was raised.
    fn record(&self, sensor: &Sensor, reading: &Reading) -> bool {
        self.parts.history.append(&sensor.id, reading.clone());

        if let Err(e) = self.parts.reading_store.save_reading(&sensor.id, reading) {
            warn!(sensor_id = %sensor.id, error = %e, "Failed to store reading");
        }

        match serde_json::to_string(reading) {
            Ok(json) => self
                .parts
                .cache
                .set(&latest_reading_key(&sensor.id), json, self.parts.cache_ttl),
            Err(e) => warn!(sensor_id = %sensor.id, error = %e, "Failed to cache reading"),
        }

        let Some(alert) = alert::evaluate(reading) else {
            return false;
        };

        info!(
            sensor_id = %alert.sensor_id,
            pm25 = alert.pm25_value,
            severity = %alert.severity,
            "Air quality alert raised"
        );

        if let Err(e) = self.parts.alert_store.save_alert(&alert) {
            error!(sensor_id = %alert.sensor_id, error = %e, "Failed to store alert");
        }
        self.parts.alerts.submit(alert);

        true
    }
}
