use super::publisher::EventPublisher;
use crate::alert::AlertEvent;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Alerts buffered for the publisher task before new ones are dropped
pub const DEFAULT_ALERT_QUEUE_DEPTH: usize = 256;

/// Hands alerts to a background publisher task.
///
/// `submit` never waits: a full or closed queue drops the alert with a warning.
/// The task publishes alerts one at a time in submission order.
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<AlertEvent>,
}

impl AlertQueue {
    /// Spawn the publisher task and return the queue feeding it.
    ///
    /// The task ends once every `AlertQueue` clone is dropped.
    pub fn spawn(publisher: Arc<EventPublisher>, depth: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AlertEvent>(depth.max(1));

        let handle = tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                publisher.publish_alert(&alert).await;
            }
            info!("Alert publisher task stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue an alert for publishing. Returns whether it was accepted.
    pub fn submit(&self, alert: AlertEvent) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => {
                debug!("Alert queued for publishing");
                true
            }
            Err(TrySendError::Full(alert)) => {
                warn!(sensor_id = %alert.sensor_id, "Alert queue full, alert not published");
                false
            }
            Err(TrySendError::Closed(alert)) => {
                warn!(sensor_id = %alert.sensor_id, "Alert publisher stopped, alert not published");
                false
            }
        }
    }
}
