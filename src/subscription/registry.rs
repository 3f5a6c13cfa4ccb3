use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type SubscriberId = Uuid;

/// Outbound side of one live subscriber connection
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn send(&self, payload: Arc<str>) -> Result<()>;
}

/// Sink feeding a bounded per-connection queue.
///
/// The connection task drains the receiver into its socket. A full queue
/// makes `send` wait, which the registry's send timeout turns into a failure.
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSink {
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SnapshotSink for ChannelSink {
    async fn send(&self, payload: Arc<str>) -> Result<()> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| anyhow!("subscriber connection closed"))
    }
}

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub removed: Vec<SubscriberId>,
}

/// Live set of subscriber connections.
///
/// Membership may change while a broadcast is in flight: `broadcast` works on a
/// snapshot taken when it starts, and failed subscribers are removed from the
/// live set only after every send has finished.
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<dyn SnapshotSink>>,
    send_timeout: Duration,
}

impl SubscriberRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: DashMap::new(),
            send_timeout,
        }
    }

    /// Add a connection (Connected)
    pub fn register(&self, sink: Arc<dyn SnapshotSink>) -> SubscriberId {
        let id = Uuid::new_v4();
        self.subscribers.insert(id, sink);
        info!(subscriber_id = %id, subscribers = self.subscribers.len(), "Subscriber registered");
        id
    }

    /// Remove a connection (Disconnected). Returns false if it was already gone.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            info!(subscriber_id = %id, subscribers = self.subscribers.len(), "Subscriber removed");
        }
        removed
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Stable copy of the current membership
    pub fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn SnapshotSink>)> {
        self.subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Send `payload` to every subscriber and prune the ones that failed.
    ///
    /// Sends run concurrently, each bounded by the send timeout, so one slow
    /// connection cannot hold up the rest.
    pub async fn broadcast(&self, payload: Arc<str>) -> BroadcastReport {
        let targets = self.snapshot();
        let attempted = targets.len();

        let sends = targets.into_iter().map(|(id, sink)| {
            let payload = Arc::clone(&payload);
            async move {
                match timeout(self.send_timeout, sink.send(payload)).await {
                    Ok(Ok(())) => Ok(id),
                    Ok(Err(e)) => {
                        warn!(subscriber_id = %id, error = %e, "Send to subscriber failed");
                        Err(id)
                    }
                    Err(_) => {
                        warn!(subscriber_id = %id, "Send to subscriber timed out");
                        Err(id)
                    }
                }
            }
        });

        let mut delivered = 0;
        let mut failed = Vec::new();
        for outcome in join_all(sends).await {
            match outcome {
                Ok(_) => delivered += 1,
                Err(id) => failed.push(id),
            }
        }

        let removed: Vec<SubscriberId> = failed.into_iter().filter(|id| self.remove(id)).collect();

        debug!(
            attempted = attempted,
            delivered = delivered,
            removed = removed.len(),
            "Broadcast complete"
        );

        BroadcastReport {
            attempted,
            delivered,
            removed,
        }
    }
}
