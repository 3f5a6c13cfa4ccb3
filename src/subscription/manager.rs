use crate::subscription::registry::{ChannelSink, SubscriberRegistry};
use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Manages a single WebSocket subscriber connection
pub struct ConnectionManager {
    registry: Arc<SubscriberRegistry>,
    /// Snapshots buffered for this connection before sends start timing out
    queue_depth: usize,
}

impl ConnectionManager {
    pub fn new(registry: Arc<SubscriberRegistry>, queue_depth: usize) -> Self {
        Self {
            registry,
            queue_depth,
        }
    }

    /// Handle WebSocket connection lifecycle.
    ///
    /// Registers the connection on entry and removes it on exit. The loop also
    /// ends when the registry drops this subscriber after a failed send.
    pub async fn handle(self, mut socket: WebSocket) {
        let (sink, mut snapshot_rx) = ChannelSink::channel(self.queue_depth);
        let subscriber_id = self.registry.register(Arc::new(sink));

        info!(subscriber_id = %subscriber_id, "WebSocket connection established");

        loop {
            tokio::select! {
                // Handle incoming client frames
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => {
                            info!(subscriber_id = %subscriber_id, "WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = socket.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(_)) => {
                            // Inbound text/binary/pong frames carry no commands
                            debug!(subscriber_id = %subscriber_id, "Ignoring client frame");
                        }
                        Some(Err(e)) => {
                            warn!(subscriber_id = %subscriber_id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Forward snapshots queued by the scheduler
                payload = snapshot_rx.recv() => {
                    match payload {
                        Some(payload) => {
                            if let Err(e) = socket.send(Message::Text(payload.to_string())).await {
                                error!(subscriber_id = %subscriber_id, error = %e, "Failed to send snapshot");
                                break;
                            }
                        }
                        None => {
                            info!(subscriber_id = %subscriber_id, "Subscriber pruned by registry");
                            break;
                        }
                    }
                }
            }
        }

        self.registry.remove(&subscriber_id);
        info!(subscriber_id = %subscriber_id, "WebSocket connection closed");
    }
}
