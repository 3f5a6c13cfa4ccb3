use airwatch::api::{create_app, QueryAppState, WsAppState};
use airwatch::bus::{AlertQueue, EventPublisher, NatsConnector, DEFAULT_ALERT_QUEUE_DEPTH};
use airwatch::config::{load_config, AirwatchConfig};
use airwatch::history::HistoryBuffer;
use airwatch::pipeline::{Pipeline, PipelineParts};
use airwatch::query::QueryService;
use airwatch::reading::ReadingGenerator;
use airwatch::store::{MemoryCache, SensorRegistry, SqliteStore};
use airwatch::subscription::SubscriberRegistry;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airwatch=info".into()),
        )
        .init();

    info!("Airwatch starting...");

    // Load configuration: file if given, then env overrides
    let mut config = match std::env::var("AIRWATCH_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => AirwatchConfig::default(),
    };
    config.apply_env();

    info!(
        bind_addr = %config.server.bind_addr,
        nats_url = %config.bus.url,
        database = %config.storage.database_path,
        tick_interval_seconds = config.pipeline.tick_interval_seconds,
        "Configuration loaded"
    );

    // Initialize store and seed sensors on first run
    let store = Arc::new(
        SqliteStore::open(&config.storage.database_path)
            .context("Failed to initialize sensor store")?,
    );
    let seeded = store
        .seed_sensors(&config.sensors)
        .context("Failed to seed sensors")?;
    if seeded > 0 {
        info!(count = seeded, "Seeded sensor registry");
    }

    let sensors: Vec<_> = store
        .list_sensors()
        .context("Failed to list sensors")?
        .iter()
        .map(|record| record.sensor())
        .collect();
    info!(count = sensors.len(), "Sensor registry loaded");

    // Shared components
    let generator = Arc::new(ReadingGenerator::random());
    let history = Arc::new(HistoryBuffer::with_capacity(config.pipeline.history_capacity));
    let registry = Arc::new(SubscriberRegistry::new(config.pipeline.send_timeout()));
    let cache = Arc::new(MemoryCache::new());

    // Message bus: connect eagerly, the publisher reconnects on demand
    let publisher = Arc::new(EventPublisher::new(
        Arc::new(NatsConnector::new(config.bus.clone())),
        config.bus.connect_timeout(),
        config.bus.publish_timeout(),
    ));
    if !publisher.connect().await {
        warn!("Message bus unavailable at startup, alerts will not be published until it returns");
    }
    // Alerts reach the bus from a background task so ticks never wait on it
    let (alerts, alert_handle) = AlertQueue::spawn(publisher, DEFAULT_ALERT_QUEUE_DEPTH);

    // Start telemetry pipeline
    let pipeline = Arc::new(Pipeline::new(
        PipelineParts {
            sensors: sensors.clone(),
            generator: Arc::clone(&generator),
            history: Arc::clone(&history),
            registry: Arc::clone(&registry),
            alerts,
            alert_store: store.clone(),
            reading_store: store.clone(),
            cache: cache.clone(),
            cache_ttl: config.storage.cache_ttl(),
        },
        config.pipeline.tick_interval(),
    ));
    let pipeline_handle = tokio::spawn(pipeline.run());

    // Expired cache entries are dropped lazily; sweep the rest periodically
    let purge_cache = Arc::clone(&cache);
    let purge_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge_cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged = purged, "Purged expired cache entries");
            }
        }
    });

    // Start HTTP/WebSocket server
    let service = Arc::new(QueryService::new(
        sensors,
        generator,
        history,
        Arc::clone(&registry),
        store.clone(),
        store,
        cache,
    ));
    let app = create_app(
        Arc::new(QueryAppState { service }),
        Arc::new(WsAppState {
            registry,
            queue_depth: config.pipeline.subscriber_queue_depth,
        }),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(bind_addr = %config.server.bind_addr, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    pipeline_handle.abort();
    alert_handle.abort();
    purge_handle.abort();
    info!("Airwatch stopped");

    Ok(())
}
