// Integration tests for the query HTTP API

use airwatch::api::{create_app, create_query_router, QueryAppState, WsAppState};
use airwatch::history::HistoryBuffer;
use airwatch::query::QueryService;
use airwatch::reading::{default_sensors, Baseline, Jitter, Reading, ReadingGenerator};
use airwatch::store::{Cache, MemoryCache, ReadingStore, SqliteStore};
use airwatch::subscription::SubscriberRegistry;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    history: Arc<HistoryBuffer>,
    store: Arc<SqliteStore>,
}

fn create_test_app() -> TestApp {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.seed_sensors(&default_sensors()).unwrap();
    let history = Arc::new(HistoryBuffer::new());
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());

    let service = QueryService::new(
        default_sensors(),
        Arc::new(ReadingGenerator::with_fixed_jitter(1.0)),
        Arc::clone(&history),
        Arc::new(SubscriberRegistry::new(Duration::from_millis(100))),
        store.clone(),
        store.clone(),
        cache,
    );

    TestApp {
        router: create_query_router(Arc::new(QueryAppState {
            service: Arc::new(service),
        })),
        history,
        store,
    }
}

fn reading(sensor_index: usize, pm25: f64, minutes_ago: i64) -> Reading {
    let generator = ReadingGenerator::new(
        Baseline {
            pm25,
            ..Baseline::default()
        },
        Jitter::Fixed(1.0),
    );
    generator.generate(
        &default_sensors()[sensor_index],
        Utc::now() - chrono::Duration::minutes(minutes_ago),
    )
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(get_request(uri)).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// GET / returns the service banner.
#[tokio::test]
async fn test_root_banner() {
    let app = create_test_app();
    let (status, json) = get_json(&app.router, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["service"], "Air Quality Service");
    assert_eq!(json["status"], "running");
}

/// GET /health reports sensor and connection counts.
#[tokio::test]
async fn test_health() {
    let app = create_test_app();
    let (status, json) = get_json(&app.router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["sensors"], 5);
    assert_eq!(json["active_connections"], 0);
}

/// GET /sensors lists the seeded registry.
#[tokio::test]
async fn test_list_sensors() {
    let app = create_test_app();
    let (status, json) = get_json(&app.router, "/sensors").await;

    assert_eq!(status, StatusCode::OK);
    let sensors = json.as_array().unwrap();
    assert_eq!(sensors.len(), 5);
    assert_eq!(sensors[2]["id"], "sensor-003");
    assert_eq!(sensors[2]["location"], "Zvezdara");
    assert_eq!(sensors[2]["status"], "active");
    assert!(sensors[2]["lastUpdate"].is_string());
}

/// GET /sensors/:id/current returns the recorded reading when one exists.
#[tokio::test]
async fn test_current_reading_from_history() {
    let app = create_test_app();
    let recorded = reading(0, 40.0, 1);
    app.history.append("sensor-001", recorded.clone());

    let (status, json) = get_json(&app.router, "/sensors/sensor-001/current").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "sensor-001");
    assert_eq!(json["data"]["pm25"], recorded.pm25());
}

/// GET /sensors/:id/current generates a reading when nothing is recorded.
#[tokio::test]
async fn test_current_reading_generated_on_demand() {
    let app = create_test_app();
    let (status, json) = get_json(&app.router, "/sensors/sensor-004/current").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "sensor-004");
    assert!(json["data"]["aqi"].is_u64());
    assert_eq!(app.history.len("sensor-004"), 0);
}

/// Unknown sensors are a 404 with a JSON error body.
#[tokio::test]
async fn test_current_reading_unknown_sensor() {
    let app = create_test_app();
    let (status, json) = get_json(&app.router, "/sensors/sensor-404/current").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "sensor 'sensor-404' not found");
}

/// GET /sensors/:id/data honors the limit and keeps oldest-first order.
#[tokio::test]
async fn test_sensor_history_limit() {
    let app = create_test_app();
    let readings: Vec<Reading> = (1..=6)
        .rev()
        .map(|minutes_ago| reading(1, 15.0 + minutes_ago as f64, minutes_ago))
        .collect();
    for r in &readings {
        app.history.append("sensor-002", r.clone());
    }

    let (status, json) = get_json(&app.router, "/sensors/sensor-002/data?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let data = json.as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["timestamp"], serde_json::to_value(readings[4].timestamp).unwrap());
    assert_eq!(data[1]["timestamp"], serde_json::to_value(readings[5].timestamp).unwrap());

    let (_, json) = get_json(&app.router, "/sensors/sensor-002/data").await;
    assert_eq!(json.as_array().unwrap().len(), 6);
}

/// A zero limit is rejected; an unknown sensor's history is empty.
#[tokio::test]
async fn test_sensor_history_edge_cases() {
    let app = create_test_app();

    let (status, json) = get_json(&app.router, "/sensors/sensor-001/data?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("limit"));

    let (status, json) = get_json(&app.router, "/sensors/sensor-999/data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}

/// GET /data/current returns one fresh reading per sensor.
#[tokio::test]
async fn test_current_all() {
    let app = create_test_app();
    let (status, json) = get_json(&app.router, "/data/current").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 5);
}

/// GET /data/historical filters by window, with and without a sensor id.
#[tokio::test]
async fn test_historical_window() {
    let app = create_test_app();
    app.history.append("sensor-001", reading(0, 15.0, 180));
    app.history.append("sensor-001", reading(0, 15.0, 30));
    app.history.append("sensor-005", reading(4, 15.0, 10));

    let (status, json) = get_json(&app.router, "/data/historical?hours=1&sensor_id=sensor-001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sensor_id"], "sensor-001");
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (status, json) = get_json(&app.router, "/data/historical").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sensor-001"].as_array().unwrap().len(), 2);
    assert_eq!(json["sensor-005"].as_array().unwrap().len(), 1);
    assert_eq!(json["sensor-003"], serde_json::json!([]));
}

/// Non-positive hours are a 400.
#[tokio::test]
async fn test_historical_rejects_zero_hours() {
    let app = create_test_app();
    let (status, json) = get_json(&app.router, "/data/historical?hours=0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad request: hours must be positive");
}

/// GET /data/latest reads persisted readings.
#[tokio::test]
async fn test_latest_stored() {
    let app = create_test_app();
    let stored = reading(2, 15.0, 5);
    app.store.save_reading("sensor-003", &stored).unwrap();

    let (status, json) = get_json(&app.router, "/data/latest?sensor_id=sensor-003").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], "sensor-003");

    let (_, json) = get_json(&app.router, "/data/latest").await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

/// GET /alerts lists sensors whose latest reading is unhealthy.
#[tokio::test]
async fn test_active_alerts() {
    let app = create_test_app();
    app.history.append("sensor-001", reading(0, 12.0, 1));
    // Hazardous at any time-of-day multiplier
    app.history.append("sensor-003", reading(2, 260.0, 1));

    let (status, json) = get_json(&app.router, "/alerts").await;

    assert_eq!(status, StatusCode::OK);
    let alerts = json.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["sensorId"], "sensor-003");
    assert_eq!(alerts[0]["alertType"], "air_quality_warning");
    assert_eq!(alerts[0]["severity"], "high");
    assert_eq!(alerts[0]["message"], "Air quality is Hazardous in Zvezdara");
}

/// The combined app answers CORS requests from any origin and mounts /ws.
#[tokio::test]
async fn test_app_cors_and_ws_route() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let registry = Arc::new(SubscriberRegistry::new(Duration::from_millis(100)));
    let service = QueryService::new(
        default_sensors(),
        Arc::new(ReadingGenerator::with_fixed_jitter(1.0)),
        Arc::new(HistoryBuffer::new()),
        Arc::clone(&registry),
        store.clone(),
        store,
        Arc::new(MemoryCache::new()),
    );
    let app = create_app(
        Arc::new(QueryAppState {
            service: Arc::new(service),
        }),
        Arc::new(WsAppState {
            registry,
            queue_depth: 4,
        }),
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://dashboard.local")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );

    // Plain GET without upgrade headers is rejected by the extractor, not routed away
    let response = app.oneshot(get_request("/ws")).await.unwrap();
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
    assert_ne!(response.status(), StatusCode::OK);
}
