use crate::query::{
    ActiveAlert, HealthInfo, HistoricalData, QueryError, QueryService, DEFAULT_HISTORY_HOURS,
    DEFAULT_HISTORY_LIMIT,
};
use crate::reading::Reading;
use crate::store::SensorRecord;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Shared state for the query API
pub struct QueryAppState {
    pub service: Arc<QueryService>,
}

/// Query parameters for sensor history
#[derive(Deserialize)]
pub struct HistoryParams {
    /// Most recent readings to return (default 50)
    pub limit: Option<usize>,
}

/// Query parameters for the historical window
#[derive(Deserialize)]
pub struct HistoricalParams {
    /// Window length in hours (default 24)
    pub hours: Option<i64>,
    /// Restrict to one sensor
    pub sensor_id: Option<String>,
}

/// Query parameters for stored readings
#[derive(Deserialize)]
pub struct LatestParams {
    pub sensor_id: Option<String>,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create query API router
pub fn create_query_router(state: Arc<QueryAppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/sensors", get(list_sensors))
        .route("/sensors/:id/current", get(current_reading))
        .route("/sensors/:id/data", get(sensor_history))
        .route("/data/current", get(current_all))
        .route("/data/historical", get(historical))
        .route("/data/latest", get(latest_stored))
        .route("/alerts", get(active_alerts))
        .with_state(state)
}

/// GET / - Service banner
async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Air Quality Service",
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health - Liveness plus sensor and subscriber counts
async fn health(State(state): State<Arc<QueryAppState>>) -> Json<HealthInfo> {
    Json(state.service.health())
}

/// GET /sensors - Registered sensors with status
async fn list_sensors(
    State(state): State<Arc<QueryAppState>>,
) -> Result<Json<Vec<SensorRecord>>, QueryError> {
    Ok(Json(state.service.sensors()?))
}

/// GET /sensors/:id/current - Latest reading, generated on demand when none recorded
async fn current_reading(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<String>,
) -> Result<Json<Reading>, QueryError> {
    Ok(Json(state.service.current(&id)?))
}

/// GET /sensors/:id/data - Most recent readings, oldest first
///
/// Query parameters:
/// - `limit`: number of readings (default 50, must be positive)
async fn sensor_history(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Reading>>, QueryError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.service.sensor_history(&id, limit)?))
}

/// GET /data/current - Fresh reading for every sensor
async fn current_all(State(state): State<Arc<QueryAppState>>) -> Json<Vec<Reading>> {
    Json(state.service.current_all())
}

/// GET /data/historical - Readings within the last `hours` hours
///
/// Query parameters:
/// - `hours`: window length (default 24, must be positive)
/// - `sensor_id`: restrict to one sensor; otherwise a map keyed by sensor id
async fn historical(
    State(state): State<Arc<QueryAppState>>,
    Query(params): Query<HistoricalParams>,
) -> Result<Json<HistoricalData>, QueryError> {
    let hours = params.hours.unwrap_or(DEFAULT_HISTORY_HOURS);
    Ok(Json(
        state
            .service
            .historical(hours, params.sensor_id.as_deref())?,
    ))
}

/// GET /data/latest - Latest persisted readings (cache, then time-series store)
async fn latest_stored(
    State(state): State<Arc<QueryAppState>>,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<Reading>>, QueryError> {
    Ok(Json(
        state.service.latest_stored(params.sensor_id.as_deref())?,
    ))
}

/// GET /alerts - Sensors currently reporting unhealthy air
async fn active_alerts(State(state): State<Arc<QueryAppState>>) -> Json<Vec<ActiveAlert>> {
    Json(state.service.active_alerts())
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::BadRequest(_) => StatusCode::BAD_REQUEST,
            QueryError::Unavailable(reason) => {
                warn!(error = %reason, "Query store unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}
