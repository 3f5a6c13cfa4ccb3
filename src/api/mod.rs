// HTTP and WebSocket APIs

pub mod query;
pub mod websocket;

pub use query::{create_query_router, QueryAppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Full application router: query routes, the live feed, and allow-all CORS
pub fn create_app(query: Arc<QueryAppState>, ws: Arc<WsAppState>) -> Router {
    Router::new()
        .merge(create_query_router(query))
        .merge(create_ws_router(ws))
        .layer(CorsLayer::permissive())
}
