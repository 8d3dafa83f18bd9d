//! Axum router construction for the dashboard API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the dashboard server.
///
/// The router includes:
/// - `GET /robots` -- all devices
/// - `GET /robots/{id}` -- single device
/// - `GET /stats` -- fleet counters
/// - `GET /health` -- liveness
/// - `GET /ws` -- `WebSocket` fleet stream
///
/// `allowed_origins` restricts CORS to the listed origins. An empty list
/// or a `"*"` entry allows any origin.
pub fn build_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/robots", get(handlers::list_robots))
        .route("/robots/{id}", get(handlers::get_robot))
        .route("/stats", get(handlers::fleet_stats))
        .route("/health", get(handlers::health))
        .route("/ws", get(ws::ws_fleet))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(origins)
}
