//! REST API endpoint handlers for the dashboard.
//!
//! Fleet reads go through [`SnapshotService`], so every response carries
//! freshly resolved place names.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/robots` | All devices, enriched |
//! | `GET` | `/robots/{id}` | Single device, enriched |
//! | `GET` | `/stats` | Online/offline/low-battery counters |
//! | `GET` | `/health` | Liveness plus device and subscriber counts |
//!
//! [`SnapshotService`]: robofleet_core::snapshot::SnapshotService

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use robofleet_types::{DeviceId, DeviceRecord, FleetSnapshot, FleetStats};
use serde::Serialize;

use crate::error::ObserverError;
use crate::state::AppState;

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is answering.
    pub status: &'static str,
    /// Number of devices in the fleet.
    pub devices: usize,
    /// Number of live-stream subscribers.
    pub subscribers: usize,
}

/// List every device with a freshly resolved place name.
///
/// # Route
///
/// `GET /robots`
pub async fn list_robots(State(state): State<Arc<AppState>>) -> Json<FleetSnapshot> {
    Json(state.snapshots.list_all().await)
}

/// Get a single device by ID.
///
/// # Route
///
/// `GET /robots/{id}`
pub async fn get_robot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceRecord>, ObserverError> {
    let record = state.snapshots.get(&DeviceId::from(id)).await?;
    Ok(Json(record))
}

/// Aggregate fleet counters.
///
/// # Route
///
/// `GET /stats`
pub async fn fleet_stats(State(state): State<Arc<AppState>>) -> Json<FleetStats> {
    Json(state.snapshots.stats().await)
}

/// Liveness probe.
///
/// # Route
///
/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        devices: state.snapshots.fleet().len(),
        subscribers: state.broadcaster.subscriber_count(),
    })
}
