//! Error types for the dashboard API.
//!
//! [`ObserverError`] is the failure type of the REST handlers and can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use robofleet_core::fleet::FleetError;

/// Errors that can occur in the dashboard API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<FleetError> for ObserverError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::NotFound(id) => Self::NotFound(format!("robot {id} not found")),
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let Self::NotFound(message) = self;
        let status = StatusCode::NOT_FOUND;

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
