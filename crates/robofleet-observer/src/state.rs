//! Shared application state for the dashboard API server.

use std::sync::Arc;

use robofleet_core::broadcast::{Broadcaster, Subscription};
use robofleet_core::fleet::FleetState;
use robofleet_core::resolver::LocationResolver;
use robofleet_core::snapshot::SnapshotService;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor. The
/// snapshot service serves REST reads; the broadcaster hands each
/// `WebSocket` client its own subscription.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Enriched read-side queries over the fleet.
    pub snapshots: SnapshotService,
    /// Fan-out of per-tick fleet snapshots.
    pub broadcaster: Broadcaster,
}

impl AppState {
    /// Create application state over shared components.
    pub fn new(
        fleet: Arc<FleetState>,
        resolver: Arc<LocationResolver>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            snapshots: SnapshotService::new(fleet, resolver),
            broadcaster,
        }
    }

    /// Register a new live-stream subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }
}
