//! Read-side queries over the fleet.
//!
//! [`SnapshotService`] answers dashboard requests. Every answer carries a
//! freshly resolved place name per device, independent of whatever the
//! mutator last stored. It never writes to [`FleetState`].

use std::sync::Arc;

use futures::future::join_all;
use robofleet_types::{DeviceId, DeviceRecord, FleetSnapshot, FleetStats};

use crate::fleet::{FleetError, FleetState};
use crate::resolver::LocationResolver;

/// Enriched, read-only view of the fleet.
#[derive(Debug, Clone)]
pub struct SnapshotService {
    fleet: Arc<FleetState>,
    resolver: Arc<LocationResolver>,
}

impl SnapshotService {
    /// Create a service over shared components.
    pub const fn new(fleet: Arc<FleetState>, resolver: Arc<LocationResolver>) -> Self {
        Self { fleet, resolver }
    }

    /// The fleet this service reads from.
    pub const fn fleet(&self) -> &Arc<FleetState> {
        &self.fleet
    }

    /// Every device with a freshly resolved place name, in load order.
    ///
    /// Lookups run concurrently, each bounded by the resolver's timeout.
    pub async fn list_all(&self) -> FleetSnapshot {
        let records = self.fleet.snapshot_all().await;
        let robots = join_all(records.into_iter().map(|record| self.enrich(record))).await;
        FleetSnapshot { robots }
    }

    /// A single device with a freshly resolved place name.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] if the ID is not in the fleet.
    pub async fn get(&self, id: &DeviceId) -> Result<DeviceRecord, FleetError> {
        let record = self.fleet.get(id).await?;
        Ok(self.enrich(record).await)
    }

    /// Aggregate counters over the current records.
    pub async fn stats(&self) -> FleetStats {
        self.fleet.stats().await
    }

    async fn enrich(&self, mut record: DeviceRecord) -> DeviceRecord {
        record.place_name = self.resolver.resolve(record.coordinates).await;
        record
    }
}
