//! Authoritative in-memory fleet state.
//!
//! [`FleetState`] owns every [`DeviceRecord`] for the life of the process.
//! Records live in a single vector in load order behind a
//! [`tokio::sync::RwLock`]; an immutable ID index built at construction
//! maps each device to its slot. The device set never changes after
//! construction, so the index needs no lock.
//!
//! Each [`FleetState::update`] applies one closure to one record under the
//! write lock, so readers always see a record either entirely before or
//! entirely after a given update.

use std::collections::BTreeMap;

use robofleet_types::{DeviceId, DeviceRecord, FleetStats};
use tokio::sync::RwLock;
use tracing::warn;

/// Errors returned by fleet lookups and updates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FleetError {
    /// No device with this ID is part of the fleet.
    #[error("device not found: {0}")]
    NotFound(DeviceId),
}

/// The mutable collection of device records.
#[derive(Debug)]
pub struct FleetState {
    records: RwLock<Vec<DeviceRecord>>,
    index: BTreeMap<DeviceId, usize>,
}

impl FleetState {
    /// Build the fleet from seed records.
    ///
    /// Records are normalized (see [`DeviceRecord::normalize`]). When an ID
    /// appears more than once the first occurrence wins.
    pub fn new(seed: Vec<DeviceRecord>) -> Self {
        let mut records = Vec::with_capacity(seed.len());
        let mut index = BTreeMap::new();

        for mut record in seed {
            if index.contains_key(&record.id) {
                warn!(device_id = %record.id, "duplicate device id in seed data, ignoring");
                continue;
            }
            record.normalize();
            index.insert(record.id.clone(), records.len());
            records.push(record);
        }

        Self {
            records: RwLock::new(records),
            index,
        }
    }

    /// Number of devices in the fleet.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the fleet has no devices.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Device IDs in load order.
    pub async fn ids(&self) -> Vec<DeviceId> {
        self.records
            .read()
            .await
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    /// Copies of every record, in load order.
    pub async fn snapshot_all(&self) -> Vec<DeviceRecord> {
        self.records.read().await.clone()
    }

    /// Copy of a single record.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] if the ID is not in the fleet.
    pub async fn get(&self, id: &DeviceId) -> Result<DeviceRecord, FleetError> {
        let slot = self.slot(id)?;
        self.records
            .read()
            .await
            .get(slot)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(id.clone()))
    }

    /// Apply `mutate` to exactly one record and return its result.
    ///
    /// The closure runs under the write lock and must not block.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] if the ID is not in the fleet.
    pub async fn update<T, F>(&self, id: &DeviceId, mutate: F) -> Result<T, FleetError>
    where
        F: FnOnce(&mut DeviceRecord) -> T,
    {
        let slot = self.slot(id)?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(slot)
            .ok_or_else(|| FleetError::NotFound(id.clone()))?;
        Ok(mutate(record))
    }

    /// Aggregate counters over the current records.
    pub async fn stats(&self) -> FleetStats {
        FleetStats::from_records(&self.records.read().await)
    }

    fn slot(&self, id: &DeviceId) -> Result<usize, FleetError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| FleetError::NotFound(id.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use robofleet_types::{Coordinates, UNKNOWN_LOCATION};

    use super::*;

    fn device(id: &str, battery: u8, online: bool) -> DeviceRecord {
        let mut record = DeviceRecord::new(id);
        record.battery_percent = battery;
        record.online = online;
        record
    }

    #[tokio::test]
    async fn snapshot_preserves_load_order() {
        let fleet = FleetState::new(vec![
            device("c", 10, true),
            device("a", 20, true),
            device("b", 30, false),
        ]);
        let ids: Vec<_> = fleet
            .snapshot_all()
            .await
            .into_iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(fleet.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_ids_keep_first() {
        let fleet = FleetState::new(vec![device("r1", 10, true), device("r1", 99, true)]);
        assert_eq!(fleet.len(), 1);
        let record = fleet.get(&DeviceId::from("r1")).await.unwrap();
        assert_eq!(record.battery_percent, 10);
    }

    #[tokio::test]
    async fn load_normalizes_records() {
        let mut with_coords = device("r1", 0, true);
        with_coords.coordinates = Some(Coordinates(10.0, 10.0));
        let mut without = device("r2", 50, false);
        without.place_name = String::from("Stale name");

        let fleet = FleetState::new(vec![with_coords, without]);
        let r1 = fleet.get(&DeviceId::from("r1")).await.unwrap();
        let r2 = fleet.get(&DeviceId::from("r2")).await.unwrap();
        assert!(!r1.online);
        assert_eq!(r2.place_name, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let fleet = FleetState::new(vec![device("r1", 10, true)]);
        let err = fleet.get(&DeviceId::from("ghost")).await.unwrap_err();
        assert_eq!(err, FleetError::NotFound(DeviceId::from("ghost")));
    }

    #[tokio::test]
    async fn update_touches_only_target() {
        let fleet = FleetState::new(vec![device("r1", 10, true), device("r2", 20, true)]);
        let new_level = fleet
            .update(&DeviceId::from("r2"), |r| {
                r.battery_percent = 5;
                r.battery_percent
            })
            .await
            .unwrap();
        assert_eq!(new_level, 5);
        assert_eq!(fleet.get(&DeviceId::from("r1")).await.unwrap().battery_percent, 10);
        assert_eq!(fleet.get(&DeviceId::from("r2")).await.unwrap().battery_percent, 5);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let fleet = FleetState::new(Vec::new());
        let result = fleet.update(&DeviceId::from("ghost"), |_| ()).await;
        assert!(matches!(result, Err(FleetError::NotFound(_))));
        assert!(fleet.is_empty());
    }

    #[tokio::test]
    async fn readers_never_see_half_applied_updates() {
        let fleet = Arc::new(FleetState::new(vec![device("r1", 100, true)]));
        let id = DeviceId::from("r1");

        let writer = {
            let fleet = Arc::clone(&fleet);
            let id = id.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    fleet
                        .update(&id, |r| {
                            r.battery_percent = r.battery_percent.saturating_sub(1);
                            r.cpu_usage_percent = 100u8.saturating_sub(r.battery_percent);
                        })
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..200 {
            let record = fleet.get(&id).await.unwrap();
            assert_eq!(
                u16::from(record.battery_percent) + u16::from(record.cpu_usage_percent),
                100
            );
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn stats_reflect_current_records() {
        let fleet = FleetState::new(vec![device("r1", 10, true), device("r2", 80, false)]);
        let stats = fleet.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.online, 1);
        assert_eq!(stats.low_battery, 1);
    }
}
