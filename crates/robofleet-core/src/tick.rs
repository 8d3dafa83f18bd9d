//! One tick of the fleet mutator.
//!
//! Each tick walks the fleet in load order. For every device it:
//!
//! 1. copies the record out of [`FleetState`],
//! 2. resolves a place name from the copy's coordinates with no fleet lock
//!    held,
//! 3. applies [`apply_telemetry`] through [`FleetState::update`].
//!
//! Online devices drain one battery point, gain one CPU point, and get a
//! fresh timestamp; a device whose battery reaches zero goes offline.
//! Offline devices only get their place name refreshed. After the last
//! device the full snapshot is handed to the [`Broadcaster`].

use std::sync::Arc;

use chrono::Utc;
use robofleet_types::{DeviceId, DeviceRecord, FleetSnapshot, MAX_PERCENT, TIMESTAMP_FORMAT};
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::fleet::{FleetError, FleetState};
use crate::resolver::LocationResolver;

/// What a tick did to one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOutcome {
    /// Device was offline; only the place name changed.
    Offline,
    /// Online device received a telemetry update.
    Updated,
    /// Online device ran out of battery and went offline.
    WentOffline,
}

/// Summary of a completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number (1-based).
    pub tick: u64,
    /// Online devices that received a telemetry update.
    pub devices_updated: usize,
    /// Devices online after the tick.
    pub devices_online: usize,
    /// Devices that went offline during this tick.
    pub went_offline: Vec<DeviceId>,
    /// Devices that could not be updated and were skipped.
    pub skipped: Vec<DeviceId>,
    /// Subscribers that had the snapshot queued.
    pub delivered: usize,
    /// Subscribers dropped while publishing.
    pub dropped: usize,
}

/// Apply one tick's worth of change to a record.
///
/// `now` is stored as the new `last_updated` for online devices.
pub fn apply_telemetry(record: &mut DeviceRecord, place_name: String, now: &str) -> DeviceOutcome {
    record.place_name = place_name;

    if !record.online {
        return DeviceOutcome::Offline;
    }

    record.battery_percent = record.battery_percent.saturating_sub(1);
    record.cpu_usage_percent = record.cpu_usage_percent.saturating_add(1).min(MAX_PERCENT);
    record.last_updated = Some(now.to_owned());

    if record.is_exhausted() {
        record.online = false;
        DeviceOutcome::WentOffline
    } else {
        DeviceOutcome::Updated
    }
}

/// Current UTC time in [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// The periodic fleet mutator.
///
/// Cheap to clone; clones share the same fleet, resolver, and broadcaster.
#[derive(Debug, Clone)]
pub struct Mutator {
    fleet: Arc<FleetState>,
    resolver: Arc<LocationResolver>,
    broadcaster: Broadcaster,
}

impl Mutator {
    /// Create a mutator over shared components.
    pub const fn new(
        fleet: Arc<FleetState>,
        resolver: Arc<LocationResolver>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            fleet,
            resolver,
            broadcaster,
        }
    }

    /// The fleet this mutator writes to.
    pub const fn fleet(&self) -> &Arc<FleetState> {
        &self.fleet
    }

    /// The broadcaster this mutator publishes to.
    pub const fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run one tick and publish the resulting snapshot.
    pub async fn tick(&self, tick: u64) -> TickSummary {
        let mut summary = TickSummary {
            tick,
            ..TickSummary::default()
        };

        for id in self.fleet.ids().await {
            match self.tick_device(&id).await {
                Ok(DeviceOutcome::Updated) => {
                    summary.devices_updated = summary.devices_updated.saturating_add(1);
                }
                Ok(DeviceOutcome::WentOffline) => {
                    summary.devices_updated = summary.devices_updated.saturating_add(1);
                    info!(tick, device_id = %id, "battery exhausted, device offline");
                    summary.went_offline.push(id);
                }
                Ok(DeviceOutcome::Offline) => {}
                Err(e) => {
                    warn!(tick, device_id = %id, error = %e, "skipping device this tick");
                    summary.skipped.push(id);
                }
            }
        }

        let robots = self.fleet.snapshot_all().await;
        summary.devices_online = robots.iter().filter(|r| r.online).count();

        let report = self.broadcaster.publish(FleetSnapshot { robots });
        summary.delivered = report.delivered;
        summary.dropped = report.dropped.len();

        debug!(
            tick,
            updated = summary.devices_updated,
            online = summary.devices_online,
            receivers = summary.delivered,
            dropped = summary.dropped,
            "Tick published"
        );

        summary
    }

    async fn tick_device(&self, id: &DeviceId) -> Result<DeviceOutcome, FleetError> {
        let coordinates = self.fleet.get(id).await?.coordinates;
        let place_name = self.resolver.resolve(coordinates).await;
        self.fleet
            .update(id, |record| apply_telemetry(record, place_name, &timestamp_now()))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use robofleet_types::{Coordinates, UNKNOWN_LOCATION};

    use super::*;
    use crate::resolver::{FixedAnswer, FixedGeocoder, Geocoder};

    const NOW: &str = "2024-10-01 12:00:00";

    fn online(id: &str, battery: u8, cpu: u8) -> DeviceRecord {
        let mut record = DeviceRecord::new(id);
        record.online = true;
        record.battery_percent = battery;
        record.cpu_usage_percent = cpu;
        record
    }

    fn mutator_with(seed: Vec<DeviceRecord>, geocoder: FixedGeocoder) -> Mutator {
        let geocoder: Arc<dyn Geocoder> = Arc::new(geocoder);
        Mutator::new(
            Arc::new(FleetState::new(seed)),
            Arc::new(LocationResolver::new(geocoder, Duration::from_secs(10))),
            Broadcaster::new(8),
        )
    }

    #[test]
    fn online_device_drains_battery_and_loads_cpu() {
        let mut record = online("r1", 50, 10);
        let outcome = apply_telemetry(&mut record, String::from("Depot"), NOW);
        assert_eq!(outcome, DeviceOutcome::Updated);
        assert_eq!(record.battery_percent, 49);
        assert_eq!(record.cpu_usage_percent, 11);
        assert_eq!(record.last_updated.as_deref(), Some(NOW));
        assert_eq!(record.place_name, "Depot");
    }

    #[test]
    fn cpu_is_capped_at_100() {
        let mut record = online("r1", 50, 100);
        let _ = apply_telemetry(&mut record, String::from("Depot"), NOW);
        assert_eq!(record.cpu_usage_percent, 100);
    }

    #[test]
    fn last_battery_point_takes_device_offline() {
        let mut record = online("r1", 1, 10);
        let outcome = apply_telemetry(&mut record, String::from("Depot"), NOW);
        assert_eq!(outcome, DeviceOutcome::WentOffline);
        assert_eq!(record.battery_percent, 0);
        assert!(!record.online);
    }

    #[test]
    fn offline_device_only_gets_place_name() {
        let mut record = DeviceRecord::new("r2");
        record.battery_percent = 50;
        record.cpu_usage_percent = 30;
        record.last_updated = Some(String::from("2020-01-01 00:00:00"));
        let before = record.clone();

        let outcome = apply_telemetry(&mut record, String::from("Harbor"), NOW);
        assert_eq!(outcome, DeviceOutcome::Offline);
        assert_eq!(record.battery_percent, before.battery_percent);
        assert_eq!(record.cpu_usage_percent, before.cpu_usage_percent);
        assert_eq!(record.last_updated, before.last_updated);
        assert_eq!(record.place_name, "Harbor");
    }

    #[test]
    fn timestamp_has_expected_shape() {
        let stamp = timestamp_now();
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn tick_updates_fleet_and_publishes() {
        let mut r1 = online("r1", 1, 10);
        r1.coordinates = Some(Coordinates(10.0, 10.0));
        let r2 = online("r2", 80, 20);
        let geocoder = FixedGeocoder::new().with(
            Coordinates(10.0, 10.0),
            FixedAnswer::Place(String::from("Somewhere")),
        );
        let mutator = mutator_with(vec![r1, r2], geocoder);
        let mut sub = mutator.broadcaster().subscribe();

        let summary = mutator.tick(1).await;
        assert_eq!(summary.tick, 1);
        assert_eq!(summary.devices_updated, 2);
        assert_eq!(summary.devices_online, 1);
        assert_eq!(summary.went_offline, vec![DeviceId::from("r1")]);
        assert_eq!(summary.delivered, 1);

        let published = sub.recv().await.unwrap();
        let r1 = published.find(&DeviceId::from("r1")).unwrap();
        assert_eq!(r1.battery_percent, 0);
        assert!(!r1.online);
        assert_eq!(r1.place_name, "Somewhere");
        let r2 = published.find(&DeviceId::from("r2")).unwrap();
        assert_eq!(r2.place_name, UNKNOWN_LOCATION);
        assert_eq!(r2.battery_percent, 79);
    }

    #[tokio::test]
    async fn exhausted_device_is_skipped_on_later_ticks() {
        let mutator = mutator_with(vec![online("r1", 1, 99)], FixedGeocoder::new());
        let _ = mutator.tick(1).await;
        let after_first = mutator.fleet().get(&DeviceId::from("r1")).await.unwrap();

        let summary = mutator.tick(2).await;
        assert_eq!(summary.devices_updated, 0);
        let after_second = mutator.fleet().get(&DeviceId::from("r1")).await.unwrap();
        assert_eq!(after_first.battery_percent, after_second.battery_percent);
        assert_eq!(after_first.cpu_usage_percent, after_second.cpu_usage_percent);
        assert_eq!(after_first.last_updated, after_second.last_updated);
    }

    #[tokio::test]
    async fn one_failed_lookup_does_not_affect_others() {
        let mut a = online("a", 50, 0);
        a.coordinates = Some(Coordinates(1.0, 1.0));
        let mut b = online("b", 50, 0);
        b.coordinates = Some(Coordinates(2.0, 2.0));
        let geocoder = FixedGeocoder::new()
            .with(Coordinates(1.0, 1.0), FixedAnswer::Fail)
            .with(Coordinates(2.0, 2.0), FixedAnswer::Place(String::from("Bravo")));
        let mutator = mutator_with(vec![a, b], geocoder);

        let summary = mutator.tick(1).await;
        assert_eq!(summary.devices_updated, 2);
        assert!(summary.skipped.is_empty());

        let a = mutator.fleet().get(&DeviceId::from("a")).await.unwrap();
        let b = mutator.fleet().get(&DeviceId::from("b")).await.unwrap();
        assert_eq!(a.place_name, UNKNOWN_LOCATION);
        assert_eq!(a.battery_percent, 49);
        assert_eq!(b.place_name, "Bravo");
    }

    #[tokio::test]
    async fn invariants_hold_across_many_ticks() {
        let seed = vec![
            online("a", 3, 97),
            online("b", 100, 0),
            DeviceRecord::new("c"),
        ];
        let mutator = mutator_with(seed, FixedGeocoder::new());

        for tick in 1..=110 {
            let _ = mutator.tick(tick).await;
            for record in mutator.fleet().snapshot_all().await {
                assert!(record.battery_percent <= 100);
                assert!(record.cpu_usage_percent <= 100);
                if record.battery_percent == 0 {
                    assert!(!record.online, "{} online with empty battery", record.id);
                }
            }
        }
    }
}
