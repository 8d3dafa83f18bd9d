//! Device records and the documents built from them.
//!
//! Field names on the wire match the dashboard's data file (`"Robot ID"`,
//! `"Battery Percentage"`, ...) so that seed files, REST responses, and
//! live-stream frames all share one shape.

use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::ids::DeviceId;

/// Place name used whenever location resolution is unavailable.
pub const UNKNOWN_LOCATION: &str = "Unknown location";

/// Upper bound for battery and CPU percentages.
pub const MAX_PERCENT: u8 = 100;

/// Battery level below which a device counts as low on battery.
pub const LOW_BATTERY_THRESHOLD: u8 = 20;

/// Format of [`DeviceRecord::last_updated`] (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A latitude/longitude pair, serialized as `[lat, lon]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinates(pub f64, pub f64);

impl Coordinates {
    /// Latitude in decimal degrees.
    pub const fn lat(self) -> f64 {
        self.0
    }

    /// Longitude in decimal degrees.
    pub const fn lon(self) -> f64 {
        self.1
    }

    /// Whether both components are finite and within geographic range.
    pub fn is_valid(self) -> bool {
        self.0.is_finite()
            && self.1.is_finite()
            && (-90.0..=90.0).contains(&self.0)
            && (-180.0..=180.0).contains(&self.1)
    }
}

/// One simulated robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DeviceRecord {
    /// Stable identifier, immutable after load.
    #[serde(rename = "Robot ID")]
    pub id: DeviceId,

    /// Current position. Absent means place names are never looked up.
    #[serde(
        rename = "Location Coordinates",
        default,
        deserialize_with = "deserialize_coordinates"
    )]
    pub coordinates: Option<Coordinates>,

    /// Last resolved place name, or [`UNKNOWN_LOCATION`].
    #[serde(
        rename = "Location Name",
        default = "unknown_location",
        deserialize_with = "deserialize_place_name"
    )]
    pub place_name: String,

    /// Whether the device is online.
    #[serde(rename = "Online/Offline", default, deserialize_with = "deserialize_online")]
    pub online: bool,

    /// Remaining battery, 0-100.
    #[serde(
        rename = "Battery Percentage",
        default,
        deserialize_with = "deserialize_percent"
    )]
    pub battery_percent: u8,

    /// CPU load, 0-100.
    #[serde(rename = "CPU Usage", default, deserialize_with = "deserialize_percent")]
    pub cpu_usage_percent: u8,

    /// Memory in use, in megabytes. Carried through from the seed data.
    #[serde(
        rename = "RAM Consumption",
        default,
        deserialize_with = "deserialize_megabytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub ram_consumption_mb: Option<u32>,

    /// UTC timestamp (`YYYY-MM-DD HH:MM:SS`) of the last online update.
    #[serde(rename = "Last Updated", default, deserialize_with = "deserialize_timestamp")]
    pub last_updated: Option<String>,
}

impl DeviceRecord {
    /// Create an offline record with a full battery and no position.
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            coordinates: None,
            place_name: unknown_location(),
            online: false,
            battery_percent: MAX_PERCENT,
            cpu_usage_percent: 0,
            ram_consumption_mb: None,
            last_updated: None,
        }
    }

    /// Bring a freshly loaded record in line with the fleet invariants.
    ///
    /// Percentages are capped at 100, an empty battery forces the device
    /// offline, and a device without coordinates carries the fallback
    /// place name.
    pub fn normalize(&mut self) {
        self.battery_percent = self.battery_percent.min(MAX_PERCENT);
        self.cpu_usage_percent = self.cpu_usage_percent.min(MAX_PERCENT);
        if self.battery_percent == 0 {
            self.online = false;
        }
        if self.coordinates.is_none() || self.place_name.is_empty() {
            self.place_name = unknown_location();
        }
    }

    /// Whether the battery has run out.
    pub const fn is_exhausted(&self) -> bool {
        self.battery_percent == 0
    }

    /// Whether the battery is below [`LOW_BATTERY_THRESHOLD`].
    pub const fn is_low_battery(&self) -> bool {
        self.battery_percent < LOW_BATTERY_THRESHOLD
    }
}

/// The full ordered set of device records at one point in time.
///
/// Serializes as `{"robots": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FleetSnapshot {
    /// Device records in load order.
    pub robots: Vec<DeviceRecord>,
}

impl FleetSnapshot {
    /// Look up a device in the snapshot by ID.
    pub fn find(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.robots.iter().find(|r| &r.id == id)
    }
}

/// Frame pushed to live-stream subscribers.
///
/// Serializes as `{"event": "update", "data": {"robots": [...]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum FleetEvent {
    /// A tick completed; carries the post-tick snapshot.
    Update(Arc<FleetSnapshot>),
}

/// Aggregate counters shown on the dashboard header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FleetStats {
    /// Number of devices in the fleet.
    pub total: usize,
    /// Devices currently online.
    pub online: usize,
    /// Devices currently offline.
    pub offline: usize,
    /// Devices below [`LOW_BATTERY_THRESHOLD`].
    pub low_battery: usize,
}

impl FleetStats {
    /// Compute counters over a set of records.
    pub fn from_records(records: &[DeviceRecord]) -> Self {
        let online = records.iter().filter(|r| r.online).count();
        Self {
            total: records.len(),
            online,
            offline: records.len().saturating_sub(online),
            low_battery: records.iter().filter(|r| r.is_low_battery()).count(),
        }
    }
}

fn unknown_location() -> String {
    UNKNOWN_LOCATION.to_owned()
}

/// Accept `null`, `[lat, lon]`, or a pair containing nulls.
///
/// Any pair with a missing component is treated as "no coordinates".
fn deserialize_coordinates<'de, D>(deserializer: D) -> Result<Option<Coordinates>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<(Option<f64>, Option<f64>)> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some((Some(lat), Some(lon))) => Some(Coordinates(lat, lon)),
        _ => None,
    })
}

/// A `null` place name falls back to [`UNKNOWN_LOCATION`].
fn deserialize_place_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_else(unknown_location))
}

/// A `null` status reads as offline.
fn deserialize_online<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<bool> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or(false))
}

/// Raw `"Last Updated"` value: formatted text or Unix epoch seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Epoch(i64),
    FractionalEpoch(f64),
}

/// Accept `null`, a formatted timestamp, or epoch seconds.
///
/// Epoch values are rendered in [`TIMESTAMP_FORMAT`]. Epochs outside
/// chrono's range read as absent.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawTimestamp> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(RawTimestamp::Text(text)) => Some(text),
        Some(RawTimestamp::Epoch(secs)) => format_epoch(secs),
        Some(RawTimestamp::FractionalEpoch(secs)) if secs.is_finite() => {
            #[allow(clippy::cast_possible_truncation)]
            let whole = secs.trunc() as i64;
            format_epoch(whole)
        }
        Some(RawTimestamp::FractionalEpoch(_)) => None,
    })
}

fn format_epoch(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|at| at.format(TIMESTAMP_FORMAT).to_string())
}

/// Accept any JSON number and clamp it into 0-100.
fn deserialize_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_percent(raw))
}

/// Accept `null` or any non-negative JSON number, rounded to whole megabytes.
fn deserialize_megabytes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<f64> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|mb| mb.is_finite() && *mb >= 0.0).map(|mb| {
        let rounded = mb.round().min(f64::from(u32::MAX));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = rounded as u32;
        value
    }))
}

/// Clamp a raw reading into a whole percentage.
pub fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    let clamped = raw.clamp(0.0, f64::from(MAX_PERCENT)).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let value = clamped as u8;
    value
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_dashboard_seed_entry() {
        let json = r#"{
            "Robot ID": "r1",
            "Online/Offline": true,
            "Battery Percentage": 87,
            "CPU Usage": 12,
            "RAM Consumption": 2048,
            "Last Updated": "2024-10-01 12:00:00",
            "Location Coordinates": [48.8566, 2.3522]
        }"#;
        let record: DeviceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_str(), "r1");
        assert!(record.online);
        assert_eq!(record.battery_percent, 87);
        assert_eq!(record.cpu_usage_percent, 12);
        assert_eq!(record.ram_consumption_mb, Some(2048));
        assert!(record.coordinates.is_some());
        assert_eq!(record.place_name, UNKNOWN_LOCATION);
    }

    #[test]
    fn null_coordinate_pair_means_absent() {
        let json = r#"{"Robot ID": "r2", "Location Coordinates": [null, null]}"#;
        let record: DeviceRecord = serde_json::from_str(json).unwrap();
        assert!(record.coordinates.is_none());
    }

    #[test]
    fn null_derived_fields_use_fallbacks() {
        let json = r#"{
            "Robot ID": "r5",
            "Location Name": null,
            "Online/Offline": null,
            "Last Updated": null,
            "Battery Percentage": 30
        }"#;
        let record: DeviceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.place_name, UNKNOWN_LOCATION);
        assert!(!record.online);
        assert!(record.last_updated.is_none());
        assert_eq!(record.battery_percent, 30);
    }

    #[test]
    fn epoch_timestamp_is_formatted() {
        let json = r#"[
            {"Robot ID": "a", "Last Updated": 1727774100},
            {"Robot ID": "b", "Last Updated": 1727774100.75},
            {"Robot ID": "c", "Last Updated": "2024-10-01 09:15:00"}
        ]"#;
        let records: Vec<DeviceRecord> = serde_json::from_str(json).unwrap();
        let stamps: Vec<_> = records.iter().map(|r| r.last_updated.as_deref()).collect();
        assert_eq!(
            stamps,
            vec![
                Some("2024-10-01 09:15:00"),
                Some("2024-10-01 09:15:00"),
                Some("2024-10-01 09:15:00")
            ]
        );
    }

    #[test]
    fn out_of_range_percentages_are_clamped() {
        let json = r#"{"Robot ID": "r3", "Battery Percentage": 140, "CPU Usage": -5}"#;
        let record: DeviceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.battery_percent, 100);
        assert_eq!(record.cpu_usage_percent, 0);
    }

    #[test]
    fn ram_accepts_fractional_and_null() {
        let json = r#"[
            {"Robot ID": "a", "RAM Consumption": 1536.4},
            {"Robot ID": "b", "RAM Consumption": null},
            {"Robot ID": "c", "RAM Consumption": -1}
        ]"#;
        let records: Vec<DeviceRecord> = serde_json::from_str(json).unwrap();
        let ram: Vec<_> = records.iter().map(|r| r.ram_consumption_mb).collect();
        assert_eq!(ram, vec![Some(1536), None, None]);
    }

    #[test]
    fn fractional_percentages_are_rounded() {
        assert_eq!(clamp_percent(42.6), 43);
        assert_eq!(clamp_percent(f64::NAN), 0);
    }

    #[test]
    fn normalize_forces_exhausted_device_offline() {
        let mut record = DeviceRecord::new("r4");
        record.online = true;
        record.battery_percent = 0;
        record.place_name = String::from("Somewhere");
        record.normalize();
        assert!(!record.online);
        assert_eq!(record.place_name, UNKNOWN_LOCATION);
    }

    #[test]
    fn snapshot_serializes_under_robots_key() {
        let snapshot = FleetSnapshot {
            robots: vec![DeviceRecord::new("r1")],
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["robots"][0]["Robot ID"], "r1");
        assert_eq!(value["robots"][0]["Location Name"], UNKNOWN_LOCATION);
        assert!(value["robots"][0]["Location Coordinates"].is_null());
        assert!(value["robots"][0].get("RAM Consumption").is_none());
    }

    #[test]
    fn update_event_is_tagged() {
        let event = FleetEvent::Update(Arc::new(FleetSnapshot::default()));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "update");
        assert!(value["data"]["robots"].is_array());
    }

    #[test]
    fn coordinates_validity() {
        assert!(Coordinates(10.0, 10.0).is_valid());
        assert!(!Coordinates(91.0, 0.0).is_valid());
        assert!(!Coordinates(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn stats_count_online_and_low_battery() {
        let mut a = DeviceRecord::new("a");
        a.online = true;
        a.battery_percent = 15;
        let b = DeviceRecord::new("b");
        let stats = FleetStats::from_records(&[a, b]);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.online, 1);
        assert_eq!(stats.offline, 1);
        assert_eq!(stats.low_battery, 1);
    }

    #[test]
    fn battery_at_threshold_is_not_low() {
        let mut at = DeviceRecord::new("at");
        at.battery_percent = LOW_BATTERY_THRESHOLD;
        let mut below = DeviceRecord::new("below");
        below.battery_percent = 19;
        assert!(!at.is_low_battery());
        assert!(below.is_low_battery());
    }
}
