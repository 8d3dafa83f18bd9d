//! Shared type definitions for the Robofleet telemetry service.
//!
//! This crate is the single source of truth for the records exchanged
//! between the mutator, the REST API, and the live stream. Types flow
//! downstream to `TypeScript` via `ts-rs` for the fleet dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Device and subscriber identifiers
//! - [`device`] -- Device records, snapshots, stream frames, and stats

pub mod device;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use device::{
    Coordinates, DeviceRecord, FleetEvent, FleetSnapshot, FleetStats, LOW_BATTERY_THRESHOLD,
    MAX_PERCENT, TIMESTAMP_FORMAT, UNKNOWN_LOCATION, clamp_percent,
};
pub use ids::{DeviceId, SubscriberId};
