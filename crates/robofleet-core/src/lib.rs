//! Fleet state, mutation loop, and live fan-out for the Robofleet service.
//!
//! This crate owns the in-memory fleet and everything that reads or
//! writes it. The HTTP surface lives in `robofleet-observer`; process
//! wiring lives in `robofleet-engine`.
//!
//! # Modules
//!
//! - [`broadcast`] -- Per-subscriber snapshot queues with auto-drop of
//!   stalled or disconnected subscribers.
//! - [`config`] -- Configuration loading from `robofleet-config.yaml` into
//!   strongly-typed structs.
//! - [`control`] -- Stop signal, tick interval, and tick bound shared with
//!   the mutator loop.
//! - [`fleet`] -- [`FleetState`], the authoritative device records.
//! - [`resolver`] -- [`Geocoder`] trait and the never-failing
//!   [`LocationResolver`].
//! - [`runner`] -- The mutator loop with cadence and panic isolation.
//! - [`seed`] -- Seed data loading.
//! - [`snapshot`] -- Enriched read-side queries for the dashboard.
//! - [`tick`] -- One tick of telemetry changes plus publish.
//!
//! [`FleetState`]: fleet::FleetState
//! [`Geocoder`]: resolver::Geocoder
//! [`LocationResolver`]: resolver::LocationResolver

pub mod broadcast;
pub mod config;
pub mod control;
pub mod fleet;
pub mod resolver;
pub mod runner;
pub mod seed;
pub mod snapshot;
pub mod tick;
