//! Dashboard API server for the Robofleet telemetry service.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **REST endpoints** for the current fleet (`/robots`, `/robots/{id}`),
//!   aggregate counters (`/stats`), and liveness (`/health`)
//! - **`WebSocket` endpoint** (`/ws`) streaming one full fleet snapshot per
//!   mutator tick
//!
//! # Architecture
//!
//! REST reads go through [`SnapshotService`], which copies records out of
//! the fleet and resolves fresh place names without holding any lock
//! across the lookup. Each `WebSocket` client owns one [`Subscription`] on
//! the shared [`Broadcaster`]; a client that stops reading is dropped by
//! the broadcaster and never slows the mutator down.
//!
//! [`SnapshotService`]: robofleet_core::snapshot::SnapshotService
//! [`Subscription`]: robofleet_core::broadcast::Subscription
//! [`Broadcaster`]: robofleet_core::broadcast::Broadcaster

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use state::AppState;
