//! Control state shared between the mutator loop and the rest of the process.
//!
//! [`MutatorControl`] carries the cooperative stop signal, the tick
//! interval, and the optional tick bound. The stop flag is an atomic so
//! the loop never takes a lock to check it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};

use crate::config::MutatorConfig;

/// Why the mutator loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutatorEndReason {
    /// Reached the configured `max_ticks` bound.
    MaxTicksReached,
    /// A stop was requested.
    Stopped,
}

/// Shared mutator control state.
#[derive(Debug)]
pub struct MutatorControl {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes tasks waiting in [`stopped`](Self::stopped).
    stop_notify: Notify,

    /// Time between tick starts.
    tick_interval: Duration,

    /// Maximum number of ticks (0 = unlimited).
    max_ticks: u64,

    /// Reason the loop ended, if it has.
    end_reason: Mutex<Option<MutatorEndReason>>,
}

impl MutatorControl {
    /// Create control state from configuration.
    pub fn new(config: &MutatorConfig) -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            max_ticks: config.max_ticks,
            end_reason: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Ask the loop to stop after the tick in flight, if any.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Wait until a stop is requested. Returns at once if it already was.
    pub async fn stopped(&self) {
        loop {
            let notified = self.stop_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Record the reason the loop ended.
    pub async fn set_end_reason(&self, reason: MutatorEndReason) {
        let mut guard = self.end_reason.lock().await;
        *guard = Some(reason);
    }

    /// Get the reason the loop ended, if it has.
    pub async fn end_reason(&self) -> Option<MutatorEndReason> {
        *self.end_reason.lock().await
    }

    // -----------------------------------------------------------------------
    // Cadence and bounds
    // -----------------------------------------------------------------------

    /// Time between tick starts.
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Configured tick bound (0 = unlimited).
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    /// Whether `completed` ticks satisfy the bound.
    pub const fn tick_limit_reached(&self, completed: u64) -> bool {
        self.max_ticks > 0 && completed >= self.max_ticks
    }
}
