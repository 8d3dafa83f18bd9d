//! Mutator loop runner.
//!
//! [`run_mutator`] drives [`Mutator::tick`] on a fixed cadence until a stop
//! is requested or the optional tick bound is reached:
//!
//! - **Cadence**: the interval is measured from the start of one tick to
//!   the start of the next. A tick that overruns its interval is followed
//!   immediately by the next one; ticks never overlap.
//! - **Isolation**: each tick runs on its own task. A panic inside a tick is
//!   logged and the loop carries on with the next tick.
//! - **Stop**: a stop request interrupts the wait between ticks. A tick
//!   already in flight runs to completion.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::control::{MutatorControl, MutatorEndReason};
use crate::tick::{Mutator, TickSummary};

/// Result of a mutator run.
#[derive(Debug)]
pub struct MutatorResult {
    /// The reason the loop ended.
    pub end_reason: MutatorEndReason,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary>,
    /// Total number of ticks started, including any that panicked.
    pub total_ticks: u64,
}

/// Run the mutator loop until a termination condition is met.
pub async fn run_mutator(mutator: &Mutator, control: &Arc<MutatorControl>) -> MutatorResult {
    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;

    info!(
        devices = mutator.fleet().len(),
        max_ticks = control.max_ticks(),
        tick_interval_ms = u64::try_from(control.tick_interval().as_millis()).unwrap_or(u64::MAX),
        "Mutator starting"
    );

    loop {
        if control.is_stop_requested() {
            info!("Mutator stop requested");
            return finish(control, MutatorEndReason::Stopped, last_summary, total_ticks).await;
        }

        let started = Instant::now();
        total_ticks = total_ticks.saturating_add(1);

        let tick_mutator = mutator.clone();
        let tick = total_ticks;
        match tokio::spawn(async move { tick_mutator.tick(tick).await }).await {
            Ok(summary) => last_summary = Some(summary),
            Err(e) if e.is_panic() => {
                error!(tick, "tick panicked, continuing with next tick");
            }
            Err(e) => {
                error!(tick, error = %e, "tick task failed, continuing with next tick");
            }
        }

        if control.tick_limit_reached(total_ticks) {
            info!(
                tick = total_ticks,
                max_ticks = control.max_ticks(),
                "Tick limit reached"
            );
            return finish(control, MutatorEndReason::MaxTicksReached, last_summary, total_ticks)
                .await;
        }

        let interval = control.tick_interval();
        if interval.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        let next_start = started.checked_add(interval).unwrap_or(started);
        tokio::select! {
            () = tokio::time::sleep_until(next_start) => {}
            () = control.stopped() => {}
        }
    }
}

async fn finish(
    control: &MutatorControl,
    reason: MutatorEndReason,
    final_summary: Option<TickSummary>,
    total_ticks: u64,
) -> MutatorResult {
    control.set_end_reason(reason).await;
    MutatorResult {
        end_reason: reason,
        final_summary,
        total_ticks,
    }
}

/// Log the end of a mutator run.
pub fn log_mutator_end(result: &MutatorResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_summary.as_ref().map(|s| s.tick),
        "Mutator ended"
    );

    if let Some(ref summary) = result.final_summary {
        info!(
            tick = summary.tick,
            devices_online = summary.devices_online,
            subscribers = summary.delivered,
            "Final tick summary"
        );
    } else {
        warn!("Mutator ended with no completed ticks");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use robofleet_types::{Coordinates, DeviceId, DeviceRecord};

    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::config::MutatorConfig;
    use crate::fleet::FleetState;
    use crate::resolver::{
        FixedAnswer, FixedGeocoder, GeocodeFuture, Geocoder, LocationResolver,
    };

    fn online(id: &str, battery: u8) -> DeviceRecord {
        let mut record = DeviceRecord::new(id);
        record.online = true;
        record.battery_percent = battery;
        record.coordinates = Some(Coordinates(1.0, 2.0));
        record
    }

    fn mutator(geocoder: Arc<dyn Geocoder>, seed: Vec<DeviceRecord>) -> Mutator {
        Mutator::new(
            Arc::new(FleetState::new(seed)),
            Arc::new(LocationResolver::new(geocoder, Duration::from_secs(10))),
            Broadcaster::new(16),
        )
    }

    fn control(tick_interval_ms: u64, max_ticks: u64) -> Arc<MutatorControl> {
        Arc::new(MutatorControl::new(&MutatorConfig {
            tick_interval_ms,
            max_ticks,
        }))
    }

    /// Panics on its first lookup, then answers normally.
    struct FlakyGeocoder {
        calls: AtomicUsize,
    }

    impl Geocoder for FlakyGeocoder {
        fn reverse(&self, _coordinates: Coordinates) -> GeocodeFuture<'_> {
            let call = self.calls.fetch_add(1, Ordering::AcqRel);
            Box::pin(async move {
                assert!(call > 0, "geocoder exploded");
                Ok(Some(String::from("Recovered")))
            })
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn bounded_by_max_ticks() {
        let mutator = mutator(Arc::new(FixedGeocoder::new()), vec![online("r1", 50)]);
        let control = control(0, 5);

        let result = run_mutator(&mutator, &control).await;

        assert_eq!(result.end_reason, MutatorEndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 5);
        assert_eq!(result.final_summary.unwrap().tick, 5);
        assert_eq!(
            control.end_reason().await,
            Some(MutatorEndReason::MaxTicksReached)
        );
        let record = mutator.fleet().get(&DeviceId::from("r1")).await.unwrap();
        assert_eq!(record.battery_percent, 45);
    }

    #[tokio::test]
    async fn stop_before_start_runs_no_ticks() {
        let mutator = mutator(Arc::new(FixedGeocoder::new()), vec![online("r1", 50)]);
        let control = control(0, 0);
        control.request_stop();

        let result = run_mutator(&mutator, &control).await;

        assert_eq!(result.end_reason, MutatorEndReason::Stopped);
        assert_eq!(result.total_ticks, 0);
        assert!(result.final_summary.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_wait_between_ticks() {
        let mutator = mutator(Arc::new(FixedGeocoder::new()), vec![online("r1", 50)]);
        let control = control(60_000, 0);
        let mut sub = mutator.broadcaster().subscribe();
        let started = Instant::now();

        let handle = {
            let mutator = mutator.clone();
            let control = Arc::clone(&control);
            tokio::spawn(async move { run_mutator(&mutator, &control).await })
        };

        assert!(sub.recv().await.is_some());
        control.request_stop();
        let result = handle.await.unwrap();

        assert_eq!(result.end_reason, MutatorEndReason::Stopped);
        assert_eq!(result.total_ticks, 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_measured_between_tick_starts() {
        let geocoder = FixedGeocoder::new().with_default(FixedAnswer::Delayed {
            after: Duration::from_secs(2),
            name: String::from("Yard"),
        });
        let mutator = mutator(Arc::new(geocoder), vec![online("r1", 50)]);
        let control = control(5_000, 3);
        let started = Instant::now();

        let result = run_mutator(&mutator, &control).await;

        // Ticks start at 0s, 5s, and 10s; the last finishes at 12s.
        assert_eq!(result.total_ticks, 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(12), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(13), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ticks_never_overlap() {
        let geocoder = FixedGeocoder::new().with_default(FixedAnswer::Delayed {
            after: Duration::from_secs(7),
            name: String::from("Yard"),
        });
        let mutator = mutator(Arc::new(geocoder), vec![online("r1", 50)]);
        let control = control(5_000, 2);
        let started = Instant::now();

        let result = run_mutator(&mutator, &control).await;

        assert_eq!(result.total_ticks, 2);
        assert!(started.elapsed() >= Duration::from_secs(14));
        let record = mutator.fleet().get(&DeviceId::from("r1")).await.unwrap();
        assert_eq!(record.battery_percent, 48);
    }

    #[tokio::test]
    async fn panicking_tick_does_not_end_the_loop() {
        let geocoder = Arc::new(FlakyGeocoder {
            calls: AtomicUsize::new(0),
        });
        let mutator = mutator(geocoder, vec![online("r1", 50)]);
        let control = control(0, 2);

        let result = run_mutator(&mutator, &control).await;

        assert_eq!(result.end_reason, MutatorEndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 2);
        assert_eq!(result.final_summary.unwrap().tick, 2);

        let record = mutator.fleet().get(&DeviceId::from("r1")).await.unwrap();
        assert_eq!(record.place_name, "Recovered");
        assert_eq!(record.battery_percent, 49);
    }

    #[tokio::test]
    async fn empty_fleet_still_publishes() {
        let mutator = mutator(Arc::new(FixedGeocoder::new()), Vec::new());
        let mut sub = mutator.broadcaster().subscribe();
        let control = control(0, 1);

        let result = run_mutator(&mutator, &control).await;

        assert_eq!(result.total_ticks, 1);
        assert!(sub.recv().await.unwrap().robots.is_empty());
    }
}
