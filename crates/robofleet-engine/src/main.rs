//! Robofleet service binary.
//!
//! Wires the fleet, the mutator loop, the Nominatim geocoder, and the
//! dashboard API together and runs them until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `robofleet-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Load seed devices
//! 4. Build the geocoder and location resolver
//! 5. Start the dashboard API server
//! 6. Run the mutator loop on a background task
//!
//! # Shutdown Sequence
//!
//! 1. Request a mutator stop and wait for the in-flight tick to finish
//! 2. Close the broadcaster so every `WebSocket` client gets a close frame
//! 3. Stop accepting requests and let in-flight ones finish

mod error;
mod nominatim;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use robofleet_core::broadcast::Broadcaster;
use robofleet_core::config::{FleetConfig, GeocoderConfig, LoggingConfig};
use robofleet_core::control::MutatorControl;
use robofleet_core::fleet::FleetState;
use robofleet_core::resolver::{Geocoder, LocationResolver, NullGeocoder};
use robofleet_core::runner;
use robofleet_core::seed;
use robofleet_core::tick::Mutator;
use robofleet_observer::server::ServerConfig;
use robofleet_observer::startup::spawn_observer;
use robofleet_observer::state::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::nominatim::NominatimGeocoder;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "robofleet-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the server cannot bind.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("robofleet-engine starting");
    info!(
        tick_interval_ms = config.mutator.tick_interval_ms,
        max_ticks = config.mutator.max_ticks,
        geocoder_enabled = config.geocoder.enabled,
        port = config.server.port,
        "Configuration loaded"
    );

    // 3. Load seed devices.
    let fleet = Arc::new(FleetState::new(seed::load_or_empty(&config.seed.path)));
    info!(
        devices = fleet.len(),
        seed_path = %config.seed.path.display(),
        "Fleet loaded"
    );

    // 4. Geocoder and resolver.
    let geocoder = build_geocoder(&config.geocoder)?;
    let resolver = Arc::new(LocationResolver::new(
        geocoder,
        Duration::from_millis(config.geocoder.timeout_ms),
    ));
    info!(?resolver, "Location resolver ready");

    let broadcaster = Broadcaster::new(config.broadcast.subscriber_buffer);
    let control = Arc::new(MutatorControl::new(&config.mutator));

    // 5. Start the dashboard API server.
    let app_state = Arc::new(AppState::new(
        Arc::clone(&fleet),
        Arc::clone(&resolver),
        broadcaster.clone(),
    ));
    let (server_stop_tx, server_stop_rx) = tokio::sync::oneshot::channel::<()>();
    let observer = spawn_observer(
        ServerConfig {
            host: config.server.host.clone(),
            port: config.server.port,
            allowed_origins: config.server.allowed_origins.clone(),
        },
        app_state,
        async move {
            let _ = server_stop_rx.await;
        },
    )
    .await
    .map_err(EngineError::from)?;
    info!(addr = %observer.addr, "Dashboard API server started");

    // 6. Run the mutator loop.
    let mutator = Mutator::new(fleet, resolver, broadcaster.clone());
    let mutator_task = {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            let result = runner::run_mutator(&mutator, &control).await;
            runner::log_mutator_end(&result);
            result
        })
    };

    // Wait for Ctrl-C. The server keeps running after a bounded mutator
    // run finishes on its own.
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown requested");

    control.request_stop();
    let result = mutator_task.await.map_err(|e| EngineError::Task {
        message: format!("mutator task failed: {e}"),
    })?;

    broadcaster.close();
    let _ = server_stop_tx.send(());
    observer.handle.await.map_err(|e| EngineError::Task {
        message: format!("server task failed: {e}"),
    })?;

    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        "robofleet-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from [`CONFIG_PATH`], falling back to defaults.
///
/// Environment overrides apply either way.
fn load_config() -> Result<FleetConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok(FleetConfig::from_file(config_path)?)
    } else {
        let mut config = FleetConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Pick the geocoding backend named by configuration.
fn build_geocoder(config: &GeocoderConfig) -> Result<Arc<dyn Geocoder>, EngineError> {
    if !config.enabled {
        info!("Geocoding disabled, every place name will be unknown");
        return Ok(Arc::new(NullGeocoder));
    }

    let geocoder =
        NominatimGeocoder::from_config(config).map_err(|e| EngineError::Geocoder {
            message: format!("{e}"),
        })?;
    info!(
        base_url = %config.base_url,
        user_agent = %config.user_agent,
        timeout_ms = config.timeout_ms,
        "Nominatim geocoder configured"
    );
    Ok(Arc::new(geocoder))
}
