//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and shutdown.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: robofleet_core::config::ConfigError,
    },

    /// The geocoding client could not be built.
    #[error("geocoder error: {message}")]
    Geocoder {
        /// Description of the geocoder failure.
        message: String,
    },

    /// Dashboard API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: robofleet_observer::startup::StartupError,
    },

    /// A background task could not be joined.
    #[error("task error: {message}")]
    Task {
        /// Description of the join failure.
        message: String,
    },
}
