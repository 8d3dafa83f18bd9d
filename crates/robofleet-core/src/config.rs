//! Configuration loading and typed config structures for Robofleet.
//!
//! The canonical configuration lives in `robofleet-config.yaml` in the
//! working directory. This module defines strongly-typed structs that
//! mirror the YAML structure and provides a loader that reads, applies
//! environment overrides to, and validates the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level service configuration.
///
/// Mirrors the structure of `robofleet-config.yaml`. Every section is
/// optional and falls back to the defaults below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FleetConfig {
    /// Tick cadence and bounds.
    #[serde(default)]
    pub mutator: MutatorConfig,

    /// Reverse-geocoding backend.
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// Live-stream fan-out settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Seed data location.
    #[serde(default)]
    pub seed: SeedConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FleetConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `ROBOFLEET_PORT` overrides `server.port`
    /// - `ROBOFLEET_SEED_PATH` overrides `seed.path`
    /// - `NOMINATIM_URL` overrides `geocoder.base_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ROBOFLEET_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => {
                    tracing::warn!(value = %val, error = %e, "ignoring invalid ROBOFLEET_PORT");
                }
            }
        }
        if let Ok(val) = std::env::var("ROBOFLEET_SEED_PATH") {
            self.seed.path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("NOMINATIM_URL") {
            self.geocoder.base_url = val;
        }
    }

    /// Check value ranges that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "broadcast.subscriber_buffer",
                reason: String::from("must be at least 1"),
            });
        }
        if self.geocoder.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "geocoder.timeout_ms",
                reason: String::from("must be at least 1"),
            });
        }
        Ok(())
    }
}

/// Tick cadence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MutatorConfig {
    /// Milliseconds between tick starts.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop after this many ticks (0 = run until shutdown).
    #[serde(default)]
    pub max_ticks: u64,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
        }
    }
}

/// Reverse-geocoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeocoderConfig {
    /// When false, every lookup yields the fallback place name.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the Nominatim-compatible service.
    #[serde(default = "default_geocoder_url")]
    pub base_url: String,

    /// `User-Agent` header sent with every lookup.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-lookup timeout in milliseconds.
    #[serde(default = "default_geocoder_timeout_ms")]
    pub timeout_ms: u64,

    /// Preferred language for place names.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_geocoder_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_geocoder_timeout_ms(),
            language: default_language(),
        }
    }
}

/// Live-stream fan-out configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Snapshots queued per subscriber before it is considered stalled.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Seed data configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedConfig {
    /// Path of the JSON seed file.
    #[serde(default = "default_seed_path")]
    pub path: PathBuf,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            path: default_seed_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_tick_interval_ms() -> u64 {
    5_000
}

fn default_geocoder_url() -> String {
    String::from("https://nominatim.openstreetmap.org")
}

fn default_user_agent() -> String {
    String::from("robot-dashboard")
}

const fn default_geocoder_timeout_ms() -> u64 {
    10_000
}

fn default_language() -> String {
    String::from("en")
}

const fn default_subscriber_buffer() -> usize {
    16
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec![String::from("http://localhost:3000")]
}

fn default_seed_path() -> PathBuf {
    PathBuf::from("json/fake_robot_data.json")
}

fn default_log_level() -> String {
    String::from("info")
}
