//! Place-name resolution for device coordinates.
//!
//! The [`Geocoder`] trait abstracts the external reverse-geocoding lookup.
//! It could be an HTTP service, a fixed table, or nothing at all.
//! [`LocationResolver`] wraps a geocoder with a deadline and converts every
//! failure into [`UNKNOWN_LOCATION`], so callers always get a string.
//!
//! Geocoder futures are boxed so the trait stays dyn-compatible and a single
//! `Arc<dyn Geocoder>` can be shared by the mutator and request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use robofleet_types::{Coordinates, UNKNOWN_LOCATION};
use tracing::{debug, warn};

/// Errors a geocoder may report. Never escapes [`LocationResolver`].
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    /// The request could not be sent or the connection failed.
    #[error("geocoder request failed: {message}")]
    Request {
        /// Description of the transport failure.
        message: String,
    },

    /// The service answered with a non-success status.
    #[error("geocoder returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("geocoder response could not be decoded: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },
}

/// Future returned by [`Geocoder::reverse`].
///
/// `Ok(None)` means the service had no name for these coordinates.
pub type GeocodeFuture<'a> = BoxFuture<'a, Result<Option<String>, GeocodeError>>;

/// A reverse-geocoding backend.
pub trait Geocoder: Send + Sync {
    /// Look up a place name for the given coordinates.
    fn reverse(&self, coordinates: Coordinates) -> GeocodeFuture<'_>;

    /// Human-readable backend name for logging.
    fn name(&self) -> &'static str;
}

/// Resolves coordinates to place names, never failing.
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    timeout: Duration,
}

impl LocationResolver {
    /// Wrap a geocoder with a per-lookup deadline.
    pub fn new(geocoder: Arc<dyn Geocoder>, timeout: Duration) -> Self {
        Self { geocoder, timeout }
    }

    /// A resolver that always yields [`UNKNOWN_LOCATION`].
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullGeocoder), Duration::from_secs(1))
    }

    /// The per-lookup deadline.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve an optional position.
    ///
    /// Absent or out-of-range coordinates skip the lookup entirely.
    pub async fn resolve(&self, coordinates: Option<Coordinates>) -> String {
        let Some(coordinates) = coordinates else {
            return UNKNOWN_LOCATION.to_owned();
        };
        if !coordinates.is_valid() {
            warn!(
                lat = coordinates.lat(),
                lon = coordinates.lon(),
                "invalid coordinates, skipping geocoding"
            );
            return UNKNOWN_LOCATION.to_owned();
        }

        match tokio::time::timeout(self.timeout, self.geocoder.reverse(coordinates)).await {
            Ok(Ok(Some(name))) if !name.trim().is_empty() => name,
            Ok(Ok(_)) => {
                debug!(
                    geocoder = self.geocoder.name(),
                    lat = coordinates.lat(),
                    lon = coordinates.lon(),
                    "no place name for coordinates"
                );
                UNKNOWN_LOCATION.to_owned()
            }
            Ok(Err(e)) => {
                warn!(geocoder = self.geocoder.name(), error = %e, "geocoding failed");
                UNKNOWN_LOCATION.to_owned()
            }
            Err(_elapsed) => {
                warn!(
                    geocoder = self.geocoder.name(),
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "geocoding timed out"
                );
                UNKNOWN_LOCATION.to_owned()
            }
        }
    }

    /// Resolve a raw latitude/longitude pair.
    pub async fn resolve_coordinates(&self, lat: f64, lon: f64) -> String {
        self.resolve(Some(Coordinates(lat, lon))).await
    }
}

impl core::fmt::Debug for LocationResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocationResolver")
            .field("geocoder", &self.geocoder.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A geocoder that never knows any place.
///
/// Used when geocoding is disabled in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGeocoder;

impl Geocoder for NullGeocoder {
    fn reverse(&self, _coordinates: Coordinates) -> GeocodeFuture<'_> {
        Box::pin(async { Ok(None) })
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// A scripted answer for [`FixedGeocoder`].
#[derive(Debug, Clone)]
pub enum FixedAnswer {
    /// Resolve to this name immediately.
    Place(String),
    /// Report that no name exists.
    Nothing,
    /// Fail with a request error.
    Fail,
    /// Resolve to `name` after waiting `after`.
    Delayed {
        /// How long to wait before answering.
        after: Duration,
        /// The name to answer with.
        name: String,
    },
    /// Never answer.
    Hang,
}

/// A table-driven geocoder for tests and offline runs.
///
/// Coordinates are matched exactly; anything not in the table gets the
/// default answer.
#[derive(Debug)]
pub struct FixedGeocoder {
    answers: BTreeMap<(u64, u64), FixedAnswer>,
    default: FixedAnswer,
    calls: AtomicUsize,
}

impl FixedGeocoder {
    /// Create a geocoder whose default answer is [`FixedAnswer::Nothing`].
    pub const fn new() -> Self {
        Self {
            answers: BTreeMap::new(),
            default: FixedAnswer::Nothing,
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the answer for coordinates not in the table.
    #[must_use]
    pub fn with_default(mut self, answer: FixedAnswer) -> Self {
        self.default = answer;
        self
    }

    /// Script the answer for one position.
    #[must_use]
    pub fn with(mut self, coordinates: Coordinates, answer: FixedAnswer) -> Self {
        self.answers.insert(table_key(coordinates), answer);
        self
    }

    /// Number of lookups performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

impl Default for FixedGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder for FixedGeocoder {
    fn reverse(&self, coordinates: Coordinates) -> GeocodeFuture<'_> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let answer = self
            .answers
            .get(&table_key(coordinates))
            .unwrap_or(&self.default)
            .clone();

        Box::pin(async move {
            match answer {
                FixedAnswer::Place(name) => Ok(Some(name)),
                FixedAnswer::Nothing => Ok(None),
                FixedAnswer::Fail => Err(GeocodeError::Request {
                    message: String::from("scripted failure"),
                }),
                FixedAnswer::Delayed { after, name } => {
                    tokio::time::sleep(after).await;
                    Ok(Some(name))
                }
                FixedAnswer::Hang => std::future::pending().await,
            }
        })
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

const fn table_key(coordinates: Coordinates) -> (u64, u64) {
    (coordinates.0.to_bits(), coordinates.1.to_bits())
}
