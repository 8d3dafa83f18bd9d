//! Nominatim-backed reverse geocoder.
//!
//! [`NominatimGeocoder`] implements the [`Geocoder`] trait against the
//! OpenStreetMap Nominatim `reverse` endpoint:
//!
//! `GET {base_url}/reverse?format=jsonv2&lat=..&lon=..&accept-language=..`
//!
//! The place name is the response's `display_name`. Nominatim answers
//! unknown positions with `200 {"error": "Unable to geocode"}`, which maps
//! to "no name" rather than a failure. Nominatim's usage policy requires
//! an identifying `User-Agent`, which is set on every request.

use std::time::Duration;

use robofleet_core::config::GeocoderConfig;
use robofleet_core::resolver::{GeocodeError, GeocodeFuture, Geocoder};
use robofleet_types::Coordinates;
use serde::Deserialize;
use tracing::debug;

/// Body of a Nominatim `reverse` response. Only the fields we read.
#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    error: Option<String>,
}

/// A geocoder that calls a Nominatim server over HTTP.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    /// Shared HTTP client (connection pool, user agent, timeout).
    client: reqwest::Client,
    /// `{base_url}/reverse`, computed once.
    reverse_url: String,
    /// Value of the `accept-language` query parameter.
    language: String,
}

impl NominatimGeocoder {
    /// Build a geocoder from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Request`] if the HTTP client cannot be built.
    pub fn from_config(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GeocodeError::Request {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            reverse_url: reverse_url(&config.base_url),
            language: config.language.clone(),
        })
    }

    async fn lookup(&self, coordinates: Coordinates) -> Result<Option<String>, GeocodeError> {
        let lat = coordinates.lat().to_string();
        let lon = coordinates.lon().to_string();

        let response = self
            .client
            .get(&self.reverse_url)
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("accept-language", self.language.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GeocodeError::Request {
                message: format!("{e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| GeocodeError::Request {
            message: format!("failed to read body: {e}"),
        })?;

        parse_reverse_body(&body)
    }
}

impl Geocoder for NominatimGeocoder {
    fn reverse(&self, coordinates: Coordinates) -> GeocodeFuture<'_> {
        Box::pin(self.lookup(coordinates))
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

fn reverse_url(base_url: &str) -> String {
    format!("{}/reverse", base_url.trim_end_matches('/'))
}

/// Extract the place name from a `reverse` response body.
fn parse_reverse_body(body: &str) -> Result<Option<String>, GeocodeError> {
    let parsed: ReverseResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Decode {
            message: format!("{e}"),
        })?;

    if let Some(error) = parsed.error {
        debug!(error = %error, "nominatim has no place for coordinates");
        return Ok(None);
    }

    Ok(parsed
        .display_name
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty()))
}
