//! HTTP client for Nominatim-compatible reverse geocoding.
//!
//! One `GET /reverse` per call. The provider's usage policy requires an
//! identifying User-Agent and at most one request per second; the latter is
//! enforced by the [`super::RateLimiter`] owned by the service.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};

use super::provider::{parse_reverse_response, GeocodeProvider};
use super::Place;
use crate::error::{Result, TripDataError};
use crate::{GeocodeConfig, GpsPoint};

/// Reverse geocoding against a Nominatim server.
pub struct NominatimProvider {
    client: Client,
    reverse_url: String,
    language: String,
    timeout: Duration,
}

impl NominatimProvider {
    /// Create a provider from the geocoding configuration.
    pub fn new(config: &GeocodeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| TripDataError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            reverse_url: format!("{}/reverse", config.base_url.trim_end_matches('/')),
            language: config.language.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn reverse_url(&self) -> &str {
        &self.reverse_url
    }

    fn transport_error(&self, e: reqwest::Error) -> TripDataError {
        if e.is_timeout() {
            TripDataError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            TripDataError::Network {
                message: format!("Request error: {}", e),
                status_code: e.status().map(|s| s.as_u16()),
            }
        }
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    async fn reverse(&self, coordinates: GpsPoint) -> Result<Place> {
        let lat = coordinates.latitude.to_string();
        let lon = coordinates.longitude.to_string();

        debug!("[Nominatim] GET {} lat={} lon={}", self.reverse_url, lat, lon);

        let response = self
            .client
            .get(&self.reverse_url)
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("accept-language", self.language.as_str()),
                ("addressdetails", "1"),
            ])
            .header(reqwest::header::ACCEPT_LANGUAGE, self.language.as_str())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("[Nominatim] 429 for ({}, {})", lat, lon);
            return Err(TripDataError::RateLimit);
        }
        if !status.is_success() {
            return Err(TripDataError::Network {
                message: format!("HTTP {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        parse_reverse_response(&body, coordinates)
    }

    fn name(&self) -> &str {
        "nominatim"
    }
}
