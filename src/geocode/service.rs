//! Cache-first reverse geocoding.
//!
//! A lookup checks the shared [`GeocodeCache`] first. On a miss it waits for
//! the shared [`RateLimiter`], issues exactly one provider request, and caches
//! the result on success. The configured timeout bounds the wait and the
//! request together. Failures are returned once and never retried
//! automatically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use super::cache::GeocodeCache;
use super::provider::GeocodeProvider;
use super::rate_limit::RateLimiter;
use super::{GeocodeOutcome, Place};
use crate::error::{Result, TripDataError};
use crate::{GeocodeConfig, GpsPoint};

/// Resolves coordinates to place names.
pub struct ReverseGeocoder {
    cache: Arc<GeocodeCache>,
    provider: Arc<dyn GeocodeProvider>,
    rate_limiter: RateLimiter,
    timeout: Duration,
    external_calls: AtomicU64,
}

impl ReverseGeocoder {
    pub fn new(
        cache: Arc<GeocodeCache>,
        provider: Arc<dyn GeocodeProvider>,
        config: &GeocodeConfig,
    ) -> Self {
        Self {
            cache,
            provider,
            rate_limiter: RateLimiter::with_min_interval(config.min_request_interval()),
            timeout: config.timeout(),
            external_calls: AtomicU64::new(0),
        }
    }

    /// A geocoder backed by the Nominatim HTTP provider.
    #[cfg(feature = "http")]
    pub fn nominatim(cache: Arc<GeocodeCache>, config: &GeocodeConfig) -> Result<Self> {
        let provider = super::nominatim::NominatimProvider::new(config)?;
        Ok(Self::new(cache, Arc::new(provider), config))
    }

    pub fn cache(&self) -> &Arc<GeocodeCache> {
        &self.cache
    }

    /// Number of provider requests issued so far.
    pub fn external_calls(&self) -> u64 {
        self.external_calls.load(Ordering::Relaxed)
    }

    /// Resolve coordinates, cache first.
    pub async fn resolve(&self, coordinates: GpsPoint) -> Result<Place> {
        match self.resolve_while(coordinates, || true).await {
            Some(result) => result,
            // Never abandoned, the predicate always holds
            None => Err(TripDataError::GeocodeNotFound {
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
            }),
        }
    }

    /// Resolve coordinates while `still_wanted` holds.
    ///
    /// The predicate is checked before the lookup and again once the rate
    /// limiter admits it. Returns `None` when the lookup was abandoned, in
    /// which case the provider was never called.
    pub async fn resolve_while<F>(
        &self,
        coordinates: GpsPoint,
        still_wanted: F,
    ) -> Option<Result<Place>>
    where
        F: Fn() -> bool,
    {
        if let Err(e) = coordinates.validate() {
            return Some(Err(e));
        }
        let GpsPoint {
            latitude,
            longitude,
        } = coordinates;

        if !still_wanted() {
            return None;
        }

        if let Some(place) = self.cache.get(latitude, longitude) {
            debug!(
                "[ReverseGeocoder] Cache hit for ({:.5}, {:.5})",
                latitude, longitude
            );
            return Some(Ok(Self::at(place, coordinates)));
        }

        let deadline = Instant::now() + self.timeout;

        let cooldown = self.rate_limiter.cooldown_remaining().await;
        if cooldown > self.timeout {
            warn!(
                "[ReverseGeocoder] Provider cool-down of {:?} outlasts the lookup budget",
                cooldown
            );
            return Some(Err(TripDataError::RateLimit));
        }

        let admitted = tokio::time::timeout_at(deadline, self.rate_limiter.acquire()).await;
        let reservation = match admitted {
            Ok(reservation) => reservation,
            Err(_) => {
                warn!(
                    "[ReverseGeocoder] Lookup for ({:.5}, {:.5}) queued past its budget",
                    latitude, longitude
                );
                return Some(Err(self.timeout_error()));
            }
        };

        if !still_wanted() {
            self.rate_limiter.release(reservation).await;
            debug!(
                "[ReverseGeocoder] Dropped superseded lookup for ({:.5}, {:.5})",
                latitude, longitude
            );
            return None;
        }

        // Another caller may have filled the cell while we waited
        if let Some(place) = self.cache.get_if_present(latitude, longitude) {
            self.rate_limiter.release(reservation).await;
            return Some(Ok(Self::at(place, coordinates)));
        }

        self.external_calls.fetch_add(1, Ordering::Relaxed);
        let response = tokio::time::timeout_at(deadline, self.provider.reverse(coordinates)).await;
        let result = match response {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        };

        Some(self.settle(coordinates, result).await)
    }

    async fn settle(&self, coordinates: GpsPoint, result: Result<Place>) -> Result<Place> {
        let GpsPoint {
            latitude,
            longitude,
        } = coordinates;

        match result {
            Ok(place) => {
                self.rate_limiter.record_success();
                info!(
                    "[ReverseGeocoder] ({:.5}, {:.5}) -> {} via {}",
                    latitude,
                    longitude,
                    place.name,
                    self.provider.name()
                );
                self.cache.set(latitude, longitude, place.clone());
                Ok(place)
            }
            Err(TripDataError::RateLimit) => {
                let backoff = self.rate_limiter.record_rate_limited().await;
                warn!(
                    "[ReverseGeocoder] Provider rate limit hit, holding requests for {:?}",
                    backoff
                );
                Err(TripDataError::RateLimit)
            }
            Err(e) => {
                warn!(
                    "[ReverseGeocoder] Lookup for ({:.5}, {:.5}) failed: {}",
                    latitude, longitude, e
                );
                Err(e)
            }
        }
    }

    /// Resolve coordinates, turning any failure into a manual-entry outcome.
    pub async fn resolve_or_manual(&self, coordinates: GpsPoint) -> GeocodeOutcome {
        GeocodeOutcome::from_result(coordinates, self.resolve(coordinates).await)
    }

    fn timeout_error(&self) -> TripDataError {
        TripDataError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// A cached place reported at the coordinates that were asked for.
    fn at(place: Place, coordinates: GpsPoint) -> Place {
        Place {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            ..place
        }
    }
}
