//! # Reverse Geocoding
//!
//! Resolves coordinates to human-readable place names.
//!
//! - [`cache`] - fixed-capacity LRU keyed by coordinates rounded to ~111 m cells
//! - [`provider`] - the provider seam and response parsing
//! - [`rate_limit`] - system-wide spacing of external requests
//! - [`service`] - cache-first resolution with timeout and failure fallback
//! - `nominatim` - the reqwest-backed provider (`http` feature)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TripDataError;
use crate::GpsPoint;

pub mod cache;
pub use cache::{CacheStats, GeocodeCache, GeocodeCacheEntry};

pub mod provider;
pub use provider::{extract_place_name, parse_reverse_response, GeocodeProvider};

pub mod rate_limit;
pub use rate_limit::RateLimiter;

pub mod service;
pub use service::ReverseGeocoder;

#[cfg(feature = "http")]
pub mod nominatim;
#[cfg(feature = "http")]
pub use nominatim::NominatimProvider;

/// A resolved place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Short label chosen from the address components
    pub name: String,
    /// Full provider display name
    pub display_name: String,
    /// Raw address components as returned by the provider
    pub address: BTreeMap<String, String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Where a location's name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceOrigin {
    Resolved,
    Manual,
}

/// A user-confirmed location handed to trip persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub place_name: String,
    pub origin: PlaceOrigin,
}

impl NamedLocation {
    /// A location confirmed from a geocoding result.
    pub fn resolved(place: &Place) -> Self {
        Self {
            latitude: place.latitude,
            longitude: place.longitude,
            place_name: place.name.clone(),
            origin: PlaceOrigin::Resolved,
        }
    }

    /// A location named by hand after a failed or skipped lookup.
    pub fn manual(coordinates: GpsPoint, place_name: impl Into<String>) -> Self {
        Self {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            place_name: place_name.into(),
            origin: PlaceOrigin::Manual,
        }
    }
}

/// Result of a lookup as seen by the interaction layer.
///
/// Failures never propagate as errors here: they become a request to show
/// manual place-name entry.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Resolved(Place),
    ManualEntry {
        coordinates: GpsPoint,
        reason: TripDataError,
        /// Whether offering a retry makes sense
        retriable: bool,
    },
}

impl GeocodeOutcome {
    pub fn from_result(coordinates: GpsPoint, result: crate::Result<Place>) -> Self {
        match result {
            Ok(place) => GeocodeOutcome::Resolved(place),
            Err(reason) => GeocodeOutcome::ManualEntry {
                coordinates,
                retriable: reason.is_retriable(),
                reason,
            },
        }
    }

    pub fn place(&self) -> Option<&Place> {
        match self {
            GeocodeOutcome::Resolved(place) => Some(place),
            GeocodeOutcome::ManualEntry { .. } => None,
        }
    }

    pub fn needs_manual_entry(&self) -> bool {
        matches!(self, GeocodeOutcome::ManualEntry { .. })
    }

    /// Message for the manual-entry prompt, if any.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            GeocodeOutcome::Resolved(_) => None,
            GeocodeOutcome::ManualEntry { reason, .. } => Some(reason.user_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_failure() {
        let coords = GpsPoint::new(46.0, 7.0);
        let outcome = GeocodeOutcome::from_result(coords, Err(TripDataError::RateLimit));
        assert!(outcome.needs_manual_entry());
        assert!(outcome.place().is_none());
        match outcome {
            GeocodeOutcome::ManualEntry { retriable, .. } => assert!(retriable),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_named_location_serializes_origin() {
        let location = NamedLocation::manual(GpsPoint::new(46.0, 7.0), "Col du Pillon");
        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["origin"], "manual");
        assert_eq!(json["place_name"], "Col du Pillon");
    }
}
