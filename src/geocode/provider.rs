//! Reverse geocoding provider seam and response parsing.
//!
//! Providers answer with a JSON body holding a full display name and
//! structured address components. [`extract_place_name`] turns that into a
//! short label by walking address fields from most to least specific, so
//! some human-readable label comes out whenever the provider knows anything
//! about the location.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::Place;
use crate::error::{Result, TripDataError};
use crate::GpsPoint;

/// Address fields consulted for the label, most specific first.
pub const PLACE_NAME_FIELDS: &[&str] = &[
    // point of interest
    "amenity",
    "tourism",
    "leisure",
    "shop",
    "historic",
    "natural",
    "building",
    // road
    "road",
    "pedestrian",
    "path",
    "cycleway",
    // settlement
    "city",
    "town",
    "village",
    "hamlet",
    "suburb",
    "municipality",
    // region
    "county",
    "state",
    // country
    "country",
];

/// A source of reverse geocoding answers.
///
/// Implementations perform exactly one external request per call and do not
/// retry; caching, rate limiting and timeouts are handled by
/// [`super::ReverseGeocoder`].
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Resolve coordinates to a place.
    async fn reverse(&self, coordinates: GpsPoint) -> Result<Place>;

    /// Short identifier for logs.
    fn name(&self) -> &str {
        "provider"
    }
}

/// Nominatim `jsonv2` reverse response.
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Parse a provider body into a [`Place`] for the queried coordinates.
pub fn parse_reverse_response(body: &str, query: GpsPoint) -> Result<Place> {
    let response: ReverseResponse =
        serde_json::from_str(body).map_err(|e| TripDataError::GeocodeParse {
            message: e.to_string(),
        })?;

    if response.error.is_some() {
        return Err(TripDataError::GeocodeNotFound {
            latitude: query.latitude,
            longitude: query.longitude,
        });
    }

    // Keep textual components only; providers occasionally add numeric extras
    let address: BTreeMap<String, String> = response
        .address
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some((k, s)),
            _ => None,
        })
        .collect();

    let name = extract_place_name(
        response.name.as_deref(),
        &address,
        response.display_name.as_deref(),
    )
    .ok_or(TripDataError::GeocodeNotFound {
        latitude: query.latitude,
        longitude: query.longitude,
    })?;

    Ok(Place {
        display_name: response.display_name.unwrap_or_else(|| name.clone()),
        name,
        address,
        latitude: query.latitude,
        longitude: query.longitude,
    })
}

/// Pick the most specific available label.
///
/// Order: the place's own name, point-of-interest fields, road, settlement,
/// region, country, then the first component of the display name.
pub fn extract_place_name(
    name: Option<&str>,
    address: &BTreeMap<String, String>,
    display_name: Option<&str>,
) -> Option<String> {
    let non_empty = |s: &&str| !s.trim().is_empty();

    name.filter(non_empty)
        .map(|s| s.trim().to_string())
        .or_else(|| {
            PLACE_NAME_FIELDS
                .iter()
                .filter_map(|field| address.get(*field))
                .map(|s| s.trim())
                .find(|s| !s.is_empty())
                .map(str::to_string)
        })
        .or_else(|| {
            display_name
                .and_then(|d| d.split(',').next())
                .filter(non_empty)
                .map(|s| s.trim().to_string())
        })
}
