//! # Geographic Utilities
//!
//! Distance and bounding computations shared by the simplifier, the statistics
//! calculator and the sync coordinator.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points (meters) |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`cumulative_distances_km`] | Running distance along a track in kilometers |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use trip_geodata::{GpsPoint, geo_utils};
//!
//! let track = vec![
//!     GpsPoint::new(0.0, 0.0),
//!     GpsPoint::new(0.0, 0.001),
//!     GpsPoint::new(0.0, 0.002),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! assert!((length - 222.4).abs() < 1.0);
//! ```
//!
//! ## Haversine Formula
//!
//! Distances assume a spherical Earth. `geo`'s haversine uses the mean Earth
//! radius (6,371.0088 km), which differs from the rounded 6,371 km by less
//! than 0.0002%.

use geo::{Distance, Haversine, Point};

use crate::{Bounds, GpsPoint};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Meters per degree of latitude (approximately constant).
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two GPS points, in meters.
///
/// ```rust
/// use trip_geodata::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Great-circle distance between two GPS points, in kilometers.
#[inline]
pub fn haversine_distance_km(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine_distance(p1, p2) / 1000.0
}

/// Total length of a polyline in meters.
///
/// Empty or single-point tracks return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Running distance along a track, in kilometers.
///
/// The result has one entry per input point; the first is always 0.0 and the
/// sequence is non-decreasing.
pub fn cumulative_distances_km(points: &[GpsPoint]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;

    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            total += haversine_distance_km(&points[i - 1], point);
        }
        cumulative.push(total);
    }

    cumulative
}

// =============================================================================
// Bounds
// =============================================================================

/// Bounding box of a track. Returns `None` for an empty slice.
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    Bounds::from_points(points)
}

/// Convert a distance in meters to approximate degrees of latitude/longitude.
///
/// Uses the longitude scale at the given latitude, which is the larger of the
/// two, so the result is conservative when used as a simplification tolerance.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lng_scale = latitude.to_radians().cos().abs().max(1e-6);
    meters / (METERS_PER_DEGREE_LAT * lng_scale)
}

/// Round a coordinate to a fixed number of decimal places.
#[inline]
pub fn round_coordinate(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
