//! # Trip Geodata
//!
//! Geospatial engine behind trip maps with a synchronized elevation profile.
//!
//! This library provides:
//! - Track ingestion (GPX or JSON point lists) with coordinate validation
//! - Douglas-Peucker simplification with a bounded deviation
//! - Route statistics: distance, elevation gain/loss, per-segment gradient
//! - Reverse geocoding with an LRU cache, a 1 req/s rate ceiling and
//!   debounced lookups for interactive sources
//! - A coordinator that keeps a map view and an elevation chart in sync
//!
//! ## Features
//!
//! - **`http`** (default) - reqwest-backed Nominatim provider
//!
//! ## Quick Start
//!
//! ```rust
//! use trip_geodata::{process_track, TrackConfig};
//!
//! let gpx = br#"<?xml version="1.0"?>
//! <gpx version="1.1" creator="example" xmlns="http://www.topografix.com/GPX/1/1">
//!   <trk><trkseg>
//!     <trkpt lat="0.0" lon="0.000"><ele>0</ele></trkpt>
//!     <trkpt lat="0.0" lon="0.001"><ele>10</ele></trkpt>
//!     <trkpt lat="0.0" lon="0.002"><ele>0</ele></trkpt>
//!   </trkseg></trk>
//! </gpx>"#;
//!
//! let track = process_track(gpx, &TrackConfig::default()).unwrap();
//! assert!(track.statistics.has_elevation);
//! assert_eq!(track.statistics.elevation_gain_m, Some(10.0));
//! assert_eq!(track.statistics.elevation_loss_m, Some(10.0));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Fallback, OptionExt, Result, TripDataError};

// Engine configuration
pub mod config;
pub use config::{DebounceConfig, EngineConfig, GeocodeConfig, SyncConfig, TrackConfig};

// Geographic utilities (distance, bounds)
pub mod geo_utils;

// Track file parsing (GPX, JSON point lists)
pub mod parser;
pub use parser::{parse_gpx, parse_json_points, parse_track};

// Douglas-Peucker simplification and point annotation
pub mod simplify;
pub use simplify::{simplify_points, simplify_to_max_points, tolerance_for_max_points};

// Gradient classification
pub mod gradient;
pub use gradient::{GradientBucket, GradientDirection};

// Route statistics
pub mod stats;
pub use stats::{compute_statistics, segment_gradient, RouteStatistics};

// Parse -> simplify -> statistics
pub mod pipeline;
pub use pipeline::{process_track, process_track_off_thread, ProcessedTrack};

// Reverse geocoding: cache, provider, rate limiting, service
pub mod geocode;
pub use geocode::{
    CacheStats, GeocodeCache, GeocodeOutcome, GeocodeProvider, NamedLocation, Place, PlaceOrigin,
    ReverseGeocoder,
};

// Debounced lookup scheduling
pub mod debounce;
pub use debounce::{DebounceScheduler, LookupRequest, LookupState, SourceId};

// Map <-> elevation profile synchronization
pub mod sync;
pub use sync::{SyncCoordinator, SyncEvent, SyncPhase, SyncState, ViewCommand};

// Explicit engine owning the shared geocoding state
pub mod engine;
pub use engine::{GeoEngine, InteractionSession, LookupResult};

/// Initialize logging for Android hosts.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TripGeodataRust"),
    );
}

/// Hosts other than Android install their own `log` backend.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use trip_geodata::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Validate the coordinates, reporting a `Validation` error when out of range.
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        let message = if !self.latitude.is_finite() || !self.longitude.is_finite() {
            "coordinates must be finite numbers"
        } else if !(-90.0..=90.0).contains(&self.latitude) {
            "latitude must be within [-90, 90]"
        } else {
            "longitude must be within [-180, 180]"
        };
        Err(TripDataError::Validation {
            latitude: self.latitude,
            longitude: self.longitude,
            message: message.to_string(),
        })
    }
}

/// One sample as read from a track file, before any derived data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters, when recorded
    pub elevation: Option<f64>,
    /// Sample time, when recorded
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawPoint {
    pub fn new(latitude: f64, longitude: f64, elevation: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
            timestamp: None,
        }
    }

    pub fn coordinates(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// A retained point of a processed track, annotated for rendering.
///
/// Produced once by the pipeline and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Distance from the first point, along the simplified track
    pub cumulative_distance_km: f64,
    /// Slope of the segment ending at this point, in percent.
    /// `None` for the first point or when either endpoint lacks elevation.
    pub gradient_pct: Option<f64>,
    pub gradient_bucket: Option<GradientBucket>,
}

impl TrackPoint {
    pub fn coordinates(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Bounding box for a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
