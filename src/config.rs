//! Engine configuration.
//!
//! Every section has a `Default` matching production behavior, and all of
//! them deserialize from partial JSON so hosts only override what they need:
//!
//! ```rust
//! use trip_geodata::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "geocode": { "language": "de" } }"#).unwrap();
//! assert_eq!(config.geocode.language, "de");
//! assert_eq!(config.geocode.cache_capacity, 100);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TripDataError};

/// Configuration for track ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Tolerance for Douglas-Peucker simplification (in degrees).
    /// Smaller values preserve more detail. Default: 0.0001 (~11 meters)
    pub simplification_tolerance: f64,

    /// Upper bound on retained points. When set, the tolerance is raised
    /// until the simplified track fits. Default: None
    pub max_points: Option<u32>,

    /// Deviation (meters) from the elevation profile beyond which a point is
    /// kept even when it lies on a straight line on the map. Default: 1.0
    pub elevation_tolerance_m: f64,

    /// Elevation change (meters) that must accumulate before it counts as
    /// gain or loss. Default: 0.0 (no filtering)
    pub elevation_noise_threshold_m: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            simplification_tolerance: 0.0001,
            max_points: None,
            elevation_tolerance_m: 1.0,
            elevation_noise_threshold_m: 0.0,
        }
    }
}

/// Configuration for reverse geocoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    /// Base URL of the Nominatim-compatible provider.
    pub base_url: String,

    /// Identifying client header sent with every request (provider policy).
    pub user_agent: String,

    /// Preferred language for place names. Default: "en"
    pub language: String,

    /// Per-request time budget. Default: 10000 ms
    pub timeout_ms: u64,

    /// Number of cached coordinate cells. Default: 100
    pub cache_capacity: usize,

    /// Minimum spacing between external requests. Default: 1000 ms (1 req/s)
    pub min_request_interval_ms: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("trip-geodata/", env!("CARGO_PKG_VERSION")).to_string(),
            language: "en".to_string(),
            timeout_ms: 10_000,
            cache_capacity: 100,
            min_request_interval_ms: 1_000,
        }
    }
}

impl GeocodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

/// Configuration for debounced lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period before the last update is forwarded. Default: 1000 ms
    pub quiet_period_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: 1_000,
        }
    }
}

impl DebounceConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

/// Configuration for map/profile synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Map zoom requested when a profile point is clicked. Default: 15
    pub click_zoom: f64,

    /// Re-center animation length. Default: 500 ms
    pub animation_duration_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            click_zoom: 15.0,
            animation_duration_ms: 500,
        }
    }
}

impl SyncConfig {
    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub track: TrackConfig,
    pub geocode: GeocodeConfig,
    pub debounce: DebounceConfig,
    pub sync: SyncConfig,
}

impl EngineConfig {
    /// Load a configuration from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| TripDataError::config(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let track = &self.track;
        if !track.simplification_tolerance.is_finite() || track.simplification_tolerance < 0.0 {
            return Err(TripDataError::config(
                "simplification_tolerance must be a non-negative number",
            ));
        }
        if track.max_points.is_some_and(|n| n < 2) {
            return Err(TripDataError::config("max_points must be at least 2"));
        }
        if !track.elevation_tolerance_m.is_finite() || track.elevation_tolerance_m < 0.0 {
            return Err(TripDataError::config(
                "elevation_tolerance_m must be a non-negative number",
            ));
        }
        if !track.elevation_noise_threshold_m.is_finite() || track.elevation_noise_threshold_m < 0.0
        {
            return Err(TripDataError::config(
                "elevation_noise_threshold_m must be a non-negative number",
            ));
        }

        let geocode = &self.geocode;
        if geocode.cache_capacity == 0 {
            return Err(TripDataError::config("cache_capacity must be at least 1"));
        }
        if geocode.timeout_ms == 0 {
            return Err(TripDataError::config("timeout_ms must be positive"));
        }
        if geocode.user_agent.trim().is_empty() {
            return Err(TripDataError::config(
                "user_agent is required by the geocoding provider",
            ));
        }

        if !self.sync.click_zoom.is_finite() || self.sync.click_zoom < 0.0 {
            return Err(TripDataError::config("click_zoom must be non-negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.geocode.timeout(), Duration::from_secs(10));
        assert_eq!(config.geocode.min_request_interval(), Duration::from_secs(1));
        assert_eq!(config.debounce.quiet_period(), Duration::from_millis(1000));
        assert_eq!(config.sync.animation_duration(), Duration::from_millis(500));
        assert_eq!(config.track.elevation_noise_threshold_m, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_override() {
        let config = EngineConfig::from_json_str(
            r#"{ "track": { "max_points": 500 }, "debounce": { "quiet_period_ms": 250 } }"#,
        )
        .unwrap();
        assert_eq!(config.track.max_points, Some(500));
        assert_eq!(config.track.simplification_tolerance, 0.0001);
        assert_eq!(config.debounce.quiet_period_ms, 250);
    }

    #[test]
    fn test_rejects_negative_elevation_tolerance() {
        let result =
            EngineConfig::from_json_str(r#"{ "track": { "elevation_tolerance_m": -2.0 } }"#);
        assert!(matches!(result, Err(TripDataError::Config { .. })));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = EngineConfig::from_json_str(r#"{ "geocode": { "cache_capacity": 0 } }"#);
        assert!(matches!(result, Err(TripDataError::Config { .. })));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(EngineConfig::from_json_str("{ not json").is_err());
    }
}
