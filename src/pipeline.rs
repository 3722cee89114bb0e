//! Ingestion pipeline: parse, simplify, compute statistics.
//!
//! The pipeline is all-or-nothing: a parse or validation failure produces a
//! single error and no partial track.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TripDataError};
use crate::geo_utils::compute_bounds;
use crate::parser::parse_track;
use crate::simplify::simplify_track;
use crate::stats::{compute_statistics, RouteStatistics};
use crate::{Bounds, GpsPoint, RawPoint, TrackConfig, TrackPoint};

/// A renderable track with its statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTrack {
    /// Simplified, annotated points in track order
    pub points: Vec<TrackPoint>,
    /// Statistics over the simplified points
    pub statistics: RouteStatistics,
    /// Number of points before simplification
    pub original_point_count: usize,
    /// Pre-computed bounding box for initial map framing
    pub bounds: Bounds,
    pub center: GpsPoint,
}

impl ProcessedTrack {
    pub fn positions(&self) -> Vec<GpsPoint> {
        self.points.iter().map(|p| p.coordinates()).collect()
    }
}

/// Parse raw track bytes and derive the renderable track.
pub fn process_track(bytes: &[u8], config: &TrackConfig) -> Result<ProcessedTrack> {
    let raw = parse_track(bytes).map_err(|e| {
        warn!("[TrackPipeline] Rejected track: {}", e);
        e
    })?;
    process_points(&raw, config)
}

/// Derive the renderable track from already parsed points.
///
/// Also used after an edit: statistics are always recomputed from scratch.
pub fn process_points(raw: &[RawPoint], config: &TrackConfig) -> Result<ProcessedTrack> {
    if raw.is_empty() {
        return Err(TripDataError::parse("track contains no points"));
    }
    if let Some(index) = raw.iter().position(|p| !p.coordinates().is_valid()) {
        return Err(TripDataError::parse(format!(
            "point {} has coordinates outside the valid range",
            index
        )));
    }

    let points = simplify_track(raw, config);
    let statistics = compute_statistics(&points, config.elevation_noise_threshold_m);

    let positions: Vec<GpsPoint> = points.iter().map(|p| p.coordinates()).collect();
    let bounds = compute_bounds(&positions).ok_or_parse("track contains no points")?;

    info!(
        "[TrackPipeline] {} points -> {} retained, {:.2} km, elevation: {}",
        raw.len(),
        points.len(),
        statistics.total_distance_km,
        statistics.has_elevation
    );

    Ok(ProcessedTrack {
        center: bounds.center(),
        bounds,
        points,
        statistics,
        original_point_count: raw.len(),
    })
}

/// Run the whole pipeline as one blocking unit off the async executor.
pub async fn process_track_off_thread(
    bytes: Vec<u8>,
    config: TrackConfig,
) -> Result<ProcessedTrack> {
    tokio::task::spawn_blocking(move || process_track(&bytes, &config))
        .await
        .map_err(|e| TripDataError::parse(format!("track processing was interrupted: {}", e)))?
}
