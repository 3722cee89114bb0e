//! Route statistics: distance, elevation gain/loss, altitude range, gradient.
//!
//! Statistics are computed once per track and recomputed wholesale after an
//! edit. Elevation figures are only reported when every point carries an
//! elevation; otherwise they are `None` and the profile view shows its
//! "no elevation data" state instead of zeros.

use serde::{Deserialize, Serialize};

use crate::geo_utils::polyline_length;
use crate::{GpsPoint, RawPoint, TrackPoint};

/// Anything with a position and an optional elevation.
pub trait ElevationSample {
    fn position(&self) -> GpsPoint;
    fn elevation_m(&self) -> Option<f64>;
}

impl ElevationSample for RawPoint {
    fn position(&self) -> GpsPoint {
        self.coordinates()
    }

    fn elevation_m(&self) -> Option<f64> {
        self.elevation
    }
}

impl ElevationSample for TrackPoint {
    fn position(&self) -> GpsPoint {
        self.coordinates()
    }

    fn elevation_m(&self) -> Option<f64> {
        self.elevation
    }
}

/// Summary figures for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStatistics {
    pub total_distance_km: f64,
    pub elevation_gain_m: Option<f64>,
    pub elevation_loss_m: Option<f64>,
    pub max_altitude_m: Option<f64>,
    pub min_altitude_m: Option<f64>,
    /// True only if every point carries an elevation
    pub has_elevation: bool,
    pub point_count: usize,
}

impl RouteStatistics {
    /// Statistics of an empty track.
    pub fn empty() -> Self {
        Self {
            total_distance_km: 0.0,
            elevation_gain_m: None,
            elevation_loss_m: None,
            max_altitude_m: None,
            min_altitude_m: None,
            has_elevation: false,
            point_count: 0,
        }
    }
}

/// Compute statistics for an ordered point sequence.
///
/// `noise_threshold_m` is the elevation change that must accumulate against
/// the last counted elevation before it is added to gain or loss. Zero
/// disables filtering, which makes gain and loss the plain sums of positive
/// and negative deltas.
pub fn compute_statistics<P: ElevationSample>(
    points: &[P],
    noise_threshold_m: f64,
) -> RouteStatistics {
    if points.is_empty() {
        return RouteStatistics::empty();
    }

    let positions: Vec<GpsPoint> = points.iter().map(|p| p.position()).collect();
    let total_distance_km = polyline_length(&positions) / 1000.0;

    let elevations: Option<Vec<f64>> = points.iter().map(|p| p.elevation_m()).collect();

    let mut stats = RouteStatistics {
        total_distance_km,
        point_count: points.len(),
        ..RouteStatistics::empty()
    };

    if let Some(elevations) = elevations {
        let (gain, loss) = elevation_gain_loss(&elevations, noise_threshold_m.max(0.0));
        stats.has_elevation = true;
        stats.elevation_gain_m = Some(gain);
        stats.elevation_loss_m = Some(loss);
        stats.max_altitude_m = elevations.iter().copied().reduce(f64::max);
        stats.min_altitude_m = elevations.iter().copied().reduce(f64::min);
    }

    stats
}

/// Gain and loss over a fully populated elevation series.
fn elevation_gain_loss(elevations: &[f64], threshold: f64) -> (f64, f64) {
    let mut gain = 0.0;
    let mut loss = 0.0;
    let mut reference = match elevations.first() {
        Some(&e) => e,
        None => return (gain, loss),
    };

    for &elevation in &elevations[1..] {
        let delta = elevation - reference;
        if delta >= threshold && delta > 0.0 {
            gain += delta;
            reference = elevation;
        } else if delta <= -threshold && delta < 0.0 {
            loss -= delta;
            reference = elevation;
        } else if threshold == 0.0 {
            reference = elevation;
        }
    }

    (gain, loss)
}

/// Gradient in percent for a segment, or `None` when the segment has no
/// horizontal extent.
pub fn segment_gradient(elevation_delta_m: f64, horizontal_distance_m: f64) -> Option<f64> {
    if !horizontal_distance_m.is_finite() || horizontal_distance_m <= 0.0 {
        return None;
    }
    Some(elevation_delta_m / horizontal_distance_m * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(lat: f64, lon: f64, ele: Option<f64>) -> RawPoint {
        RawPoint::new(lat, lon, ele)
    }

    #[test]
    fn test_three_point_scenario() {
        let points = vec![
            raw(0.0, 0.0, Some(0.0)),
            raw(0.0, 0.001, Some(10.0)),
            raw(0.0, 0.002, Some(0.0)),
        ];
        let stats = compute_statistics(&points, 0.0);

        assert!((stats.total_distance_km - 0.2224).abs() < 0.001);
        assert_eq!(stats.elevation_gain_m, Some(10.0));
        assert_eq!(stats.elevation_loss_m, Some(10.0));
        assert_eq!(stats.max_altitude_m, Some(10.0));
        assert_eq!(stats.min_altitude_m, Some(0.0));
        assert!(stats.has_elevation);
        assert_eq!(stats.point_count, 3);
    }

    #[test]
    fn test_uniform_elevation_has_no_gain_or_loss() {
        let points: Vec<RawPoint> = (0..10)
            .map(|i| raw(45.0, 6.0 + i as f64 * 0.001, Some(350.0)))
            .collect();
        let stats = compute_statistics(&points, 0.0);
        assert_eq!(stats.elevation_gain_m, Some(0.0));
        assert_eq!(stats.elevation_loss_m, Some(0.0));
    }

    #[test]
    fn test_missing_elevation_reports_absent() {
        let points = vec![
            raw(45.0, 6.0, Some(300.0)),
            raw(45.0, 6.001, None),
            raw(45.0, 6.002, Some(320.0)),
        ];
        let stats = compute_statistics(&points, 0.0);
        assert!(!stats.has_elevation);
        assert_eq!(stats.elevation_gain_m, None);
        assert_eq!(stats.elevation_loss_m, None);
        assert_eq!(stats.max_altitude_m, None);
        assert_eq!(stats.min_altitude_m, None);
        assert!(stats.total_distance_km > 0.0);
    }

    #[test]
    fn test_distance_grows_as_points_are_appended() {
        let mut points = Vec::new();
        let mut previous = 0.0;
        for i in 0..15 {
            points.push(raw(
                46.0 + (i as f64 * 0.4).cos() * 0.002,
                7.0 + i as f64 * 0.0015,
                None,
            ));
            let stats = compute_statistics(&points, 0.0);
            assert!(stats.total_distance_km >= 0.0);
            if i > 0 {
                assert!(stats.total_distance_km > previous);
            }
            previous = stats.total_distance_km;
        }
    }

    #[test]
    fn test_noise_threshold_filters_jitter() {
        // 0.4 m jitter around 100 m, then a real 5 m climb
        let elevations = [100.0, 100.4, 100.0, 100.4, 100.0, 105.0];
        let points: Vec<RawPoint> = elevations
            .iter()
            .enumerate()
            .map(|(i, &e)| raw(45.0, 6.0 + i as f64 * 0.0005, Some(e)))
            .collect();

        let unfiltered = compute_statistics(&points, 0.0);
        assert!((unfiltered.elevation_gain_m.unwrap() - 5.8).abs() < 1e-9);
        assert!((unfiltered.elevation_loss_m.unwrap() - 0.8).abs() < 1e-9);

        let filtered = compute_statistics(&points, 1.0);
        assert!((filtered.elevation_gain_m.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(filtered.elevation_loss_m, Some(0.0));
    }

    #[test]
    fn test_degenerate_inputs() {
        let empty: Vec<RawPoint> = Vec::new();
        let stats = compute_statistics(&empty, 0.0);
        assert_eq!(stats.total_distance_km, 0.0);
        assert!(!stats.has_elevation);

        let single = vec![raw(45.0, 6.0, Some(200.0))];
        let stats = compute_statistics(&single, 0.0);
        assert_eq!(stats.total_distance_km, 0.0);
        assert_eq!(stats.elevation_gain_m, Some(0.0));
        assert_eq!(stats.max_altitude_m, Some(200.0));
    }

    #[test]
    fn test_segment_gradient() {
        assert_eq!(segment_gradient(5.0, 100.0), Some(5.0));
        assert_eq!(segment_gradient(-12.0, 200.0), Some(-6.0));
        assert_eq!(segment_gradient(3.0, 0.0), None);
    }
}
