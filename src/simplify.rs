//! Track simplification.
//!
//! Ramer-Douglas-Peucker reduction: the point farthest from the chord between
//! a segment's endpoints is kept when its perpendicular distance exceeds ε and
//! both halves are reduced recursively; otherwise the segment collapses to its
//! endpoints. Every discarded point therefore lies within ε of the simplified
//! path, and the first and last points are always retained.
//!
//! ε is expressed in degrees, like the coordinates it is compared against.
//! Use [`crate::geo_utils::meters_to_degrees`] to derive it from a ground
//! distance.
//!
//! [`simplify_track`] first reduces the elevation profile (distance along the
//! track against elevation) and keeps its breakpoints as anchors, then runs
//! the planar reduction between consecutive anchors. A summit on a straight
//! road therefore survives, and every discarded point still lies within ε of
//! the simplified path.

use geo::{Coord, LineString, SimplifyIdx};
use log::debug;

use crate::gradient::GradientBucket;
use crate::geo_utils::{cumulative_distances_km, haversine_distance};
use crate::stats::segment_gradient;
use crate::{RawPoint, TrackConfig, TrackPoint};

/// Bisection steps when translating a point budget into a tolerance.
const TOLERANCE_SEARCH_ITERATIONS: usize = 48;

/// Reduce a point sequence with tolerance `tolerance` (degrees).
///
/// Sequences of two points or fewer, and non-positive tolerances, are
/// returned unchanged.
pub fn simplify_points(points: &[RawPoint], tolerance: f64) -> Vec<RawPoint> {
    retained_indices(points, tolerance)
        .into_iter()
        .map(|i| points[i].clone())
        .collect()
}

/// Reduce a point sequence to at most `max_points` points.
///
/// A budget below 2 is treated as 2, since both endpoints are always kept.
pub fn simplify_to_max_points(points: &[RawPoint], max_points: usize) -> Vec<RawPoint> {
    let tolerance = tolerance_for_max_points(points, max_points);
    simplify_points(points, tolerance)
}

/// Smallest tolerance (within bisection precision) whose reduction retains
/// no more than `max_points` points. Returns 0.0 when the track already fits.
pub fn tolerance_for_max_points(points: &[RawPoint], max_points: usize) -> f64 {
    let budget = max_points.max(2);
    if points.len() <= budget {
        return 0.0;
    }

    let line = to_line_string(points);

    // Any tolerance at least as large as the bounding box diagonal
    // collapses the track to its two endpoints.
    let (mut low, mut high) = (0.0_f64, bounding_diagonal(points).max(f64::EPSILON) * 2.0);
    for _ in 0..TOLERANCE_SEARCH_ITERATIONS {
        let mid = (low + high) / 2.0;
        if line.simplify_idx(&mid).len() > budget {
            low = mid;
        } else {
            high = mid;
        }
    }

    high
}

/// Tolerances applied together when simplifying a track.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tolerances {
    /// Planar deviation, degrees
    planar: f64,
    /// Deviation from the elevation profile, meters
    vertical_m: f64,
}

/// Simplify with the configured tolerances and point budget, then annotate.
pub fn simplify_track(points: &[RawPoint], config: &TrackConfig) -> Vec<TrackPoint> {
    let profile = elevation_profile(points);
    let mut tolerances = Tolerances {
        planar: config.simplification_tolerance,
        vertical_m: config.elevation_tolerance_m,
    };

    let mut indices = track_indices(points, profile.as_ref(), tolerances);
    if let Some(max_points) = config.max_points {
        let budget = (max_points as usize).max(2);
        if indices.len() > budget {
            tolerances = tolerances_for_budget(points, profile.as_ref(), tolerances, budget);
            indices = track_indices(points, profile.as_ref(), tolerances);
        }
    }

    debug!(
        "[TrackSimplifier] {} -> {} points (tolerance {:.6} deg, {:.1} m vertical)",
        points.len(),
        indices.len(),
        tolerances.planar,
        tolerances.vertical_m
    );

    let simplified: Vec<RawPoint> = indices.into_iter().map(|i| points[i].clone()).collect();
    annotate_points(&simplified)
}

/// Attach cumulative distance and per-segment gradient to each point.
///
/// The gradient of point `i` describes the segment from point `i - 1`, and is
/// only present when both endpoints carry elevation.
pub fn annotate_points(points: &[RawPoint]) -> Vec<TrackPoint> {
    let positions: Vec<_> = points.iter().map(|p| p.coordinates()).collect();
    let cumulative = cumulative_distances_km(&positions);

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let gradient_pct = if i == 0 {
                None
            } else {
                let prev = &points[i - 1];
                match (prev.elevation, p.elevation) {
                    (Some(a), Some(b)) => {
                        segment_gradient(b - a, haversine_distance(&positions[i - 1], &positions[i]))
                    }
                    _ => None,
                }
            };

            TrackPoint {
                latitude: p.latitude,
                longitude: p.longitude,
                elevation: p.elevation,
                timestamp: p.timestamp,
                cumulative_distance_km: cumulative[i],
                gradient_pct,
                gradient_bucket: gradient_pct.map(GradientBucket::classify),
            }
        })
        .collect()
}

fn retained_indices(points: &[RawPoint], tolerance: f64) -> Vec<usize> {
    if points.len() <= 2 || !(tolerance > 0.0) {
        return (0..points.len()).collect();
    }
    to_line_string(points).simplify_idx(&tolerance)
}

/// Profile breakpoints first, then planar reduction between each pair.
fn track_indices(
    points: &[RawPoint],
    profile: Option<&LineString<f64>>,
    tolerances: Tolerances,
) -> Vec<usize> {
    if points.len() <= 2 {
        return (0..points.len()).collect();
    }

    let anchors = match profile {
        Some(profile) => profile.simplify_idx(&tolerances.vertical_m),
        None => vec![0, points.len() - 1],
    };

    let mut indices = vec![0];
    for pair in anchors.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let stretch = retained_indices(&points[start..=end], tolerances.planar);
        indices.extend(stretch.into_iter().skip(1).map(|i| start + i));
    }
    indices
}

/// Smallest scaling of the tolerances (within bisection precision) that
/// fits the budget. Neither tolerance drops below its configured value.
fn tolerances_for_budget(
    points: &[RawPoint],
    profile: Option<&LineString<f64>>,
    floor: Tolerances,
    budget: usize,
) -> Tolerances {
    // At these values both reductions collapse to the two endpoints
    let ceiling = Tolerances {
        planar: bounding_diagonal(points).max(f64::EPSILON) * 2.0,
        vertical_m: profile.map_or(0.0, elevation_range).max(f64::EPSILON) * 2.0,
    };
    let scaled = |fraction: f64| Tolerances {
        planar: floor.planar.max(ceiling.planar * fraction),
        vertical_m: floor.vertical_m.max(ceiling.vertical_m * fraction),
    };

    let (mut low, mut high) = (0.0_f64, 1.0_f64);
    for _ in 0..TOLERANCE_SEARCH_ITERATIONS {
        let mid = (low + high) / 2.0;
        if track_indices(points, profile, scaled(mid)).len() > budget {
            low = mid;
        } else {
            high = mid;
        }
    }

    scaled(high)
}

/// Distance along the track (meters) against elevation. Only present when
/// every point carries elevation.
fn elevation_profile(points: &[RawPoint]) -> Option<LineString<f64>> {
    let positions: Vec<_> = points.iter().map(|p| p.coordinates()).collect();
    let cumulative = cumulative_distances_km(&positions);

    points
        .iter()
        .zip(cumulative)
        .map(|(p, km)| {
            p.elevation.map(|elevation| Coord {
                x: km * 1000.0,
                y: elevation,
            })
        })
        .collect::<Option<Vec<_>>>()
        .map(LineString::new)
}

fn elevation_range(profile: &LineString<f64>) -> f64 {
    let (min, max) = profile
        .coords()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), c| {
            (min.min(c.y), max.max(c.y))
        });
    if max >= min {
        max - min
    } else {
        0.0
    }
}

fn to_line_string(points: &[RawPoint]) -> LineString<f64> {
    LineString::new(
        points
            .iter()
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect(),
    )
}

fn bounding_diagonal(points: &[RawPoint]) -> f64 {
    let positions: Vec<_> = points.iter().map(|p| p.coordinates()).collect();
    match crate::Bounds::from_points(&positions) {
        Some(b) => (b.max_lat - b.min_lat).hypot(b.max_lng - b.min_lng),
        None => 0.0,
    }
}
