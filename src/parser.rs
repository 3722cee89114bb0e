//! Track file parsing.
//!
//! Turns raw track bytes into an ordered list of [`RawPoint`]s. Two inputs are
//! accepted:
//!
//! - GPX 1.0/1.1 documents, read with the `gpx` crate. Track points from every
//!   track and segment are concatenated in document order; a file without
//!   track points falls back to its route points.
//! - JSON point lists, either a bare array or an object with a `points` array:
//!   `[{"lat": 46.2, "lon": 7.1, "ele": 512.0, "time": "2024-06-01T08:00:00Z"}]`.
//!
//! Every point must have a finite latitude in [-90, 90] and longitude in
//! [-180, 180]. Elevation and time are optional and never abort parsing.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;

use crate::error::{Result, TripDataError};
use crate::RawPoint;

/// Parse a track, detecting GPX or JSON from the first significant byte.
pub fn parse_track(bytes: &[u8]) -> Result<Vec<RawPoint>> {
    let first = bytes
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace() || *b == 0xEF || *b == 0xBB || *b == 0xBF)
        .next();

    match first {
        Some(b'<') => parse_gpx(bytes),
        Some(b'[') | Some(b'{') => parse_json_points(bytes),
        Some(_) => Err(TripDataError::parse("unrecognized track format")),
        None => Err(TripDataError::parse("track file is empty")),
    }
}

/// Parse a GPX document.
pub fn parse_gpx(bytes: &[u8]) -> Result<Vec<RawPoint>> {
    let gpx = gpx::read(bytes).map_err(|e| TripDataError::parse(format!("GPX: {}", e)))?;

    let mut points: Vec<RawPoint> = gpx
        .tracks
        .iter()
        .flat_map(|t| t.segments.iter())
        .flat_map(|seg| seg.points.iter())
        .map(waypoint_to_raw)
        .collect();

    if points.is_empty() {
        points = gpx
            .routes
            .iter()
            .flat_map(|r| r.points.iter())
            .map(waypoint_to_raw)
            .collect();
    }

    debug!(
        "[TrackParser] GPX with {} tracks, {} routes -> {} points",
        gpx.tracks.len(),
        gpx.routes.len(),
        points.len()
    );

    validate_points(points)
}

/// Parse a JSON point list.
pub fn parse_json_points(bytes: &[u8]) -> Result<Vec<RawPoint>> {
    let document: JsonTrack = serde_json::from_slice(bytes)
        .map_err(|e| TripDataError::parse(format!("JSON: {}", e)))?;

    let points = match document {
        JsonTrack::Points(points) => points,
        JsonTrack::Document { points } => points,
    };

    let points = points
        .into_iter()
        .map(|p| RawPoint {
            latitude: p.lat,
            longitude: p.lon,
            elevation: p.ele.filter(|e| e.is_finite()),
            timestamp: p.time,
        })
        .collect();

    validate_points(points)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonTrack {
    Points(Vec<JsonPoint>),
    Document { points: Vec<JsonPoint> },
}

#[derive(Debug, Deserialize)]
struct JsonPoint {
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude", alias = "lng")]
    lon: f64,
    #[serde(default, alias = "elevation", alias = "alt")]
    ele: Option<f64>,
    #[serde(default, alias = "timestamp")]
    time: Option<DateTime<Utc>>,
}

fn waypoint_to_raw(wp: &gpx::Waypoint) -> RawPoint {
    let point = wp.point();
    RawPoint {
        latitude: point.y(),
        longitude: point.x(),
        elevation: wp.elevation.filter(|e| e.is_finite()),
        timestamp: wp.time.as_ref().and_then(gpx_time_to_utc),
    }
}

/// GPX times are formatted as ISO 8601 and re-read as UTC. An unreadable time
/// is dropped rather than failing the whole track.
fn gpx_time_to_utc(time: &gpx::Time) -> Option<DateTime<Utc>> {
    let formatted = time.format().ok()?;
    DateTime::parse_from_rfc3339(&formatted)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn validate_points(points: Vec<RawPoint>) -> Result<Vec<RawPoint>> {
    if points.is_empty() {
        return Err(TripDataError::parse("track contains no points"));
    }

    for (index, p) in points.iter().enumerate() {
        if !p.latitude.is_finite() || !(-90.0..=90.0).contains(&p.latitude) {
            return Err(TripDataError::parse(format!(
                "point {} has latitude {} outside [-90, 90]",
                index, p.latitude
            )));
        }
        if !p.longitude.is_finite() || !(-180.0..=180.0).contains(&p.longitude) {
            return Err(TripDataError::parse(format!(
                "point {} has longitude {} outside [-180, 180]",
                index, p.longitude
            )));
        }
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPX_MIXED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning ride</name>
    <trkseg>
      <trkpt lat="46.2000" lon="7.1000"><ele>512.0</ele><time>2024-06-01T08:00:00Z</time></trkpt>
      <trkpt lat="46.2010" lon="7.1010"><ele>515.5</ele></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="46.2020" lon="7.1020"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_gpx_optional_fields() {
        let points = parse_track(GPX_MIXED.as_bytes()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].elevation, Some(512.0));
        assert!(points[0].timestamp.is_some());
        assert_eq!(points[1].elevation, Some(515.5));
        assert!(points[1].timestamp.is_none());
        assert_eq!(points[2].elevation, None);
        assert!((points[2].latitude - 46.202).abs() < 1e-9);
        assert!((points[2].longitude - 7.102).abs() < 1e-9);
    }

    #[test]
    fn test_gpx_route_points_fallback() {
        let gpx = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <rte>
    <rtept lat="45.0" lon="6.0"/>
    <rtept lat="45.1" lon="6.1"/>
  </rte>
</gpx>"#;
        let points = parse_gpx(gpx.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_gpx_without_points_fails() {
        let gpx = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg></trkseg></trk>
</gpx>"#;
        assert!(matches!(
            parse_gpx(gpx.as_bytes()),
            Err(TripDataError::Parse { .. })
        ));
    }

    #[test]
    fn test_malformed_gpx_fails() {
        assert!(matches!(
            parse_track(b"<gpx><trk>"),
            Err(TripDataError::Parse { .. })
        ));
    }

    #[test]
    fn test_json_array_and_aliases() {
        let json = r#"[
            {"lat": 46.0, "lon": 7.0, "ele": 400.0, "time": "2024-06-01T08:00:00Z"},
            {"latitude": 46.001, "longitude": 7.001},
            {"lat": 46.002, "lng": 7.002, "elevation": 410.0}
        ]"#;
        let points = parse_track(json.as_bytes()).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].elevation, Some(400.0));
        assert!(points[0].timestamp.is_some());
        assert_eq!(points[1].elevation, None);
        assert_eq!(points[2].elevation, Some(410.0));
    }

    #[test]
    fn test_json_document_form() {
        let json = r#"{"name": "loop", "points": [{"lat": 1.0, "lon": 2.0}]}"#;
        let points = parse_json_points(json.as_bytes()).unwrap();
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_out_of_range_point_fails() {
        let json = r#"[{"lat": 46.0, "lon": 7.0}, {"lat": 95.0, "lon": 7.0}]"#;
        match parse_track(json.as_bytes()) {
            Err(TripDataError::Parse { message }) => assert!(message.contains("point 1")),
            other => panic!("expected parse error, got {:?}", other),
        }

        let json = r#"[{"lat": 46.0, "lon": -181.0}]"#;
        assert!(parse_track(json.as_bytes()).is_err());
    }

    #[test]
    fn test_empty_inputs_fail() {
        assert!(matches!(parse_track(b""), Err(TripDataError::Parse { .. })));
        assert!(matches!(parse_track(b"  \n"), Err(TripDataError::Parse { .. })));
        assert!(matches!(parse_track(b"[]"), Err(TripDataError::Parse { .. })));
        assert!(matches!(
            parse_track(b"lat,lon\n1,2"),
            Err(TripDataError::Parse { .. })
        ));
    }
}
