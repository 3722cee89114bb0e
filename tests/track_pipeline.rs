use trip_geodata::pipeline::process_points;
use trip_geodata::{process_track, GradientDirection, RawPoint, TrackConfig, TripDataError};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gpx_track(points: &[(f64, f64, f64)]) -> Vec<u8> {
    let mut gpx = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="trip-geodata tests" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>Test</name><trkseg>
"#,
    );
    for (lat, lon, ele) in points {
        gpx.push_str(&format!(
            "    <trkpt lat=\"{}\" lon=\"{}\"><ele>{}</ele></trkpt>\n",
            lat, lon, ele
        ));
    }
    gpx.push_str("  </trkseg></trk>\n</gpx>\n");
    gpx.into_bytes()
}

#[test]
fn three_point_track_statistics_and_gradients() {
    init();
    let json = br#"[
        {"lat": 0.0, "lon": 0.000, "ele": 0},
        {"lat": 0.0, "lon": 0.001, "ele": 10},
        {"lat": 0.0, "lon": 0.002, "ele": 0}
    ]"#;
    // The middle point is collinear on the map but is the high point
    let track = process_track(json, &TrackConfig::default()).unwrap();

    assert_eq!(track.points.len(), 3);
    assert!((track.statistics.total_distance_km - 0.2224).abs() < 0.001);
    assert_eq!(track.statistics.elevation_gain_m, Some(10.0));
    assert_eq!(track.statistics.elevation_loss_m, Some(10.0));
    assert_eq!(track.statistics.max_altitude_m, Some(10.0));
    assert_eq!(track.statistics.min_altitude_m, Some(0.0));

    assert!(track.points[0].gradient_pct.is_none());
    assert!(track.points[1].gradient_pct.unwrap() > 0.0);
    assert!(track.points[2].gradient_pct.unwrap() < 0.0);
    assert_eq!(
        track.points[1].gradient_bucket.map(|b| b.direction()),
        Some(GradientDirection::Ascent)
    );
    assert_eq!(
        track.points[2].gradient_bucket.map(|b| b.direction()),
        Some(GradientDirection::Descent)
    );
}

#[test]
fn straight_climb_and_descent_keeps_its_summit() {
    init();
    let mut points: Vec<(f64, f64, f64)> = (0..=50)
        .map(|i| (0.0, i as f64 * 0.0005, i as f64 * 10.0))
        .collect();
    points.extend((1..=50).map(|i| (0.0, 0.025 + i as f64 * 0.0005, 500.0 - i as f64 * 10.0)));

    let track = process_track(&gpx_track(&points), &TrackConfig::default()).unwrap();

    assert!(track.points.len() < points.len());
    assert_eq!(track.statistics.elevation_gain_m, Some(500.0));
    assert_eq!(track.statistics.elevation_loss_m, Some(500.0));
    assert_eq!(track.statistics.max_altitude_m, Some(500.0));
}

#[test]
fn long_gpx_track_respects_point_budget() {
    init();
    let points: Vec<(f64, f64, f64)> = (0..2000)
        .map(|i| {
            let t = i as f64 * 0.01;
            (46.2 + t.sin() * 0.01, 7.0 + t * 0.002, 800.0 + (t * 0.7).cos() * 120.0)
        })
        .collect();
    let config = TrackConfig {
        max_points: Some(150),
        ..TrackConfig::default()
    };
    let track = process_track(&gpx_track(&points), &config).unwrap();

    assert!(track.points.len() <= 150);
    assert_eq!(track.original_point_count, 2000);

    let first = &track.points[0];
    let last = &track.points[track.points.len() - 1];
    assert_eq!((first.latitude, first.longitude), (points[0].0, points[0].1));
    assert_eq!((last.latitude, last.longitude), (points[1999].0, points[1999].1));

    assert_eq!(first.cumulative_distance_km, 0.0);
    assert!(track
        .points
        .windows(2)
        .all(|w| w[1].cumulative_distance_km >= w[0].cumulative_distance_km));
    assert!(
        (last.cumulative_distance_km - track.statistics.total_distance_km).abs() < 1e-9
    );
    assert!(track.bounds.min_lat <= track.center.latitude);
    assert!(track.center.latitude <= track.bounds.max_lat);
}

#[test]
fn invalid_point_rejects_whole_track() {
    init();
    let gpx = gpx_track(&[(46.0, 7.0, 500.0), (46.001, 7.001, 505.0)]);
    let broken = String::from_utf8(gpx)
        .unwrap()
        .replace("lat=\"46.001\"", "lat=\"146.001\"");

    match process_track(broken.as_bytes(), &TrackConfig::default()) {
        Err(e @ TripDataError::Parse { .. }) => {
            assert_eq!(e.fallback(), trip_geodata::Fallback::FixInput)
        }
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn unreadable_input_is_a_parse_error() {
    init();
    for input in [&b""[..], b"   ", b"not a track", b"<gpx><trk>"] {
        assert!(matches!(
            process_track(input, &TrackConfig::default()),
            Err(TripDataError::Parse { .. })
        ));
    }
}

#[test]
fn edited_track_statistics_are_recomputed() {
    init();
    let config = TrackConfig::default();
    let mut points = vec![
        RawPoint::new(45.90, 6.80, Some(1000.0)),
        RawPoint::new(45.91, 6.82, Some(1100.0)),
        RawPoint::new(45.93, 6.83, Some(1050.0)),
    ];
    let before = process_points(&points, &config).unwrap();

    points.push(RawPoint::new(45.95, 6.86, Some(1300.0)));
    let after = process_points(&points, &config).unwrap();

    assert!(after.statistics.total_distance_km > before.statistics.total_distance_km);
    assert_eq!(before.statistics.elevation_gain_m, Some(100.0));
    assert_eq!(after.statistics.elevation_gain_m, Some(350.0));
    assert_eq!(after.statistics.max_altitude_m, Some(1300.0));
}
