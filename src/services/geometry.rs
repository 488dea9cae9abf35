// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Path geometry: haversine distance, Douglas-Peucker simplification
//! and viewport tolerance selection.

use crate::models::{BBox, PathPoint};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two lat/lon points.
///
/// Inputs are plain degrees and are not range-checked; NaN propagates.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Perpendicular distance from a point to the chord (line_start, line_end),
/// computed in raw degree space. Valid as an approximation at the
/// tolerances used for viewport rendering.
fn perpendicular_distance_deg(point: PathPoint, line_start: PathPoint, line_end: PathPoint) -> f64 {
    let dx = line_end.lon - line_start.lon;
    let dy = line_end.lat - line_start.lat;

    if dx == 0.0 && dy == 0.0 {
        // Chord endpoints coincide; fall back to point-to-point distance
        let d_lon = point.lon - line_start.lon;
        let d_lat = point.lat - line_start.lat;
        return (d_lon * d_lon + d_lat * d_lat).sqrt();
    }

    let num = (dy * point.lon - dx * point.lat + line_end.lon * line_start.lat
        - line_end.lat * line_start.lon)
        .abs();
    let den = (dy * dy + dx * dx).sqrt();

    num / den
}

/// Reduce the number of points using the Douglas-Peucker algorithm.
///
/// `tolerance` is in degrees; points deviating less than this from the
/// chord are removed. Sequences of two or fewer points are returned
/// unchanged. The split point is the one with maximum deviation, ties
/// going to the lowest index.
pub fn simplify_path(points: &[PathPoint], tolerance: f64) -> Vec<PathPoint> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let first = points[0];
    let last = points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_idx = 0;
    for (i, pt) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let dist = perpendicular_distance_deg(*pt, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        let left = simplify_path(&points[..=max_idx], tolerance);
        let right = simplify_path(&points[max_idx..], tolerance);

        // Concatenate, dropping the duplicated split point
        let mut result = Vec::with_capacity(left.len() + right.len() - 1);
        result.extend_from_slice(&left[..left.len() - 1]);
        result.extend_from_slice(&right);
        return result;
    }

    // All interior points are within tolerance
    vec![first, last]
}

/// Simplification tolerance appropriate for a viewport: 0.1% of the
/// smaller bbox dimension, clamped to roughly 1 m - 100 m in degrees.
pub fn tolerance_from_bbox(bbox: BBox) -> f64 {
    let lat_span = bbox.ne_lat - bbox.sw_lat;
    let lon_span = bbox.ne_lng - bbox.sw_lng;
    let min_span = lat_span.min(lon_span);

    (min_span * 0.001).clamp(0.00001, 0.001)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64, timestamp: i64) -> PathPoint {
        PathPoint {
            lat,
            lon,
            timestamp,
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // San Francisco to Los Angeles, roughly 559 km
        let d = haversine_meters(37.7749, -122.4194, 34.0522, -118.2437);
        assert!((d - 559_000.0).abs() < 5_000.0, "got {}", d);
    }

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine_meters(37.0, -122.0, 37.0, -122.0), 0.0);
    }

    #[test]
    fn test_haversine_nan_propagates() {
        assert!(haversine_meters(f64::NAN, 0.0, 1.0, 1.0).is_nan());
    }

    #[test]
    fn test_simplify_short_sequences_unchanged() {
        let empty: Vec<PathPoint> = vec![];
        assert_eq!(simplify_path(&empty, 0.001), empty);

        let one = vec![pt(1.0, 2.0, 0)];
        assert_eq!(simplify_path(&one, 0.001), one);

        let two = vec![pt(1.0, 2.0, 0), pt(3.0, 4.0, 1)];
        assert_eq!(simplify_path(&two, 0.001), two);
    }

    #[test]
    fn test_simplify_collinear_collapses_to_endpoints() {
        let points = vec![
            pt(0.0, 0.0, 0),
            pt(0.0, 0.25, 1),
            pt(0.0, 0.5, 2),
            pt(0.0, 0.75, 3),
            pt(0.0, 1.0, 4),
        ];
        let result = simplify_path(&points, 0.0001);
        assert_eq!(result, vec![points[0], points[4]]);
    }

    #[test]
    fn test_simplify_keeps_significant_deviation() {
        let points = vec![
            pt(0.0, 0.0, 0),
            pt(0.01, 0.5, 1), // well off the chord
            pt(0.0, 1.0, 2),
        ];
        let result = simplify_path(&points, 0.001);
        assert_eq!(result, points);
    }

    #[test]
    fn test_simplify_is_subsequence_with_endpoints() {
        let points: Vec<PathPoint> = (0..20)
            .map(|i| pt((i as f64 * 0.37).sin() * 0.01, i as f64 * 0.1, i))
            .collect();
        let result = simplify_path(&points, 0.002);

        assert_eq!(result[0], points[0]);
        assert_eq!(*result.last().unwrap(), *points.last().unwrap());

        // Every output point appears in the input, in order
        let mut input_iter = points.iter();
        for kept in &result {
            assert!(
                input_iter.any(|p| p == kept),
                "output not a subsequence of input"
            );
        }
    }

    #[test]
    fn test_simplify_monotone_in_tolerance() {
        let points: Vec<PathPoint> = (0..50)
            .map(|i| pt((i as f64 * 0.7).cos() * 0.05, i as f64 * 0.02, i))
            .collect();

        let mut prev_len = usize::MAX;
        for tol in [0.00001, 0.0001, 0.001, 0.01, 0.1] {
            let len = simplify_path(&points, tol).len();
            assert!(len <= prev_len, "length grew as tolerance increased");
            prev_len = len;
        }
    }

    #[test]
    fn test_simplify_degenerate_chord() {
        // First and last point identical; the loop must not panic and the
        // far point must survive
        let points = vec![pt(0.0, 0.0, 0), pt(1.0, 1.0, 1), pt(0.0, 0.0, 2)];
        let result = simplify_path(&points, 0.001);
        assert!(result.contains(&points[1]));
    }

    #[test]
    fn test_tolerance_from_bbox_clamped() {
        // Tiny viewport clamps to the minimum
        let tiny = BBox {
            sw_lng: 0.0,
            sw_lat: 0.0,
            ne_lng: 0.001,
            ne_lat: 0.001,
        };
        assert_eq!(tolerance_from_bbox(tiny), 0.00001);

        // Huge viewport clamps to the maximum
        let huge = BBox {
            sw_lng: -120.0,
            sw_lat: -60.0,
            ne_lng: 120.0,
            ne_lat: 60.0,
        };
        assert_eq!(tolerance_from_bbox(huge), 0.001);

        // Mid-size viewport scales with the smaller span
        let mid = BBox {
            sw_lng: 0.0,
            sw_lat: 0.0,
            ne_lng: 0.5,
            ne_lat: 0.2,
        };
        assert!((tolerance_from_bbox(mid) - 0.0002).abs() < 1e-12);
    }
}
