// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Point filtering: stationary-cluster pruning and GPS spike removal.
//!
//! Both filters are total functions; degenerate inputs are base cases,
//! never errors.

use crate::models::PathPoint;
use crate::services::geometry::haversine_meters;
use serde::Serialize;

/// A period where the user was stationary at one location.
///
/// The anchor (lat, lon) is the first point admitted to the cluster and
/// never moves while the cluster grows, so jitter around a stationary
/// point cannot drag the anchor away from the true stop location.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StationaryCluster {
    /// Anchor point latitude (first point in cluster)
    pub lat: f64,
    /// Anchor point longitude
    pub lon: f64,
    /// First point timestamp
    pub start_ts: i64,
    /// Last point timestamp
    pub end_ts: i64,
    /// Number of raw points in the cluster
    pub point_count: i64,
}

/// Result of stationary pruning: the simplified path, the points that
/// were folded away, and the detected clusters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneResult {
    pub points: Vec<PathPoint>,
    pub removed: Vec<PathPoint>,
    pub clusters: Vec<StationaryCluster>,
}

/// Collapse runs of near-identical consecutive points into single
/// representative points.
///
/// Points within `min_dist_meters` of the current cluster's anchor are
/// absorbed; a point beyond the threshold closes the cluster (emitting
/// one point at the anchor position with the cluster's start timestamp)
/// and opens a new one.
pub fn prune_stationary_points(points: &[PathPoint], min_dist_meters: f64) -> PruneResult {
    if points.is_empty() {
        return PruneResult::default();
    }
    if points.len() == 1 {
        return PruneResult {
            points: points.to_vec(),
            removed: Vec::new(),
            clusters: vec![StationaryCluster {
                lat: points[0].lat,
                lon: points[0].lon,
                start_ts: points[0].timestamp,
                end_ts: points[0].timestamp,
                point_count: 1,
            }],
        };
    }

    let mut result = Vec::new();
    let mut removed = Vec::new();
    let mut clusters = Vec::new();

    let mut cluster = StationaryCluster {
        lat: points[0].lat,
        lon: points[0].lon,
        start_ts: points[0].timestamp,
        end_ts: points[0].timestamp,
        point_count: 1,
    };

    for pt in &points[1..] {
        let dist = haversine_meters(cluster.lat, cluster.lon, pt.lat, pt.lon);

        if dist < min_dist_meters {
            cluster.end_ts = pt.timestamp;
            cluster.point_count += 1;
            removed.push(*pt);
        } else {
            result.push(PathPoint {
                lat: cluster.lat,
                lon: cluster.lon,
                timestamp: cluster.start_ts,
            });
            clusters.push(cluster);

            cluster = StationaryCluster {
                lat: pt.lat,
                lon: pt.lon,
                start_ts: pt.timestamp,
                end_ts: pt.timestamp,
                point_count: 1,
            };
        }
    }

    result.push(PathPoint {
        lat: cluster.lat,
        lon: cluster.lon,
        timestamp: cluster.start_ts,
    });
    clusters.push(cluster);

    PruneResult {
        points: result,
        removed,
        clusters,
    }
}

/// Result of spike removal: kept points and removed spikes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpikeResult {
    pub points: Vec<PathPoint>,
    pub removed: Vec<PathPoint>,
}

/// Remove single-point GPS outliers.
///
/// A point B between the last kept point A and upcoming point C is a
/// spike iff dist(A,B) > threshold AND dist(B,C) > threshold AND
/// dist(A,C) <= threshold: B sticks far out while its neighbors stay
/// close. Comparing against the last *kept* point means consecutive
/// spikes are each evaluated against the same stable anchor. The first
/// and last points are always kept.
pub fn remove_spikes(points: &[PathPoint], threshold_meters: f64) -> SpikeResult {
    if points.len() < 3 {
        return SpikeResult {
            points: points.to_vec(),
            removed: Vec::new(),
        };
    }

    let mut kept = vec![points[0]];
    let mut removed = Vec::new();

    for i in 1..points.len() - 1 {
        let a = kept[kept.len() - 1];
        let b = points[i];
        let c = points[i + 1];

        let dist_ab = haversine_meters(a.lat, a.lon, b.lat, b.lon);
        let dist_bc = haversine_meters(b.lat, b.lon, c.lat, c.lon);
        let dist_ac = haversine_meters(a.lat, a.lon, c.lat, c.lon);

        if dist_ab > threshold_meters && dist_bc > threshold_meters && dist_ac < threshold_meters {
            removed.push(b);
        } else {
            kept.push(b);
        }
    }

    kept.push(points[points.len() - 1]);

    SpikeResult {
        points: kept,
        removed,
    }
}

/// One stage of the viewport simplification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimplifyStage {
    Stationary,
    Spikes,
}

impl SimplifyStage {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stationary" => Some(SimplifyStage::Stationary),
            "spikes" => Some(SimplifyStage::Spikes),
            _ => None,
        }
    }
}

/// Configuration for the viewport simplification pipeline.
///
/// Stage order matters: the spike filter's three-point window sees
/// different neighbors once stationary runs are already merged, so
/// running the stages in the other order can keep or drop different
/// points.
#[derive(Debug, Clone)]
pub struct SimplifyOptions {
    /// Stationary pruning threshold in meters (0 = disabled)
    pub prune_meters: f64,
    /// Spike detection threshold in meters (0 = disabled)
    pub spike_meters: f64,
    /// Order of operations
    pub order: Vec<SimplifyStage>,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            prune_meters: 0.0,
            spike_meters: 0.0,
            order: vec![SimplifyStage::Stationary, SimplifyStage::Spikes],
        }
    }
}

/// Points removed by each simplification stage, reported back to the
/// caller so discarded fixes can be visualized.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemovedPoints {
    pub stationary: Vec<PathPoint>,
    pub spikes: Vec<PathPoint>,
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

    // Roughly 100m of latitude in degrees
    const LAT_100M: f64 = 0.0009;

    #[test]
    fn test_prune_empty() {
        let result = prune_stationary_points(&[], 50.0);
        assert!(result.points.is_empty());
        assert!(result.removed.is_empty());
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_prune_single_point() {
        let points = vec![pt(37.0, -122.0, 100)];
        let result = prune_stationary_points(&points, 50.0);

        assert_eq!(result.points, points);
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].point_count, 1);
        assert_eq!(result.clusters[0].start_ts, 100);
        assert_eq!(result.clusters[0].end_ts, 100);
    }

    #[test]
    fn test_prune_stationary_run_collapses() {
        // Four points within a few meters, then a jump
        let points = vec![
            pt(37.0, -122.0, 0),
            pt(37.00001, -122.0, 60),
            pt(37.0, -122.00001, 120),
            pt(37.00002, -122.00001, 180),
            pt(37.01, -122.0, 240), // ~1.1km away
        ];
        let result = prune_stationary_points(&points, 50.0);

        assert_eq!(result.points.len(), 2);
        // Representative point is the anchor at the cluster's start time
        assert_eq!(result.points[0], pt(37.0, -122.0, 0));
        assert_eq!(result.removed.len(), 3);
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.clusters[0].point_count, 4);
        assert_eq!(result.clusters[0].end_ts, 180);
        assert_eq!(result.clusters[1].point_count, 1);
    }

    #[test]
    fn test_prune_removed_points_near_anchor() {
        let points: Vec<PathPoint> = (0..30)
            .map(|i| {
                pt(
                    37.0 + (i % 3) as f64 * 0.00005,
                    -122.0 + (i / 10) as f64 * 0.02,
                    i,
                )
            })
            .collect();
        let min_dist = 100.0;
        let result = prune_stationary_points(&points, min_dist);

        assert!(result.clusters.len() <= points.len());

        // Every removed point must lie within min_dist of the anchor of
        // the cluster that absorbed it
        for removed in &result.removed {
            let absorbed = result.clusters.iter().any(|c| {
                removed.timestamp >= c.start_ts
                    && removed.timestamp <= c.end_ts
                    && haversine_meters(c.lat, c.lon, removed.lat, removed.lon) < min_dist
            });
            assert!(absorbed, "removed point not covered by any cluster");
        }
    }

    #[test]
    fn test_prune_anchor_does_not_drift() {
        // Slow drift: each step is under the threshold relative to its
        // predecessor, but the anchor comparison stops absorption once
        // the drift exceeds the threshold from the FIRST point.
        let points: Vec<PathPoint> = (0..10)
            .map(|i| pt(37.0 + i as f64 * 0.0004, -122.0, i)) // ~44m steps
            .collect();
        let result = prune_stationary_points(&points, 100.0);

        // With a drifting centroid all ten points would merge into one
        // cluster; with a fixed anchor the chain breaks.
        assert!(result.clusters.len() > 1);
        assert_eq!(result.clusters[0].lat, 37.0);
    }

    #[test]
    fn test_spikes_exact_triangle() {
        // dist(A,B) = dist(B,C) = ~1000m, dist(A,C) = ~10m
        let a = pt(37.0, -122.0, 0);
        let b = pt(37.009, -122.0, 60); // ~1km north
        let c = pt(37.00009, -122.0, 120); // ~10m from A
        let result = remove_spikes(&[a, b, c], 500.0);

        assert_eq!(result.points, vec![a, c]);
        assert_eq!(result.removed, vec![b]);
    }

    #[test]
    fn test_spikes_short_sequences_unchanged() {
        let points = vec![pt(37.0, -122.0, 0), pt(38.0, -122.0, 60)];
        let result = remove_spikes(&points, 500.0);
        assert_eq!(result.points, points);
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_spikes_next_point_compared_against_kept_anchor() {
        // After a spike is dropped, the following point is evaluated
        // against the last KEPT point, not the removed spike, so the
        // good fix right after the spike survives.
        let a = pt(37.0, -122.0, 0);
        let spike = pt(37.02, -122.0, 30); // ~2.2km away
        let back = pt(37.0001, -122.0, 60); // ~11m from a
        let onward = pt(37.0002, -122.0, 90);
        let result = remove_spikes(&[a, spike, back, onward], 500.0);

        assert_eq!(result.removed, vec![spike]);
        assert_eq!(result.points, vec![a, back, onward]);
    }

    #[test]
    fn test_spikes_two_separate_spikes_removed() {
        let a = pt(37.0, -122.0, 0);
        let s1 = pt(37.02, -122.0, 30);
        let c1 = pt(37.0001, -122.0, 60);
        let s2 = pt(36.98, -122.0, 90);
        let c2 = pt(37.0002, -122.0, 120);
        let result = remove_spikes(&[a, s1, c1, s2, c2], 500.0);

        assert_eq!(result.removed, vec![s1, s2]);
        assert_eq!(result.points, vec![a, c1, c2]);
    }

    #[test]
    fn test_spikes_genuine_movement_kept() {
        // Steady northward run: every pairwise distance exceeds the
        // threshold, so nothing qualifies as a spike
        let points: Vec<PathPoint> = (0..5)
            .map(|i| pt(37.0 + i as f64 * 10.0 * LAT_100M, -122.0, i * 60))
            .collect();
        let result = remove_spikes(&points, 500.0);
        assert_eq!(result.points, points);
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!(
            SimplifyStage::parse("stationary"),
            Some(SimplifyStage::Stationary)
        );
        assert_eq!(SimplifyStage::parse("spikes"), Some(SimplifyStage::Spikes));
        assert_eq!(SimplifyStage::parse("other"), None);
    }
}
