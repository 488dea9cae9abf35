// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Timeline building: turns one day of raw points into a sequence of
//! stops and travel segments, with photos and place names attached.
//!
//! All thresholds are fixed policy constants rather than per-request
//! options, so a given day always produces the same timeline.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{PathPoint, PhotoLocation};
use crate::services::filtering::{prune_stationary_points, StationaryCluster};
use crate::services::geocode::GeocodingService;
use crate::services::geometry::haversine_meters;
use crate::services::paths::PathIndexer;
use serde::Serialize;

/// Stationary-cluster radius used for stop candidates.
const STOP_RADIUS_METERS: f64 = 50.0;
/// Clusters closer than this merge into one stop...
const MERGE_DISTANCE_METERS: f64 = 500.0;
/// ...but only when the time gap between them is short.
const MERGE_MAX_GAP_SECS: i64 = 30 * 60;
/// Merged clusters shorter than this are in-transit noise, not stops.
const MIN_STOP_DURATION_SECS: i64 = 10 * 60;
/// Gaps between stops shorter than this don't get a travel entry.
const MIN_TRAVEL_DURATION_SECS: i64 = 60;
/// Photos this close to a stop's time range are attached to it.
const PHOTO_BUFFER_SECS: i64 = 5 * 60;

/// A timeline entry: either a stop or a travel segment between stops.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,
    pub lat: f64,
    pub lon: f64,
    /// For travel: destination coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_lon: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub place_name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    /// For travel segments: actual path distance, not straight-line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub photos: Vec<TimelinePhoto>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Stop,
    Travel,
}

/// A photo attached to a stop.
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePhoto {
    pub source_id: String,
    pub thumbnail_url: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub filename: String,
}

/// Timeline API response for one date.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineResponse {
    pub date: String,
    pub entries: Vec<TimelineEntry>,
}

/// A stop candidate produced by merging stationary clusters.
///
/// Unlike the anchor-fixed `StationaryCluster`, the merged cluster's
/// position is a point-count-weighted centroid, which absorbs GPS drift
/// around one true location.
#[derive(Debug, Clone, Copy)]
pub struct MergedCluster {
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub point_count: i64,
}

/// Merge adjacent clusters that are close in both space and time.
///
/// Decisions are made strictly left-to-right against the most recently
/// merged cluster; a cluster can only merge with its immediate
/// predecessor, never retroactively with an earlier one.
pub fn merge_clusters(clusters: &[StationaryCluster]) -> Vec<MergedCluster> {
    let mut merged: Vec<MergedCluster> = Vec::new();

    for cluster in clusters {
        let candidate = MergedCluster {
            centroid_lat: cluster.lat,
            centroid_lon: cluster.lon,
            start_ts: cluster.start_ts,
            end_ts: cluster.end_ts,
            point_count: cluster.point_count,
        };

        let Some(last) = merged.last_mut() else {
            merged.push(candidate);
            continue;
        };

        let dist = haversine_meters(
            last.centroid_lat,
            last.centroid_lon,
            candidate.centroid_lat,
            candidate.centroid_lon,
        );
        let gap = candidate.start_ts - last.end_ts;

        if dist <= MERGE_DISTANCE_METERS && gap <= MERGE_MAX_GAP_SECS {
            let total = last.point_count + candidate.point_count;
            last.centroid_lat = (last.centroid_lat * last.point_count as f64
                + candidate.centroid_lat * candidate.point_count as f64)
                / total as f64;
            last.centroid_lon = (last.centroid_lon * last.point_count as f64
                + candidate.centroid_lon * candidate.point_count as f64)
                / total as f64;
            last.end_ts = candidate.end_ts;
            last.point_count = total;
        } else {
            merged.push(candidate);
        }
    }

    merged
}

/// Keep only merged clusters long enough to be real stops.
pub fn filter_stops(merged: Vec<MergedCluster>) -> Vec<MergedCluster> {
    merged
        .into_iter()
        .filter(|c| c.end_ts - c.start_ts >= MIN_STOP_DURATION_SECS)
        .collect()
}

/// Interleave stops with travel segments and attach photos.
///
/// Travel distance is the sum of haversine distances over the raw
/// points whose timestamps fall within the gap, not the straight-line
/// distance between stop centroids.
pub fn build_entries(
    points: &[PathPoint],
    stops: &[MergedCluster],
    photos: &[PhotoLocation],
) -> Vec<TimelineEntry> {
    let mut entries = Vec::new();

    for (i, stop) in stops.iter().enumerate() {
        if i > 0 {
            let prev = &stops[i - 1];
            let travel_start = prev.end_ts;
            let travel_end = stop.start_ts;
            let travel_duration = travel_end - travel_start;

            if travel_duration > MIN_TRAVEL_DURATION_SECS {
                let mut distance = 0.0;
                let mut last_pt: Option<&PathPoint> = None;
                for pt in points {
                    if pt.timestamp >= travel_start && pt.timestamp <= travel_end {
                        if let Some(last) = last_pt {
                            distance += haversine_meters(last.lat, last.lon, pt.lat, pt.lon);
                        }
                        last_pt = Some(pt);
                    }
                }

                entries.push(TimelineEntry {
                    timestamp: travel_start,
                    end_timestamp: Some(travel_end),
                    lat: prev.centroid_lat,
                    lon: prev.centroid_lon,
                    end_lat: Some(stop.centroid_lat),
                    end_lon: Some(stop.centroid_lon),
                    place_name: String::new(),
                    entry_type: EntryType::Travel,
                    duration_seconds: Some(travel_duration),
                    distance_meters: Some(distance),
                    photos: Vec::new(),
                });
            }
        }

        let mut entry = TimelineEntry {
            timestamp: stop.start_ts,
            end_timestamp: Some(stop.end_ts),
            lat: stop.centroid_lat,
            lon: stop.centroid_lon,
            end_lat: None,
            end_lon: None,
            place_name: String::new(),
            entry_type: EntryType::Stop,
            duration_seconds: Some(stop.end_ts - stop.start_ts),
            distance_meters: None,
            photos: Vec::new(),
        };

        for photo in photos {
            if photo.timestamp >= stop.start_ts - PHOTO_BUFFER_SECS
                && photo.timestamp <= stop.end_ts + PHOTO_BUFFER_SECS
            {
                entry.photos.push(TimelinePhoto {
                    source_id: photo.source_id.clone(),
                    thumbnail_url: format!("/api/immich/assets/{}/thumbnail", photo.source_id),
                    filename: photo.filename.clone(),
                });
            }
        }

        entries.push(entry);
    }

    entries
}

/// Builds per-day timelines from the sample store.
#[derive(Clone)]
pub struct TimelineBuilder {
    store: Store,
    indexer: PathIndexer,
    geocoder: Option<GeocodingService>,
}

impl TimelineBuilder {
    pub fn new(store: Store, indexer: PathIndexer, geocoder: Option<GeocodingService>) -> Self {
        Self {
            store,
            indexer,
            geocoder,
        }
    }

    /// Build the timeline for one user and local date.
    pub async fn timeline_for_date(
        &self,
        user_id: &str,
        date: &str,
    ) -> Result<TimelineResponse, AppError> {
        let locations = self
            .indexer
            .query_locations_by_user_date(user_id, date)
            .await?;

        if locations.is_empty() {
            return Ok(TimelineResponse {
                date: date.to_string(),
                entries: Vec::new(),
            });
        }

        let points: Vec<PathPoint> = locations
            .iter()
            .map(|loc| PathPoint {
                lat: loc.lat,
                lon: loc.lon,
                timestamp: loc.timestamp,
            })
            .collect();

        let prune_result = prune_stationary_points(&points, STOP_RADIUS_METERS);

        let start_ts = locations.iter().map(|l| l.timestamp).min().unwrap_or(0);
        let end_ts = locations.iter().map(|l| l.timestamp).max().unwrap_or(0);
        let photos = self.store.query_photo_locations(start_ts, end_ts).await?;

        let stops = filter_stops(merge_clusters(&prune_result.clusters));
        let mut entries = build_entries(&points, &stops, &photos);

        // Geocode stop centroids only; travel segments are never resolved
        if let Some(geocoder) = &self.geocoder {
            let stop_indices: Vec<usize> = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.entry_type == EntryType::Stop)
                .map(|(i, _)| i)
                .collect();
            let geo_points: Vec<(f64, f64)> = stop_indices
                .iter()
                .map(|&i| (entries[i].lat, entries[i].lon))
                .collect();

            if !geo_points.is_empty() {
                match geocoder.reverse_geocode_batch(&geo_points).await {
                    Ok(resolved) => {
                        for (geo_idx, entry_idx) in stop_indices.into_iter().enumerate() {
                            if let Some(place) = resolved.get(&geo_idx) {
                                entries[entry_idx].place_name = place.place_name.clone();
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Reverse geocoding failed, returning timeline without place names");
                    }
                }
            }
        }

        Ok(TimelineResponse {
            date: date.to_string(),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(lat: f64, lon: f64, start_ts: i64, end_ts: i64, point_count: i64) -> StationaryCluster {
        StationaryCluster {
            lat,
            lon,
            start_ts,
            end_ts,
            point_count,
        }
    }

    #[test]
    fn test_merge_close_clusters_with_short_gap() {
        // Two clusters ~200m apart with a 10 minute gap
        let clusters = vec![
            cluster(37.0, -122.0, 0, 600, 10),
            cluster(37.0018, -122.0, 1200, 1800, 10), // ~200m north
        ];
        let merged = merge_clusters(&clusters);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start_ts, 0);
        assert_eq!(merged[0].end_ts, 1800);
        assert_eq!(merged[0].point_count, 20);
        // Equal weights: centroid halfway between the anchors
        assert!((merged[0].centroid_lat - 37.0009).abs() < 1e-9);
    }

    #[test]
    fn test_no_merge_when_far_apart() {
        // ~2km apart; gap irrelevant
        let clusters = vec![
            cluster(37.0, -122.0, 0, 600, 10),
            cluster(37.018, -122.0, 660, 1200, 10),
        ];
        let merged = merge_clusters(&clusters);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_no_merge_when_gap_too_long() {
        // 200m apart but 2 hours between them
        let clusters = vec![
            cluster(37.0, -122.0, 0, 600, 10),
            cluster(37.0018, -122.0, 600 + 2 * 3600, 600 + 2 * 3600 + 600, 10),
        ];
        let merged = merge_clusters(&clusters);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_weighted_centroid() {
        let clusters = vec![
            cluster(37.0, -122.0, 0, 600, 30),
            cluster(37.002, -122.0, 900, 1500, 10),
        ];
        let merged = merge_clusters(&clusters);
        assert_eq!(merged.len(), 1);
        // 30:10 weighting pulls the centroid toward the first cluster
        let expected = (37.0 * 30.0 + 37.002 * 10.0) / 40.0;
        assert!((merged[0].centroid_lat - expected).abs() < 1e-12);
    }

    #[test]
    fn test_merge_is_left_to_right_only() {
        // A chain where each neighbor is within range of the previous
        // merged cluster, but the third is far from the first: merging
        // proceeds against the running merge result, not the original
        // first cluster.
        let clusters = vec![
            cluster(37.0, -122.0, 0, 600, 10),
            cluster(37.004, -122.0, 700, 1300, 10),
            cluster(37.008, -122.0, 1400, 2000, 10),
        ];
        let merged = merge_clusters(&clusters);
        // First two merge (centroid 37.002); third is ~660m from that
        // centroid, beyond the merge distance
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].point_count, 20);
        assert_eq!(merged[1].point_count, 10);
    }

    #[test]
    fn test_filter_stops_by_duration() {
        let merged = vec![
            MergedCluster {
                centroid_lat: 37.0,
                centroid_lon: -122.0,
                start_ts: 0,
                end_ts: 5 * 60, // 5 minutes: too short
                point_count: 5,
            },
            MergedCluster {
                centroid_lat: 37.1,
                centroid_lon: -122.0,
                start_ts: 1000,
                end_ts: 1000 + 20 * 60, // 20 minutes: a real stop
                point_count: 20,
            },
        ];
        let stops = filter_stops(merged);
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].centroid_lat, 37.1);
    }

    #[test]
    fn test_build_entries_interleaves_travel() {
        let stops = vec![
            MergedCluster {
                centroid_lat: 37.0,
                centroid_lon: -122.0,
                start_ts: 0,
                end_ts: 1200,
                point_count: 10,
            },
            MergedCluster {
                centroid_lat: 37.02,
                centroid_lon: -122.0,
                start_ts: 3600,
                end_ts: 5400,
                point_count: 10,
            },
        ];
        // Raw points during the gap, ~1.1km apart each
        let points = vec![
            PathPoint {
                lat: 37.0,
                lon: -122.0,
                timestamp: 1200,
            },
            PathPoint {
                lat: 37.01,
                lon: -122.0,
                timestamp: 2400,
            },
            PathPoint {
                lat: 37.02,
                lon: -122.0,
                timestamp: 3600,
            },
        ];

        let entries = build_entries(&points, &stops, &[]);
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].entry_type, EntryType::Stop);
        assert_eq!(entries[1].entry_type, EntryType::Travel);
        assert_eq!(entries[2].entry_type, EntryType::Stop);

        let travel = &entries[1];
        assert_eq!(travel.timestamp, 1200);
        assert_eq!(travel.end_timestamp, Some(3600));
        assert_eq!(travel.duration_seconds, Some(2400));
        // Sum over raw points: 2 segments of ~1.1km
        let distance = travel.distance_meters.unwrap();
        assert!((distance - 2224.0).abs() < 50.0, "got {}", distance);
    }

    #[test]
    fn test_build_entries_skips_tiny_gaps() {
        let stops = vec![
            MergedCluster {
                centroid_lat: 37.0,
                centroid_lon: -122.0,
                start_ts: 0,
                end_ts: 1200,
                point_count: 10,
            },
            MergedCluster {
                centroid_lat: 37.001,
                centroid_lon: -122.0,
                start_ts: 1230, // 30 second gap
                end_ts: 2400,
                point_count: 10,
            },
        ];
        let entries = build_entries(&[], &stops, &[]);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.entry_type == EntryType::Stop));
    }

    #[test]
    fn test_build_entries_attaches_photos_with_buffer() {
        let stops = vec![MergedCluster {
            centroid_lat: 37.0,
            centroid_lon: -122.0,
            start_ts: 1000,
            end_ts: 2000,
            point_count: 10,
        }];
        let photos = vec![
            PhotoLocation {
                timestamp: 800, // within the 5-minute buffer before the stop
                lat: 37.0,
                lon: -122.0,
                source_id: "asset-1".to_string(),
                web_url: String::new(),
                filename: "a.jpg".to_string(),
            },
            PhotoLocation {
                timestamp: 5000, // well outside
                lat: 37.0,
                lon: -122.0,
                source_id: "asset-2".to_string(),
                web_url: String::new(),
                filename: "b.jpg".to_string(),
            },
        ];

        let entries = build_entries(&[], &stops, &photos);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].photos.len(), 1);
        assert_eq!(entries[0].photos[0].source_id, "asset-1");
    }
}
