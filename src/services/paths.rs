// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Path indexing: buckets raw samples into per-user per-local-day Path
//! records and serves simplified viewport geometry.
//!
//! Incremental ingestion is implemented as full per-day recomputation:
//! for every affected (user, date) bucket the indexer re-queries ALL
//! stored samples and rebuilds the whole path. That trades redundant
//! work for idempotence under duplicate delivery.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{BBox, Location, Path, PathPoint};
use crate::services::filtering::{
    prune_stationary_points, remove_spikes, RemovedPoints, SimplifyOptions, SimplifyStage,
};
use crate::services::geometry::{simplify_path, tolerance_from_bbox};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Estimated UTC offset in hours from longitude alone.
///
/// Each 15 degrees of longitude is one hour; clamped to the real-world
/// offset range. A rough approximation, not a timezone database.
fn timezone_offset_hours(lon: f64) -> i32 {
    ((lon / 15.0).round() as i32).clamp(-12, 14)
}

/// Local calendar date (YYYY-MM-DD) for a timestamp at the given
/// coordinates, using the longitude heuristic. Samples near local
/// midnight may land on an adjacent day; that assignment is re-derived
/// on every recomputation.
pub fn local_date_for(timestamp: i64, _lat: f64, lon: f64) -> String {
    let offset = FixedOffset::east_opt(timezone_offset_hours(lon) * 3600)
        .expect("offset within clamped range");
    let utc = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default();
    utc.with_timezone(&offset).format("%Y-%m-%d").to_string()
}

/// Group locations into per-(user, local date) paths with tight bounds
/// and timestamp-ordered points.
pub fn compute_paths_for_locations(locations: &[Location]) -> HashMap<(String, String), Path> {
    let mut paths: HashMap<(String, String), Path> = HashMap::new();

    for loc in locations {
        let date = local_date_for(loc.timestamp, loc.lat, loc.lon);
        let key = (loc.user_id.clone(), date.clone());

        let path = paths.entry(key).or_insert_with(|| Path {
            id: 0,
            user_id: loc.user_id.clone(),
            date,
            start_ts: loc.timestamp,
            end_ts: loc.timestamp,
            min_lat: loc.lat,
            max_lat: loc.lat,
            min_lon: loc.lon,
            max_lon: loc.lon,
            point_count: 0,
            points: Vec::new(),
        });

        path.start_ts = path.start_ts.min(loc.timestamp);
        path.end_ts = path.end_ts.max(loc.timestamp);
        path.min_lat = path.min_lat.min(loc.lat);
        path.max_lat = path.max_lat.max(loc.lat);
        path.min_lon = path.min_lon.min(loc.lon);
        path.max_lon = path.max_lon.max(loc.lon);

        path.points.push(PathPoint {
            lat: loc.lat,
            lon: loc.lon,
            timestamp: loc.timestamp,
        });
        path.point_count += 1;
    }

    for path in paths.values_mut() {
        path.points.sort_by_key(|p| p.timestamp);
    }

    paths
}

/// Paths plus the points removed by each simplification stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathsResult {
    pub paths: Vec<Path>,
    pub removed: RemovedPoints,
}

/// Maintains the pre-computed path index.
#[derive(Clone)]
pub struct PathIndexer {
    store: Store,
}

impl PathIndexer {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// All locations for a user whose *local* date matches.
    ///
    /// Local dates cannot be queried directly from UTC timestamps, so
    /// this scans a generous window around the date and filters by each
    /// sample's own local-date assignment.
    pub async fn query_locations_by_user_date(
        &self,
        user_id: &str,
        date: &str,
    ) -> Result<Vec<Location>, AppError> {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest(format!("invalid date: {}", date)))?;
        let midnight = Utc
            .from_utc_datetime(&day.and_hms_opt(0, 0, 0).expect("midnight is valid"))
            .timestamp();

        let start_ts = midnight - 36 * 3600;
        let end_ts = midnight + 48 * 3600;

        let locations = self
            .store
            .query_locations_in_window(user_id, start_ts, end_ts)
            .await?;

        Ok(locations
            .into_iter()
            .filter(|loc| local_date_for(loc.timestamp, loc.lat, loc.lon) == date)
            .collect())
    }

    /// Re-derive and upsert the paths affected by a batch of new
    /// locations. The whole day is recomputed from the sample store for
    /// every affected bucket.
    pub async fn update_for_locations(&self, locations: &[Location]) -> Result<(), AppError> {
        if locations.is_empty() {
            return Ok(());
        }

        let mut buckets: HashSet<(String, String)> = HashSet::new();
        for loc in locations {
            let date = local_date_for(loc.timestamp, loc.lat, loc.lon);
            buckets.insert((loc.user_id.clone(), date));
        }

        for (user_id, date) in buckets {
            let all_locs = self.query_locations_by_user_date(&user_id, &date).await?;

            let paths = compute_paths_for_locations(&all_locs);
            let Some(path) = paths.get(&(user_id, date)) else {
                continue;
            };

            self.store.upsert_path(path).await?;
        }

        Ok(())
    }

    /// Clear the path index and recompute it from the full sample store.
    /// Used after algorithm changes and bulk imports.
    pub async fn rebuild_all(&self) -> Result<(), AppError> {
        self.store.delete_all_paths().await?;

        let locations = self.store.query_all_locations().await?;
        let paths = compute_paths_for_locations(&locations);

        tracing::info!(
            locations = locations.len(),
            paths = paths.len(),
            "Rebuilding path index"
        );

        for path in paths.values() {
            self.store.upsert_path(path).await?;
        }

        Ok(())
    }

    /// Paths intersecting the viewport with points loaded, filtered and
    /// simplified.
    ///
    /// Enabled stages run in the requested order; the final step is
    /// always Douglas-Peucker at the viewport-derived tolerance. Points
    /// removed by each stage are collected across paths and returned.
    pub async fn query_paths_with_points(
        &self,
        bbox: BBox,
        start: Option<i64>,
        end: Option<i64>,
        opts: &SimplifyOptions,
    ) -> Result<PathsResult, AppError> {
        let mut paths = self.store.query_paths_by_bbox(bbox, start, end).await?;
        let tolerance = tolerance_from_bbox(bbox);

        let mut removed = RemovedPoints::default();

        for path in &mut paths {
            let mut points = self.store.get_path_points(path.id).await?;

            for stage in &opts.order {
                match stage {
                    SimplifyStage::Stationary if opts.prune_meters > 0.0 => {
                        let result = prune_stationary_points(&points, opts.prune_meters);
                        points = result.points;
                        removed.stationary.extend(result.removed);
                    }
                    SimplifyStage::Spikes if opts.spike_meters > 0.0 => {
                        let result = remove_spikes(&points, opts.spike_meters);
                        points = result.points;
                        removed.spikes.extend(result.removed);
                    }
                    _ => {}
                }
            }

            path.points = simplify_path(&points, tolerance);
        }

        Ok(PathsResult { paths, removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(timestamp: i64, user_id: &str, lat: f64, lon: f64) -> Location {
        Location {
            timestamp,
            user_id: user_id.to_string(),
            device_id: "test-device".to_string(),
            lat,
            lon,
            altitude_m: None,
            accuracy_m: None,
            speed_kmh: None,
            source: None,
        }
    }

    #[test]
    fn test_timezone_offset_from_longitude() {
        assert_eq!(timezone_offset_hours(0.0), 0);
        assert_eq!(timezone_offset_hours(-122.4), -8); // California
        assert_eq!(timezone_offset_hours(139.7), 9); // Tokyo
        assert_eq!(timezone_offset_hours(-179.9), -12); // clamped
        assert_eq!(timezone_offset_hours(179.9), 12);
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 2024-06-15 02:00 UTC is 2024-06-14 18:00 in California (-8)
        let ts = Utc
            .with_ymd_and_hms(2024, 6, 15, 2, 0, 0)
            .unwrap()
            .timestamp();
        assert_eq!(local_date_for(ts, 37.0, -122.4), "2024-06-14");
        // ...but still 2024-06-15 at Greenwich
        assert_eq!(local_date_for(ts, 51.5, 0.0), "2024-06-15");
    }

    #[test]
    fn test_compute_paths_buckets_by_user_and_date() {
        let day1 = Utc
            .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .unwrap()
            .timestamp();
        let day2 = day1 + 24 * 3600;

        let locations = vec![
            loc(day1, "alice", 37.0, 0.0),
            loc(day1 + 60, "alice", 37.1, 0.0),
            loc(day2, "alice", 37.2, 0.0),
            loc(day1, "bob", 48.0, 0.0),
        ];

        let paths = compute_paths_for_locations(&locations);
        assert_eq!(paths.len(), 3);

        let alice_day1 = paths
            .get(&("alice".to_string(), "2024-06-15".to_string()))
            .unwrap();
        assert_eq!(alice_day1.point_count, 2);
        assert_eq!(alice_day1.min_lat, 37.0);
        assert_eq!(alice_day1.max_lat, 37.1);
        assert_eq!(alice_day1.start_ts, day1);
        assert_eq!(alice_day1.end_ts, day1 + 60);
    }

    #[test]
    fn test_compute_paths_sorts_points_by_timestamp() {
        let base = Utc
            .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .unwrap()
            .timestamp();
        // Deliberately out of order
        let locations = vec![
            loc(base + 120, "alice", 37.2, 0.0),
            loc(base, "alice", 37.0, 0.0),
            loc(base + 60, "alice", 37.1, 0.0),
        ];

        let paths = compute_paths_for_locations(&locations);
        let path = paths
            .get(&("alice".to_string(), "2024-06-15".to_string()))
            .unwrap();
        let timestamps: Vec<i64> = path.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![base, base + 60, base + 120]);
    }

    #[test]
    fn test_compute_paths_bounds_are_tight() {
        let base = Utc
            .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .unwrap()
            .timestamp();
        let locations = vec![
            loc(base, "alice", 37.5, -122.1),
            loc(base + 60, "alice", 37.2, -122.5),
            loc(base + 120, "alice", 37.9, -122.3),
        ];

        let paths = compute_paths_for_locations(&locations);
        let path = paths
            .get(&("alice".to_string(), "2024-06-15".to_string()))
            .unwrap();
        assert_eq!(path.min_lat, 37.2);
        assert_eq!(path.max_lat, 37.9);
        assert_eq!(path.min_lon, -122.5);
        assert_eq!(path.max_lon, -122.1);
    }
}
