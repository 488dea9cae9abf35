// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Path indexer integration tests: incremental updates, rebuilds and
//! the viewport simplification pipeline.

mod common;

use common::{test_location, test_store};
use whence::models::BBox;
use whence::services::filtering::{SimplifyOptions, SimplifyStage};
use whence::services::PathIndexer;

/// Noon UTC on 2024-06-15; at lon ~0 the local date matches the UTC date.
const NOON: i64 = 1_718_452_800;

fn bbox_around_greenwich() -> BBox {
    BBox {
        sw_lng: -1.0,
        sw_lat: 50.0,
        ne_lng: 1.0,
        ne_lat: 52.0,
    }
}

#[tokio::test]
async fn test_update_for_locations_builds_daily_path() {
    let store = test_store();
    let indexer = PathIndexer::new(store.clone());

    let batch: Vec<_> = (0..4)
        .map(|i| test_location(NOON + i * 60, "alice", "phone", 51.0 + i as f64 * 0.01, 0.0))
        .collect();
    let (inserted, _) = store.insert_location_batch(&batch).await.unwrap();
    assert_eq!(inserted, 4);

    indexer.update_for_locations(&batch).await.unwrap();

    let paths = store
        .query_paths_by_bbox(bbox_around_greenwich(), None, None)
        .await
        .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].user_id, "alice");
    assert_eq!(paths[0].date, "2024-06-15");
    assert_eq!(paths[0].point_count, 4);
    assert_eq!(paths[0].min_lat, 51.0);
    assert_eq!(paths[0].max_lat, 51.03);

    let points = store.get_path_points(paths[0].id).await.unwrap();
    assert_eq!(points.len(), 4);
    assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_duplicate_delivery_does_not_duplicate_points() {
    let store = test_store();
    let indexer = PathIndexer::new(store.clone());

    let batch: Vec<_> = (0..3)
        .map(|i| test_location(NOON + i * 60, "alice", "phone", 51.0, 0.001 * i as f64))
        .collect();

    store.insert_location_batch(&batch).await.unwrap();
    indexer.update_for_locations(&batch).await.unwrap();

    // The same batch arrives again: inserts are ignored and the path is
    // recomputed from the store, so nothing changes
    let (inserted, skipped) = store.insert_location_batch(&batch).await.unwrap();
    assert_eq!((inserted, skipped), (0, 3));
    indexer.update_for_locations(&batch).await.unwrap();

    let paths = store
        .query_paths_by_bbox(bbox_around_greenwich(), None, None)
        .await
        .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].point_count, 3);
    assert_eq!(store.get_path_points(paths[0].id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_incremental_update_merges_new_samples_into_existing_day() {
    let store = test_store();
    let indexer = PathIndexer::new(store.clone());

    let morning: Vec<_> = (0..3)
        .map(|i| test_location(NOON + i * 60, "alice", "phone", 51.0, 0.01 * i as f64))
        .collect();
    store.insert_location_batch(&morning).await.unwrap();
    indexer.update_for_locations(&morning).await.unwrap();

    // New samples for the same day arrive later, possibly from another
    // device
    let evening: Vec<_> = (0..2)
        .map(|i| test_location(NOON + 4 * 3600 + i * 60, "alice", "camera", 51.2, 0.05))
        .collect();
    store.insert_location_batch(&evening).await.unwrap();
    indexer.update_for_locations(&evening).await.unwrap();

    let paths = store
        .query_paths_by_bbox(bbox_around_greenwich(), None, None)
        .await
        .unwrap();
    assert_eq!(paths.len(), 1, "one path per user per day");
    assert_eq!(paths[0].point_count, 5);
    assert_eq!(paths[0].max_lat, 51.2);
    assert_eq!(paths[0].end_ts, NOON + 4 * 3600 + 60);
}

#[tokio::test]
async fn test_rebuild_all_recomputes_from_samples() {
    let store = test_store();
    let indexer = PathIndexer::new(store.clone());

    let batch: Vec<_> = (0..3)
        .map(|i| test_location(NOON + i * 60, "alice", "phone", 51.0, 0.01 * i as f64))
        .collect();
    store.insert_location_batch(&batch).await.unwrap();
    indexer.update_for_locations(&batch).await.unwrap();

    // Sabotage the index, then rebuild
    store.delete_all_paths().await.unwrap();
    assert!(store
        .query_paths_by_bbox(bbox_around_greenwich(), None, None)
        .await
        .unwrap()
        .is_empty());

    indexer.rebuild_all().await.unwrap();

    let paths = store
        .query_paths_by_bbox(bbox_around_greenwich(), None, None)
        .await
        .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].point_count, 3);
}

#[tokio::test]
async fn test_viewport_pipeline_prunes_and_simplifies() {
    let store = test_store();
    let indexer = PathIndexer::new(store.clone());

    // A stationary cluster (10 points within meters) followed by a
    // straight run the simplifier can collapse
    let mut batch = Vec::new();
    for i in 0..10 {
        batch.push(test_location(
            NOON + i * 30,
            "alice",
            "phone",
            51.0 + (i % 2) as f64 * 0.00001,
            0.0,
        ));
    }
    for i in 0..5 {
        batch.push(test_location(
            NOON + 1000 + i * 60,
            "alice",
            "phone",
            51.01 + i as f64 * 0.01,
            0.0,
        ));
    }
    store.insert_location_batch(&batch).await.unwrap();
    indexer.update_for_locations(&batch).await.unwrap();

    let opts = SimplifyOptions {
        prune_meters: 50.0,
        spike_meters: 0.0,
        ..Default::default()
    };
    let result = indexer
        .query_paths_with_points(bbox_around_greenwich(), None, None, &opts)
        .await
        .unwrap();

    assert_eq!(result.paths.len(), 1);
    // Nine of the ten stationary points fold into the anchor
    assert_eq!(result.removed.stationary.len(), 9);
    assert!(result.removed.spikes.is_empty());

    // The collinear run collapses under Douglas-Peucker; far fewer
    // points than raw
    let simplified = &result.paths[0].points;
    assert!(simplified.len() <= 4, "got {} points", simplified.len());
    // Endpoints survive
    assert_eq!(simplified.first().unwrap().timestamp, NOON);
    assert_eq!(simplified.last().unwrap().timestamp, NOON + 1000 + 4 * 60);
}

#[tokio::test]
async fn test_viewport_pipeline_respects_stage_order() {
    let store = test_store();
    let indexer = PathIndexer::new(store.clone());

    // A spike in the middle of a stationary cluster
    let mut batch = vec![
        test_location(NOON, "alice", "phone", 51.0, 0.0),
        test_location(NOON + 60, "alice", "phone", 51.00001, 0.0),
        test_location(NOON + 120, "alice", "phone", 51.05, 0.0), // ~5.5km spike
        test_location(NOON + 180, "alice", "phone", 51.00002, 0.0),
    ];
    batch.push(test_location(NOON + 240, "alice", "phone", 51.00001, 0.0));
    store.insert_location_batch(&batch).await.unwrap();
    indexer.update_for_locations(&batch).await.unwrap();

    // Spikes first: the outlier is detected against its close neighbors
    let opts = SimplifyOptions {
        prune_meters: 50.0,
        spike_meters: 500.0,
        order: vec![SimplifyStage::Spikes, SimplifyStage::Stationary],
    };
    let result = indexer
        .query_paths_with_points(bbox_around_greenwich(), None, None, &opts)
        .await
        .unwrap();
    assert_eq!(result.removed.spikes.len(), 1);
    assert_eq!(result.removed.spikes[0].lat, 51.05);
    // The remaining four stationary points fold into one
    assert_eq!(result.removed.stationary.len(), 3);

    // Disabled stages remove nothing
    let opts = SimplifyOptions::default();
    let result = indexer
        .query_paths_with_points(bbox_around_greenwich(), None, None, &opts)
        .await
        .unwrap();
    assert!(result.removed.stationary.is_empty());
    assert!(result.removed.spikes.is_empty());
}
