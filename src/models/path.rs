// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pre-computed daily paths and their points.

use serde::{Deserialize, Serialize};

/// A single point in a path. Sequences of points are always ordered by
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: i64,
}

/// The renderable point sequence for one user on one local calendar day.
///
/// The spatial and temporal bounds are always the tight envelope of the
/// current points. The date comes from each sample's own longitude-based
/// timezone estimate, so samples near local midnight can move to the
/// adjacent day's path on recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    pub id: i64,
    pub user_id: String,
    /// YYYY-MM-DD in estimated local time
    pub date: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub point_count: i64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub points: Vec<PathPoint>,
}
