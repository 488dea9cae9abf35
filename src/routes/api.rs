// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ingestion and read API routes: tracker push endpoints, viewport
//! paths, bounds, latest location and the daily timeline.

use crate::error::{AppError, Result};
use crate::models::{BBox, Bounds, Location, LocationSource, PathPoint};
use crate::services::filtering::{RemovedPoints, SimplifyOptions, SimplifyStage};
use crate::services::timeline::TimelineResponse;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/owntracks", post(owntracks))
        .route("/gpslogger", get(gpslogger))
        .route("/api/paths", get(api_paths))
        .route("/api/paths/rebuild", post(api_paths_rebuild))
        .route("/api/bounds", get(api_bounds))
        .route("/api/latest", get(api_latest))
        .route("/api/location/source", get(api_location_source))
        .route("/api/timeline", get(api_timeline))
}

// ─── Ingestion ───────────────────────────────────────────────────

/// OwnTracks JSON payload.
#[derive(Debug, Deserialize)]
struct OwnTracksPayload {
    #[serde(rename = "_type")]
    payload_type: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    /// Unix seconds
    #[serde(rename = "tst", default)]
    timestamp: i64,
    #[serde(rename = "tid", default)]
    tracker_id: String,
    /// Accuracy in meters
    #[serde(rename = "acc")]
    accuracy: Option<f64>,
    /// Altitude in meters
    #[serde(rename = "alt")]
    altitude: Option<f64>,
    /// Velocity in km/h
    #[serde(rename = "vel")]
    velocity: Option<f64>,
}

/// POST /owntracks - OwnTracks compatible endpoint
async fn owntracks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<OwnTracksPayload>,
) -> Result<Json<serde_json::Value>> {
    // Ignore non-location messages (lwt, waypoint, ...)
    if payload.payload_type != "location" {
        return Ok(Json(serde_json::json!({})));
    }

    let user_id = headers
        .get("x-limit-u")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(&state.config.default_user)
        .to_string();

    let loc = Location {
        timestamp: payload.timestamp,
        user_id,
        device_id: payload.tracker_id,
        lat: payload.lat,
        lon: payload.lon,
        altitude_m: payload.altitude,
        accuracy_m: payload.accuracy,
        speed_kmh: payload.velocity,
        source: Some("owntracks".to_string()),
    };

    state.store.insert_location(&loc).await?;

    // The sample is saved; a failed path update is recoverable via rebuild
    if let Err(e) = state.indexer.update_for_locations(std::slice::from_ref(&loc)).await {
        tracing::warn!(error = %e, "Path update failed after OwnTracks ingest");
    }

    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct GpsLoggerQuery {
    lat: f64,
    lon: f64,
    time: Option<String>,
}

/// GET /gpslogger - GPSLogger compatible endpoint
async fn gpslogger(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GpsLoggerQuery>,
) -> Result<&'static str> {
    let timestamp = match query.time.as_deref() {
        Some(time) => {
            // Unix seconds or ISO 8601, falling back to the server clock
            if let Ok(ts) = time.parse::<i64>() {
                ts
            } else if let Ok(t) = chrono::DateTime::parse_from_rfc3339(time) {
                t.timestamp()
            } else {
                chrono::Utc::now().timestamp()
            }
        }
        None => chrono::Utc::now().timestamp(),
    };

    let loc = Location {
        timestamp,
        user_id: state.config.default_user.clone(),
        device_id: "gpslogger".to_string(),
        lat: query.lat,
        lon: query.lon,
        altitude_m: None,
        accuracy_m: None,
        speed_kmh: None,
        source: Some("gpslogger".to_string()),
    };

    state.store.insert_location(&loc).await?;

    if let Err(e) = state.indexer.update_for_locations(std::slice::from_ref(&loc)).await {
        tracing::warn!(error = %e, "Path update failed after GPSLogger ingest");
    }

    Ok("OK")
}

// ─── Read API ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PathsQuery {
    bbox: String,
    start: Option<i64>,
    end: Option<i64>,
    /// Stationary pruning threshold in meters
    prune: Option<f64>,
    /// Spike detection threshold in meters
    spikes: Option<f64>,
    /// Comma-separated stage order, e.g. "stationary,spikes"
    order: Option<String>,
}

/// Response for /api/paths: simplified paths plus the points each
/// filtering stage removed, plus the current location when it falls in
/// the requested time range.
#[derive(Serialize)]
struct PathsResponse {
    paths: Vec<crate::models::Path>,
    current: Option<PathPoint>,
    removed: RemovedPoints,
}

/// GET /api/paths - Pre-computed paths intersecting the bounding box
async fn api_paths(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathsQuery>,
) -> Result<Json<PathsResponse>> {
    let bbox = BBox::parse(&query.bbox)
        .ok_or_else(|| AppError::BadRequest("invalid bbox format".to_string()))?;

    let mut opts = SimplifyOptions {
        prune_meters: query.prune.unwrap_or(0.0).max(0.0),
        spike_meters: query.spikes.unwrap_or(0.0).max(0.0),
        ..Default::default()
    };
    if let Some(order) = &query.order {
        opts.order = order.split(',').filter_map(SimplifyStage::parse).collect();
    }

    let result = state
        .indexer
        .query_paths_with_points(bbox, query.start, query.end, &opts)
        .await?;

    // Include the current location only if it falls in the time range
    let current = state.store.latest_location().await?.and_then(|loc| {
        let in_range = query.start.is_none_or(|start| loc.timestamp >= start)
            && query.end.is_none_or(|end| loc.timestamp <= end);
        in_range.then_some(PathPoint {
            lat: loc.lat,
            lon: loc.lon,
            timestamp: loc.timestamp,
        })
    });

    Ok(Json(PathsResponse {
        paths: result.paths,
        current,
        removed: result.removed,
    }))
}

/// POST /api/paths/rebuild - Rebuild all paths from scratch
async fn api_paths_rebuild(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>> {
    state.indexer.rebuild_all().await?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
struct BoundsQuery {
    start: i64,
    end: i64,
}

/// GET /api/bounds - Bounding box for locations in a time range
async fn api_bounds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BoundsQuery>,
) -> Result<Json<Option<Bounds>>> {
    let bounds = state.store.bounds_for_range(query.start, query.end).await?;
    Ok(Json(bounds))
}

/// GET /api/latest - Most recent location
async fn api_latest(State(state): State<Arc<AppState>>) -> Result<Json<Option<Location>>> {
    let loc = state.store.latest_location().await?;
    Ok(Json(loc))
}

#[derive(Debug, Deserialize)]
struct SourceQuery {
    timestamp: i64,
    device_id: Option<String>,
}

/// Response for /api/location/source with metadata fields unpacked.
#[derive(Serialize)]
struct LocationSourceResponse {
    source_type: String,
    source_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    web_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    filename: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    make: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    model: String,
}

/// GET /api/location/source - Provenance for a location point
async fn api_location_source(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Option<LocationSourceResponse>>> {
    let source: Option<LocationSource> = match query.device_id.as_deref() {
        Some(device_id) if !device_id.is_empty() => {
            state
                .store
                .get_location_source(query.timestamp, device_id)
                .await?
        }
        _ => {
            state
                .store
                .get_location_source_by_timestamp(query.timestamp)
                .await?
        }
    };

    let resp = source.map(|source| {
        let meta: std::collections::HashMap<String, String> =
            serde_json::from_str(&source.metadata).unwrap_or_default();
        LocationSourceResponse {
            source_type: source.source_type,
            source_id: source.source_id,
            web_url: meta.get("web_url").cloned().unwrap_or_default(),
            filename: meta.get("filename").cloned().unwrap_or_default(),
            make: meta.get("make").cloned().unwrap_or_default(),
            model: meta.get("model").cloned().unwrap_or_default(),
        }
    });

    Ok(Json(resp))
}

#[derive(Debug, Deserialize)]
struct TimelineQuery {
    /// YYYY-MM-DD
    date: String,
    /// Defaults to the configured default user
    user: Option<String>,
}

/// GET /api/timeline - Stops and travel segments for a date
async fn api_timeline(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<TimelineResponse>> {
    if chrono::NaiveDate::parse_from_str(&query.date, "%Y-%m-%d").is_err() {
        return Err(AppError::BadRequest(
            "invalid date format, use YYYY-MM-DD".to_string(),
        ));
    }

    let user_id = query.user.as_deref().unwrap_or(&state.config.default_user);
    let timeline = state.timeline.timeline_for_date(user_id, &query.date).await?;
    Ok(Json(timeline))
}
