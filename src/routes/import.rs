// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Immich import routes: connection status, preview, job lifecycle,
//! progress streaming, thumbnails and incremental sync.

use crate::error::{AppError, Result};
use crate::models::{ImportConfig, ImportJob};
use crate::services::backfill::{BackfillManager, ImportProgress, PreviewProgress};
use crate::services::immich::ImmichClient;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/immich/status", get(immich_status))
        .route("/api/immich/preview", get(preview))
        .route("/api/immich/import", post(start_import))
        .route("/api/immich/jobs", get(list_jobs))
        .route("/api/immich/jobs/{id}", get(get_job))
        .route("/api/immich/jobs/{id}/resume", post(resume_job))
        .route("/api/immich/jobs/{id}/cancel", post(cancel_job))
        .route("/api/immich/jobs/{id}/stream", get(stream_job))
        .route("/api/immich/assets/{id}/thumbnail", get(thumbnail))
        .route("/api/immich/sync", post(sync_now))
        .route("/api/immich/sync/status", get(sync_status))
}

fn require_manager(state: &AppState) -> Result<&BackfillManager> {
    state.backfill.as_ref().ok_or(AppError::ImmichNotConfigured)
}

fn require_client(state: &AppState) -> Result<&ImmichClient> {
    state.immich.as_ref().ok_or(AppError::ImmichNotConfigured)
}

// ─── Status ──────────────────────────────────────────────────────

/// GET /api/immich/status - Immich connection status
async fn immich_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let Some(client) = state.immich.as_ref() else {
        return Json(serde_json::json!({
            "configured": false,
            "message": "Set IMMICH_URL and IMMICH_API_KEY",
        }));
    };

    match client.validate_connection().await {
        Ok(()) => Json(serde_json::json!({
            "configured": true,
            "connected": true,
            "url": client.base_url(),
        })),
        Err(e) => Json(serde_json::json!({
            "configured": true,
            "connected": false,
            "url": client.base_url(),
            "error": e.to_string(),
        })),
    }
}

// ─── Import Jobs ─────────────────────────────────────────────────

/// Request body for POST /api/immich/import.
#[derive(Debug, Default, Deserialize)]
struct ImportRequest {
    /// RFC 3339 timestamp
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    before: Option<String>,
    #[serde(default)]
    cameras: Vec<String>,
    #[serde(default)]
    user_id: Option<String>,
}

fn parse_rfc3339(value: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>> {
    match value {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| AppError::BadRequest(format!("invalid {} timestamp", field))),
    }
}

impl ImportRequest {
    fn into_config(self, default_user: &str) -> Result<ImportConfig> {
        Ok(ImportConfig {
            after: parse_rfc3339(self.after.as_deref(), "after")?,
            before: parse_rfc3339(self.before.as_deref(), "before")?,
            cameras: self.cameras,
            user_id: self
                .user_id
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| default_user.to_string()),
        })
    }
}

/// POST /api/immich/import - Start a new import job
async fn start_import(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<serde_json::Value>> {
    let manager = require_manager(&state)?;
    let config = req.into_config(&state.config.default_user)?;

    let job_id = manager.start_import(config).await?;
    Ok(Json(serde_json::json!({
        "job_id": job_id,
        "status": "running",
    })))
}

/// GET /api/immich/jobs - List all import jobs
async fn list_jobs(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let jobs: Vec<ImportJob> = state.store.list_import_jobs().await?;
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

/// GET /api/immich/jobs/{id} - Progress for one job
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ImportProgress>> {
    let manager = require_manager(&state)?;
    Ok(Json(manager.job_progress(&id).await?))
}

/// POST /api/immich/jobs/{id}/resume - Resume an interrupted/failed job
async fn resume_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let manager = require_manager(&state)?;
    manager.resume_import(&id).await?;
    Ok(Json(serde_json::json!({"status": "resumed"})))
}

/// POST /api/immich/jobs/{id}/cancel - Cancel a running job
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let manager = require_manager(&state)?;
    manager.cancel_import(&id).await?;
    Ok(Json(serde_json::json!({"status": "cancelled"})))
}

// ─── Progress Streaming (SSE) ────────────────────────────────────

fn progress_event(progress: &ImportProgress) -> Event {
    let event_type = match progress.status {
        crate::models::JobStatus::Completed => "complete",
        crate::models::JobStatus::Failed => "error",
        _ => "progress",
    };
    Event::default()
        .event(event_type)
        .json_data(progress)
        .unwrap_or_default()
}

/// GET /api/immich/jobs/{id}/stream - SSE progress stream for a job
async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let manager = require_manager(&state)?;

    // Send the current snapshot first; if the job is already finished
    // that is also the only event.
    let snapshot = manager.job_progress(&id).await?;
    let live = snapshot.status == crate::models::JobStatus::Running;
    let receiver = live.then(|| manager.subscribe(&id));

    let stream = futures_util::stream::unfold(
        (Some(snapshot), receiver),
        |(snapshot, mut receiver)| async move {
            if let Some(snapshot) = snapshot {
                return Some((Ok::<_, Infallible>(progress_event(&snapshot)), (None, receiver)));
            }
            let rx = receiver.as_mut()?;
            let progress = rx.recv().await?;
            Some((Ok(progress_event(&progress)), (None, receiver)))
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Default, Deserialize)]
struct PreviewQuery {
    after: Option<String>,
    before: Option<String>,
}

fn preview_event(progress: &PreviewProgress) -> Event {
    let event_type = if progress.error.is_some() {
        "error"
    } else if progress.complete {
        "complete"
    } else {
        "progress"
    };
    Event::default()
        .event(event_type)
        .json_data(progress)
        .unwrap_or_default()
}

/// GET /api/immich/preview - SSE preview of what an import would scan
async fn preview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PreviewQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let manager = require_manager(&state)?.clone();

    let config = ImportConfig {
        after: parse_rfc3339(query.after.as_deref(), "after")?,
        before: parse_rfc3339(query.before.as_deref(), "before")?,
        cameras: Vec::new(),
        user_id: state.config.default_user.clone(),
    };

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        manager.preview(&config, tx).await;
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        let progress = rx.recv().await?;
        Some((Ok::<_, Infallible>(preview_event(&progress)), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ─── Thumbnails ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ThumbnailQuery {
    #[serde(default)]
    size: Option<String>,
}

/// GET /api/immich/assets/{id}/thumbnail - Proxy a thumbnail from Immich
async fn thumbnail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ThumbnailQuery>,
) -> Result<impl IntoResponse> {
    let client = require_client(&state)?;
    let (data, content_type) = client
        .get_thumbnail(&id, query.size.as_deref().unwrap_or(""))
        .await?;

    Ok((
        [
            (axum::http::header::CONTENT_TYPE, content_type),
            (
                axum::http::header::CACHE_CONTROL,
                "public, max-age=86400".to_string(),
            ),
        ],
        data,
    ))
}

// ─── Incremental Sync ────────────────────────────────────────────

/// POST /api/immich/sync - Import everything newer than the last sync
async fn sync_now(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let manager = require_manager(&state)?;

    let last_sync = state.store.get_last_sync().await?;
    let config = ImportConfig {
        after: last_sync.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        before: None,
        cameras: Vec::new(),
        user_id: state.config.default_user.clone(),
    };

    let job_id = manager.start_import(config).await?;

    // The import is already running; a failed bookmark update only means
    // the next sync rescans some photos
    if let Err(e) = state.store.set_last_sync(Utc::now().timestamp()).await {
        tracing::warn!(error = %e, "Failed to update sync state");
    }

    Ok(Json(serde_json::json!({
        "job_id": job_id,
        "status": "running",
    })))
}

/// GET /api/immich/sync/status - Timestamp of the last sync
async fn sync_status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let last_sync = state.store.get_last_sync().await?;
    Ok(Json(serde_json::json!({ "last_sync": last_sync })))
}
