// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backfill manager: long-running, resumable imports from the photo
//! store into the location database.
//!
//! Each job runs on its own tokio task. The job row in the database is
//! the source of truth: after every page the worker persists its
//! checkpoint (last page + counters), so a crash loses at most one page
//! of progress and a resume continues from the page after the
//! checkpoint. Progress events are best-effort fan-out on top of that.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{ImportConfig, ImportJob, JobStatus, Location, LocationSource};
use crate::services::immich::{AssetSource, ImmichAsset, SearchOptions};
use crate::services::paths::PathIndexer;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const PAGE_SIZE: i64 = 200;
/// Bounded queue per progress subscriber; updates to a full queue are
/// dropped (slow-consumer policy). Final job state lives in the
/// persisted checkpoint, not in delivered events.
const PROGRESS_CHANNEL_CAPACITY: usize = 10;

/// Progress snapshot broadcast to subscribers and returned from the
/// job-status API.
#[derive(Debug, Clone, Serialize)]
pub struct ImportProgress {
    pub job_id: String,
    pub status: JobStatus,
    pub total: i64,
    pub processed: i64,
    pub imported: i64,
    pub skipped: i64,
    pub errors: i64,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportProgress {
    fn from_job(job: &ImportJob) -> Self {
        let mut total = job.processed;
        let mut percent = 0.0;
        if let Some(t) = job.total {
            if t > 0 {
                total = t;
                percent = job.processed as f64 / t as f64 * 100.0;
            }
        }
        Self {
            job_id: job.id.clone(),
            status: job.status,
            total,
            processed: job.processed,
            imported: job.imported,
            skipped: job.skipped,
            errors: job.errors,
            percent,
            error: job.last_error.clone(),
        }
    }
}

/// Aggregated per-camera stats produced by a preview scan.
#[derive(Debug, Clone, Serialize)]
pub struct CameraPreview {
    pub device_id: String,
    pub count: i64,
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

/// Progress snapshot for a preview scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewProgress {
    pub scanned: i64,
    pub total_estimated: i64,
    pub percent: f64,
    pub photos_with_gps: i64,
    pub cameras: Vec<CameraPreview>,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Manages import jobs: lifecycle, checkpointing, cancellation and
/// progress fan-out.
///
/// The job registry and subscriber map are the only state shared across
/// jobs. Critical sections hold map locks for lookups and mutations
/// only; network and database I/O happen outside.
#[derive(Clone)]
pub struct BackfillManager {
    store: Store,
    source: Arc<dyn AssetSource>,
    indexer: PathIndexer,
    /// Cancellation handle per live worker
    jobs: Arc<DashMap<String, CancellationToken>>,
    /// Progress subscribers per job
    streams: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<ImportProgress>>>>>,
}

impl BackfillManager {
    /// Create the manager and apply crash recovery: any job still
    /// marked running belongs to a previous process and is moved to
    /// interrupted. Interrupted jobs are never resumed automatically.
    pub async fn new(store: Store, source: Arc<dyn AssetSource>, indexer: PathIndexer) -> Self {
        let manager = Self {
            store,
            source,
            indexer,
            jobs: Arc::new(DashMap::new()),
            streams: Arc::new(Mutex::new(HashMap::new())),
        };
        manager.mark_interrupted_jobs().await;
        manager
    }

    async fn mark_interrupted_jobs(&self) {
        let jobs = match self.store.list_import_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list import jobs for crash recovery");
                return;
            }
        };

        for mut job in jobs {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Interrupted;
                job.last_error = Some("server restarted".to_string());
                if let Err(e) = self.store.update_import_job(&job).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as interrupted");
                } else {
                    tracing::warn!(job_id = %job.id, "Marked stale running job as interrupted");
                }
            }
        }
    }

    // ─── Progress Fan-Out ────────────────────────────────────────

    /// Subscribe to progress updates for a job. The returned receiver
    /// yields snapshots until the job finishes (channel closed) or the
    /// receiver is dropped, which unsubscribes implicitly.
    pub fn subscribe(&self, job_id: &str) -> mpsc::Receiver<ImportProgress> {
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        self.streams
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Non-blocking send to every subscriber. A full queue drops the
    /// update; a closed queue drops the subscriber.
    fn broadcast(&self, job_id: &str, progress: &ImportProgress) {
        let mut streams = self.streams.lock().unwrap();
        if let Some(subs) = streams.get_mut(job_id) {
            subs.retain(|tx| match tx.try_send(progress.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }

    /// Drop all subscriber channels for a finished job.
    fn close_streams(&self, job_id: &str) {
        self.streams.lock().unwrap().remove(job_id);
    }

    // ─── Job Lifecycle ───────────────────────────────────────────

    /// Start a new import job. Persists a running job row with an empty
    /// checkpoint, spawns the worker and returns the job id immediately.
    pub async fn start_import(&self, config: ImportConfig) -> Result<String, AppError> {
        let job_id = uuid::Uuid::new_v4().to_string();

        let job = ImportJob {
            id: job_id.clone(),
            status: JobStatus::Running,
            started_at: Utc::now().timestamp(),
            completed_at: None,
            total: None,
            processed: 0,
            imported: 0,
            skipped: 0,
            errors: 0,
            last_page: 0,
            config: config.clone(),
            last_error: None,
        };
        self.store.create_import_job(&job).await?;

        self.spawn_worker(job_id.clone(), config, 1);

        tracing::info!(job_id = %job_id, "Import job started");
        Ok(job_id)
    }

    /// Resume an interrupted or failed job from its checkpoint. The
    /// worker restarts at last_page + 1 with the job's original config.
    pub async fn resume_import(&self, job_id: &str) -> Result<(), AppError> {
        let mut job = self
            .store
            .get_import_job(job_id)
            .await?
            .ok_or(AppError::JobNotFound)?;

        if !job.status.is_resumable() {
            return Err(AppError::JobNotResumable);
        }

        job.status = JobStatus::Running;
        job.last_error = None;
        self.store.update_import_job(&job).await?;

        self.spawn_worker(job_id.to_string(), job.config.clone(), job.last_page + 1);

        tracing::info!(job_id, resume_page = job.last_page + 1, "Import job resumed");
        Ok(())
    }

    /// Request cancellation of a running job. Advisory: the worker
    /// observes the signal between pages, not mid-page. Idempotent in
    /// the sense that a second call on a finished job gets NotFound.
    pub async fn cancel_import(&self, job_id: &str) -> Result<(), AppError> {
        let Some((_, token)) = self.jobs.remove(job_id) else {
            return Err(AppError::JobNotFound);
        };
        token.cancel();

        if let Some(mut job) = self.store.get_import_job(job_id).await? {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now().timestamp());
            self.store.update_import_job(&job).await?;
        }

        tracing::info!(job_id, "Import job cancellation requested");
        Ok(())
    }

    /// Current progress for a job, from its persisted state.
    pub async fn job_progress(&self, job_id: &str) -> Result<ImportProgress, AppError> {
        let job = self
            .store
            .get_import_job(job_id)
            .await?
            .ok_or(AppError::JobNotFound)?;
        Ok(ImportProgress::from_job(&job))
    }

    /// All jobs, most recent first.
    pub async fn list_jobs(&self) -> Result<Vec<ImportJob>, AppError> {
        self.store.list_import_jobs().await
    }

    fn spawn_worker(&self, job_id: String, config: ImportConfig, start_page: i64) {
        let token = CancellationToken::new();
        self.jobs.insert(job_id.clone(), token.clone());

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_import(&job_id, config, start_page, token).await;
            manager.jobs.remove(&job_id);
            manager.close_streams(&job_id);
        });
    }

    // ─── Worker ──────────────────────────────────────────────────

    async fn run_import(
        &self,
        job_id: &str,
        config: ImportConfig,
        start_page: i64,
        token: CancellationToken,
    ) {
        let mut job = match self.store.get_import_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::error!(job_id, "Import worker found no job row");
                return;
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Import worker failed to load job");
                return;
            }
        };

        let allowed_cameras: HashSet<&str> = config.cameras.iter().map(String::as_str).collect();
        let filter_cameras = !allowed_cameras.is_empty();

        let mut page = start_page;
        loop {
            // Cancellation is checked between pages only
            if token.is_cancelled() {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now().timestamp());
                if let Err(e) = self.store.update_import_job(&job).await {
                    tracing::error!(job_id, error = %e, "Failed to persist cancelled state");
                }
                self.broadcast(job_id, &ImportProgress::from_job(&job));
                tracing::info!(job_id, "Import job cancelled");
                return;
            }

            let opts = SearchOptions {
                after: config.after,
                before: config.before,
                page,
                page_size: PAGE_SIZE,
            };

            let (assets, has_more) = match self.source.search_assets(&opts).await {
                Ok(result) => result,
                Err(e) => {
                    // No automatic retry; the user resumes explicitly
                    job.status = JobStatus::Failed;
                    job.last_error = Some(e.to_string());
                    job.completed_at = Some(Utc::now().timestamp());
                    if let Err(e) = self.store.update_import_job(&job).await {
                        tracing::error!(job_id, error = %e, "Failed to persist failed state");
                    }
                    self.broadcast(job_id, &ImportProgress::from_job(&job));
                    tracing::error!(job_id, page, error = %job.last_error.as_deref().unwrap_or(""), "Import search failed");
                    return;
                }
            };

            for asset in &assets {
                job.processed += 1;

                if !asset.has_gps() {
                    continue;
                }

                let device_id = asset.device_id_from_exif();
                if filter_cameras && !allowed_cameras.contains(device_id.as_str()) {
                    continue;
                }

                // has_gps() guarantees these are present
                let exif = asset.exif_info.as_ref();
                let (Some(lat), Some(lon)) = (
                    exif.and_then(|e| e.latitude),
                    exif.and_then(|e| e.longitude),
                ) else {
                    continue;
                };

                let timestamp = asset.timestamp().timestamp();
                let loc = Location {
                    timestamp,
                    user_id: config.user_id.clone(),
                    device_id: device_id.clone(),
                    lat,
                    lon,
                    altitude_m: None,
                    accuracy_m: None,
                    speed_kmh: None,
                    source: Some("immich".to_string()),
                };
                let source_rec = LocationSource {
                    timestamp,
                    device_id,
                    source_type: "immich".to_string(),
                    source_id: asset.id.clone(),
                    metadata: build_source_metadata(asset, self.source.asset_web_url(&asset.id)),
                };

                match self.store.insert_location_with_source(&loc, &source_rec).await {
                    Ok(true) => job.imported += 1,
                    Ok(false) => job.skipped += 1,
                    Err(e) => {
                        // One bad asset never aborts the job
                        job.errors += 1;
                        tracing::warn!(job_id, asset_id = %asset.id, error = %e, "Failed to insert location");
                    }
                }
            }

            // Checkpoint after each page, then fan out progress
            job.last_page = page;
            if let Err(e) = self.store.update_import_job(&job).await {
                tracing::error!(job_id, page, error = %e, "Failed to persist checkpoint");
            }
            self.broadcast(job_id, &ImportProgress::from_job(&job));

            if !has_more {
                break;
            }
            page += 1;
        }

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now().timestamp());
        if let Err(e) = self.store.update_import_job(&job).await {
            tracing::error!(job_id, error = %e, "Failed to persist completed state");
        }
        self.broadcast(job_id, &ImportProgress::from_job(&job));

        if job.imported > 0 {
            tracing::info!(job_id, "Rebuilding paths after import");
            if let Err(e) = self.indexer.rebuild_all().await {
                tracing::error!(job_id, error = %e, "Path rebuild after import failed");
            }
        }

        tracing::info!(
            job_id,
            imported = job.imported,
            skipped = job.skipped,
            errors = job.errors,
            "Import job completed"
        );
    }

    // ─── Preview ─────────────────────────────────────────────────

    /// Read-only scan of the asset source: counts photos with GPS per
    /// camera and estimates completion. Writes nothing. Progress goes
    /// to the given channel; a dropped receiver stops the scan.
    ///
    /// While more pages remain the total is extrapolated with a
    /// doubling heuristic: max(scanned + 200, scanned * 2).
    pub async fn preview(&self, config: &ImportConfig, progress: mpsc::Sender<PreviewProgress>) {
        let mut cameras: HashMap<String, CameraPreview> = HashMap::new();
        let mut scanned: i64 = 0;
        let mut photos_with_gps: i64 = 0;

        let mut page = 1;
        loop {
            let opts = SearchOptions {
                after: config.after,
                before: config.before,
                page,
                page_size: PAGE_SIZE,
            };

            let (assets, has_more) = match self.source.search_assets(&opts).await {
                Ok(result) => result,
                Err(e) => {
                    let _ = progress
                        .send(PreviewProgress {
                            error: Some(e.to_string()),
                            ..Default::default()
                        })
                        .await;
                    return;
                }
            };

            for asset in &assets {
                scanned += 1;
                if !asset.has_gps() {
                    continue;
                }
                photos_with_gps += 1;

                let device_id = asset.device_id_from_exif();
                let ts = asset.timestamp();
                let cam = cameras
                    .entry(device_id.clone())
                    .or_insert_with(|| CameraPreview {
                        device_id,
                        count: 0,
                        earliest: ts,
                        latest: ts,
                    });
                cam.count += 1;
                cam.earliest = cam.earliest.min(ts);
                cam.latest = cam.latest.max(ts);
            }

            let total_estimated = if has_more && !assets.is_empty() {
                (scanned * 2).max(scanned + 200)
            } else {
                scanned
            };
            let percent = if total_estimated > 0 {
                scanned as f64 / total_estimated as f64 * 100.0
            } else {
                0.0
            };

            let mut camera_list: Vec<CameraPreview> = cameras.values().cloned().collect();
            camera_list.sort_by(|a, b| a.device_id.cmp(&b.device_id));

            let update = PreviewProgress {
                scanned,
                total_estimated,
                percent,
                photos_with_gps,
                cameras: camera_list,
                complete: !has_more,
                error: None,
            };
            if progress.send(update).await.is_err() {
                // Consumer went away; stop scanning
                return;
            }

            if !has_more {
                break;
            }
            page += 1;
        }
    }
}

/// JSON metadata stored with an imported location's source record.
fn build_source_metadata(asset: &ImmichAsset, web_url: String) -> String {
    let mut meta = serde_json::Map::new();
    if !web_url.is_empty() {
        meta.insert("web_url".to_string(), serde_json::json!(web_url));
    }
    let filename = asset.original_filename();
    if !filename.is_empty() {
        meta.insert("filename".to_string(), serde_json::json!(filename));
    }
    if let Some(exif) = &asset.exif_info {
        if let Some(make) = &exif.make {
            meta.insert("make".to_string(), serde_json::json!(make));
        }
        if let Some(model) = &exif.model {
            meta.insert("model".to_string(), serde_json::json!(model));
        }
    }
    serde_json::Value::Object(meta).to_string()
}
