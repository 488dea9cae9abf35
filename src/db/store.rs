// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite store wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Locations (raw samples, deduplicated on (timestamp, device_id))
//! - Location sources (provenance for imported samples)
//! - Paths and path points (pre-computed daily geometry)
//! - Import jobs (checkpointed background imports)
//! - Sync state and the reverse-geocoding cache
//!
//! The connection lives behind an async mutex; every multi-step
//! mutation runs in an explicit transaction so partial writes are
//! never observable.

use crate::error::AppError;
use crate::models::{BBox, Bounds, ImportConfig, ImportJob, JobStatus, Location, LocationSource};
use crate::models::{Path, PathPoint, PhotoLocation};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;

/// SQLite store client.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// A cached reverse-geocoding result.
#[derive(Debug, Clone)]
pub struct CachedPlace {
    pub place_name: String,
    pub place_type: Option<String>,
    pub display_name: Option<String>,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &str) -> Result<Self, AppError> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| AppError::Database(format!("Failed to create data dir: {}", e)))?;
        }

        let conn = Connection::open(path)?;
        init_schema(&conn)?;

        tracing::info!(path, "Database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ─── Location Operations ─────────────────────────────────────

    /// Insert a single location. Returns true if it was new, false if a
    /// sample with the same (timestamp, device_id) already existed.
    pub async fn insert_location(&self, loc: &Location) -> Result<bool, AppError> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "INSERT OR IGNORE INTO locations \
             (timestamp, user_id, device_id, lat, lon, altitude_m, accuracy_m, speed_kmh, source) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                loc.timestamp,
                loc.user_id,
                loc.device_id,
                loc.lat,
                loc.lon,
                loc.altitude_m,
                loc.accuracy_m,
                loc.speed_kmh,
                loc.source,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Insert a batch of locations in one transaction.
    /// Returns (inserted, skipped) counts.
    pub async fn insert_location_batch(
        &self,
        locs: &[Location],
    ) -> Result<(usize, usize), AppError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let mut inserted = 0;
        let mut skipped = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO locations \
                 (timestamp, user_id, device_id, lat, lon, altitude_m, accuracy_m, speed_kmh, source) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for loc in locs {
                let affected = stmt.execute(params![
                    loc.timestamp,
                    loc.user_id,
                    loc.device_id,
                    loc.lat,
                    loc.lon,
                    loc.altitude_m,
                    loc.accuracy_m,
                    loc.speed_kmh,
                    loc.source,
                ])?;
                if affected > 0 {
                    inserted += 1;
                } else {
                    skipped += 1;
                }
            }
        }
        tx.commit()?;
        Ok((inserted, skipped))
    }

    /// Insert a location together with its provenance record, in one
    /// transaction. The source row is only written when the location is
    /// new. Returns true if the location was inserted.
    pub async fn insert_location_with_source(
        &self,
        loc: &Location,
        source: &LocationSource,
    ) -> Result<bool, AppError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let affected = tx.execute(
            "INSERT OR IGNORE INTO locations \
             (timestamp, user_id, device_id, lat, lon, altitude_m, accuracy_m, speed_kmh, source) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                loc.timestamp,
                loc.user_id,
                loc.device_id,
                loc.lat,
                loc.lon,
                loc.altitude_m,
                loc.accuracy_m,
                loc.speed_kmh,
                loc.source,
            ],
        )?;

        let inserted = affected > 0;
        if inserted {
            tx.execute(
                "INSERT OR REPLACE INTO location_sources \
                 (timestamp, device_id, source_type, source_id, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    source.timestamp,
                    source.device_id,
                    source.source_type,
                    source.source_id,
                    source.metadata,
                ],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Query raw locations within a bounding box and optional time range.
    pub async fn query_locations(
        &self,
        bbox: BBox,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Location>, AppError> {
        let conn = self.conn.lock().await;

        let mut query = String::from(
            "SELECT timestamp, user_id, device_id, lat, lon, altitude_m, accuracy_m, speed_kmh, source \
             FROM locations WHERE lat >= ?1 AND lat <= ?2 AND lon >= ?3 AND lon <= ?4",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(bbox.sw_lat),
            Box::new(bbox.ne_lat),
            Box::new(bbox.sw_lng),
            Box::new(bbox.ne_lng),
        ];
        if let Some(start) = start {
            query.push_str(&format!(" AND timestamp >= ?{}", args.len() + 1));
            args.push(Box::new(start));
        }
        if let Some(end) = end {
            query.push_str(&format!(" AND timestamp <= ?{}", args.len() + 1));
            args.push(Box::new(end));
        }
        query.push_str(" ORDER BY timestamp");

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            location_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The most recent location across all users and devices.
    pub async fn latest_location(&self) -> Result<Option<Location>, AppError> {
        let conn = self.conn.lock().await;
        let loc = conn
            .query_row(
                "SELECT timestamp, user_id, device_id, lat, lon, altitude_m, accuracy_m, speed_kmh, source \
                 FROM locations ORDER BY timestamp DESC LIMIT 1",
                [],
                location_from_row,
            )
            .optional()?;
        Ok(loc)
    }

    /// All locations for a user within [start_ts, end_ts], ordered by
    /// timestamp. Callers that need local-date bucketing filter further.
    pub async fn query_locations_in_window(
        &self,
        user_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<Location>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT timestamp, user_id, device_id, lat, lon, altitude_m, accuracy_m, speed_kmh, source \
             FROM locations WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3 \
             ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![user_id, start_ts, end_ts], location_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every location in the store, ordered by timestamp (full rebuild).
    pub async fn query_all_locations(&self) -> Result<Vec<Location>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT timestamp, user_id, device_id, lat, lon, altitude_m, accuracy_m, speed_kmh, source \
             FROM locations ORDER BY timestamp",
        )?;
        let rows = stmt.query_map([], location_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Tight bounding box over all locations in a time range.
    pub async fn bounds_for_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Option<Bounds>, AppError> {
        let conn = self.conn.lock().await;
        let bounds = conn.query_row(
            "SELECT MIN(lat), MAX(lat), MIN(lon), MAX(lon) FROM locations \
             WHERE timestamp >= ?1 AND timestamp <= ?2",
            params![start, end],
            |row| {
                let min_lat: Option<f64> = row.get(0)?;
                let max_lat: Option<f64> = row.get(1)?;
                let min_lon: Option<f64> = row.get(2)?;
                let max_lon: Option<f64> = row.get(3)?;
                Ok(match (min_lat, max_lat, min_lon, max_lon) {
                    (Some(min_lat), Some(max_lat), Some(min_lon), Some(max_lon)) => Some(Bounds {
                        min_lat,
                        max_lat,
                        min_lon,
                        max_lon,
                    }),
                    _ => None,
                })
            },
        )?;
        Ok(bounds)
    }

    /// Provenance record for a location, if any.
    pub async fn get_location_source(
        &self,
        timestamp: i64,
        device_id: &str,
    ) -> Result<Option<LocationSource>, AppError> {
        let conn = self.conn.lock().await;
        let src = conn
            .query_row(
                "SELECT timestamp, device_id, source_type, source_id, metadata \
                 FROM location_sources WHERE timestamp = ?1 AND device_id = ?2",
                params![timestamp, device_id],
                source_from_row,
            )
            .optional()?;
        Ok(src)
    }

    /// Provenance lookup by timestamp alone (path points carry no
    /// device id).
    pub async fn get_location_source_by_timestamp(
        &self,
        timestamp: i64,
    ) -> Result<Option<LocationSource>, AppError> {
        let conn = self.conn.lock().await;
        let src = conn
            .query_row(
                "SELECT timestamp, device_id, source_type, source_id, metadata \
                 FROM location_sources WHERE timestamp = ?1 LIMIT 1",
                params![timestamp],
                source_from_row,
            )
            .optional()?;
        Ok(src)
    }

    /// Photos with GPS coordinates in a time range, joined with their
    /// source metadata.
    pub async fn query_photo_locations(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<PhotoLocation>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT l.timestamp, l.lat, l.lon, ls.source_id, ls.metadata \
             FROM locations l \
             JOIN location_sources ls ON l.timestamp = ls.timestamp AND l.device_id = ls.device_id \
             WHERE l.timestamp >= ?1 AND l.timestamp <= ?2 \
             ORDER BY l.timestamp",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            let metadata: Option<String> = row.get(4)?;
            let mut photo = PhotoLocation {
                timestamp: row.get(0)?,
                lat: row.get(1)?,
                lon: row.get(2)?,
                source_id: row.get(3)?,
                web_url: String::new(),
                filename: String::new(),
            };
            if let Some(meta) = metadata {
                if let Ok(map) =
                    serde_json::from_str::<std::collections::HashMap<String, String>>(&meta)
                {
                    photo.web_url = map.get("web_url").cloned().unwrap_or_default();
                    photo.filename = map.get("filename").cloned().unwrap_or_default();
                }
            }
            Ok(photo)
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ─── Path Operations ─────────────────────────────────────────

    /// Create or replace the path for (user_id, date).
    ///
    /// Metadata update and point replacement happen in one transaction;
    /// points are always deleted and re-inserted as a whole so the
    /// stored metadata can never diverge from the stored points.
    /// Returns the path's row id.
    pub async fn upsert_path(&self, path: &Path) -> Result<i64, AppError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM paths WHERE user_id = ?1 AND date = ?2",
                params![path.user_id, path.date],
                |row| row.get(0),
            )
            .optional()?;

        let path_id = match existing {
            None => {
                tx.execute(
                    "INSERT INTO paths \
                     (user_id, date, start_ts, end_ts, min_lat, max_lat, min_lon, max_lon, point_count) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        path.user_id,
                        path.date,
                        path.start_ts,
                        path.end_ts,
                        path.min_lat,
                        path.max_lat,
                        path.min_lon,
                        path.max_lon,
                        path.point_count,
                    ],
                )?;
                tx.last_insert_rowid()
            }
            Some(id) => {
                tx.execute(
                    "UPDATE paths SET start_ts = ?1, end_ts = ?2, min_lat = ?3, max_lat = ?4, \
                     min_lon = ?5, max_lon = ?6, point_count = ?7 WHERE id = ?8",
                    params![
                        path.start_ts,
                        path.end_ts,
                        path.min_lat,
                        path.max_lat,
                        path.min_lon,
                        path.max_lon,
                        path.point_count,
                        id,
                    ],
                )?;
                tx.execute("DELETE FROM path_points WHERE path_id = ?1", params![id])?;
                id
            }
        };

        {
            let mut stmt = tx.prepare(
                "INSERT INTO path_points (path_id, seq, timestamp, lat, lon) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (seq, pt) in path.points.iter().enumerate() {
                stmt.execute(params![path_id, seq as i64, pt.timestamp, pt.lat, pt.lon])?;
            }
        }

        tx.commit()?;
        Ok(path_id)
    }

    /// Paths whose bounding box intersects the viewport, metadata only.
    pub async fn query_paths_by_bbox(
        &self,
        bbox: BBox,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Path>, AppError> {
        let conn = self.conn.lock().await;

        let mut query = String::from(
            "SELECT id, user_id, date, start_ts, end_ts, min_lat, max_lat, min_lon, max_lon, point_count \
             FROM paths WHERE max_lat >= ?1 AND min_lat <= ?2 AND max_lon >= ?3 AND min_lon <= ?4",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(bbox.sw_lat),
            Box::new(bbox.ne_lat),
            Box::new(bbox.sw_lng),
            Box::new(bbox.ne_lng),
        ];
        if let Some(start) = start {
            query.push_str(&format!(" AND end_ts >= ?{}", args.len() + 1));
            args.push(Box::new(start));
        }
        if let Some(end) = end {
            query.push_str(&format!(" AND start_ts <= ?{}", args.len() + 1));
            args.push(Box::new(end));
        }
        query.push_str(" ORDER BY start_ts");

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| {
                Ok(Path {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    date: row.get(2)?,
                    start_ts: row.get(3)?,
                    end_ts: row.get(4)?,
                    min_lat: row.get(5)?,
                    max_lat: row.get(6)?,
                    min_lon: row.get(7)?,
                    max_lon: row.get(8)?,
                    point_count: row.get(9)?,
                    points: Vec::new(),
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All points for a path, in stored (timestamp) order.
    pub async fn get_path_points(&self, path_id: i64) -> Result<Vec<PathPoint>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT timestamp, lat, lon FROM path_points WHERE path_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![path_id], |row| {
            Ok(PathPoint {
                timestamp: row.get(0)?,
                lat: row.get(1)?,
                lon: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete all paths and their points (full rebuild).
    pub async fn delete_all_paths(&self) -> Result<(), AppError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM path_points", [])?;
        tx.execute("DELETE FROM paths", [])?;
        tx.commit()?;
        Ok(())
    }

    // ─── Import Job Operations ───────────────────────────────────

    /// Persist a new import job row.
    pub async fn create_import_job(&self, job: &ImportJob) -> Result<(), AppError> {
        let config_json = serde_json::to_string(&job.config)
            .map_err(|e| AppError::Database(format!("Failed to serialize job config: {}", e)))?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO import_jobs \
             (id, status, started_at, completed_at, total_assets, processed, imported, skipped, errors, last_page, config_json, last_error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job.id,
                job.status.as_str(),
                job.started_at,
                job.completed_at,
                job.total,
                job.processed,
                job.imported,
                job.skipped,
                job.errors,
                job.last_page,
                config_json,
                job.last_error,
            ],
        )?;
        Ok(())
    }

    /// Look up an import job by id.
    pub async fn get_import_job(&self, id: &str) -> Result<Option<ImportJob>, AppError> {
        let conn = self.conn.lock().await;
        let job = conn
            .query_row(
                "SELECT id, status, started_at, completed_at, total_assets, processed, imported, skipped, errors, last_page, config_json, last_error \
                 FROM import_jobs WHERE id = ?1",
                params![id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Update an import job's status, counters and checkpoint.
    pub async fn update_import_job(&self, job: &ImportJob) -> Result<(), AppError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE import_jobs SET status = ?1, completed_at = ?2, total_assets = ?3, \
             processed = ?4, imported = ?5, skipped = ?6, errors = ?7, last_page = ?8, \
             last_error = ?9 WHERE id = ?10",
            params![
                job.status.as_str(),
                job.completed_at,
                job.total,
                job.processed,
                job.imported,
                job.skipped,
                job.errors,
                job.last_page,
                job.last_error,
                job.id,
            ],
        )?;
        Ok(())
    }

    /// All import jobs, most recent first.
    pub async fn list_import_jobs(&self) -> Result<Vec<ImportJob>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, status, started_at, completed_at, total_assets, processed, imported, skipped, errors, last_page, config_json, last_error \
             FROM import_jobs ORDER BY started_at DESC LIMIT 50",
        )?;
        let rows = stmt.query_map([], job_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ─── Sync State ──────────────────────────────────────────────

    /// The last incremental-sync timestamp, if any sync has run.
    pub async fn get_last_sync(&self) -> Result<Option<i64>, AppError> {
        let conn = self.conn.lock().await;
        let last_sync = conn
            .query_row(
                "SELECT last_sync FROM sync_state WHERE id = 'immich'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last_sync)
    }

    /// Record the last incremental-sync timestamp.
    pub async fn set_last_sync(&self, last_sync: i64) -> Result<(), AppError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO sync_state (id, last_sync) VALUES ('immich', ?1)",
            params![last_sync],
        )?;
        Ok(())
    }

    // ─── Geocoding Cache ─────────────────────────────────────────

    /// Find a cached place whose bounding box contains the point.
    pub async fn geocache_lookup(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<CachedPlace>, AppError> {
        let conn = self.conn.lock().await;
        let place = conn
            .query_row(
                "SELECT place_name, place_type, display_name FROM geocache \
                 WHERE ?1 >= min_lat AND ?1 <= max_lat AND ?2 >= min_lon AND ?2 <= max_lon \
                 LIMIT 1",
                params![lat, lon],
                |row| {
                    Ok(CachedPlace {
                        place_name: row.get(0)?,
                        place_type: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(place)
    }

    /// Cache a geocoding result under its bounding box.
    pub async fn geocache_insert(
        &self,
        bounds: Bounds,
        place: &CachedPlace,
        created_at: i64,
    ) -> Result<(), AppError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO geocache \
             (min_lat, max_lat, min_lon, max_lon, place_name, place_type, display_name, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                bounds.min_lat,
                bounds.max_lat,
                bounds.min_lon,
                bounds.max_lon,
                place.place_name,
                place.place_type,
                place.display_name,
                created_at,
            ],
        )?;
        Ok(())
    }
}

/// Create tables and indices if they do not exist yet.
fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            timestamp INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            altitude_m REAL,
            accuracy_m REAL,
            speed_kmh REAL,
            source TEXT,
            PRIMARY KEY (timestamp, device_id)
        );

        CREATE INDEX IF NOT EXISTS idx_locations_user_ts ON locations(user_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_locations_lat_lon ON locations(lat, lon);

        CREATE TABLE IF NOT EXISTS location_sources (
            timestamp INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            metadata TEXT,
            PRIMARY KEY (timestamp, device_id)
        );

        CREATE TABLE IF NOT EXISTS paths (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            start_ts INTEGER NOT NULL,
            end_ts INTEGER NOT NULL,
            min_lat REAL NOT NULL,
            max_lat REAL NOT NULL,
            min_lon REAL NOT NULL,
            max_lon REAL NOT NULL,
            point_count INTEGER NOT NULL,
            UNIQUE (user_id, date)
        );

        CREATE TABLE IF NOT EXISTS path_points (
            path_id INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            PRIMARY KEY (path_id, seq),
            FOREIGN KEY (path_id) REFERENCES paths(id)
        );

        CREATE INDEX IF NOT EXISTS idx_paths_bbox ON paths(min_lat, max_lat, min_lon, max_lon);

        CREATE TABLE IF NOT EXISTS import_jobs (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            total_assets INTEGER,
            processed INTEGER NOT NULL DEFAULT 0,
            imported INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0,
            last_page INTEGER NOT NULL DEFAULT 0,
            config_json TEXT NOT NULL,
            last_error TEXT
        );

        CREATE TABLE IF NOT EXISTS sync_state (
            id TEXT PRIMARY KEY,
            last_sync INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS geocache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            min_lat REAL NOT NULL,
            max_lat REAL NOT NULL,
            min_lon REAL NOT NULL,
            max_lon REAL NOT NULL,
            place_name TEXT NOT NULL,
            place_type TEXT,
            display_name TEXT,
            created_at INTEGER NOT NULL
        );
        "#,
    )
}

/// Map a locations row (full column list) to a Location.
fn location_from_row(row: &rusqlite::Row<'_>) -> Result<Location, rusqlite::Error> {
    Ok(Location {
        timestamp: row.get(0)?,
        user_id: row.get(1)?,
        device_id: row.get(2)?,
        lat: row.get(3)?,
        lon: row.get(4)?,
        altitude_m: row.get(5)?,
        accuracy_m: row.get(6)?,
        speed_kmh: row.get(7)?,
        source: row.get(8)?,
    })
}

/// Map a location_sources row to a LocationSource.
fn source_from_row(row: &rusqlite::Row<'_>) -> Result<LocationSource, rusqlite::Error> {
    let metadata: Option<String> = row.get(4)?;
    Ok(LocationSource {
        timestamp: row.get(0)?,
        device_id: row.get(1)?,
        source_type: row.get(2)?,
        source_id: row.get(3)?,
        metadata: metadata.unwrap_or_default(),
    })
}

/// Map an import_jobs row to an ImportJob.
fn job_from_row(row: &rusqlite::Row<'_>) -> Result<ImportJob, rusqlite::Error> {
    let status: String = row.get(1)?;
    let config_json: String = row.get(10)?;
    let config: ImportConfig = serde_json::from_str(&config_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ImportJob {
        id: row.get(0)?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        started_at: row.get(2)?,
        completed_at: row.get(3)?,
        total: row.get(4)?,
        processed: row.get(5)?,
        imported: row.get(6)?,
        skipped: row.get(7)?,
        errors: row.get(8)?,
        last_page: row.get(9)?,
        config,
        last_error: row.get(11)?,
    })
}
