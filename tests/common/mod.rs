// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test helpers: in-memory stores and a scripted asset source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use whence::db::Store;
use whence::error::AppError;
use whence::models::Location;
use whence::services::immich::{AssetSource, ImmichAsset, ImmichExifInfo, SearchOptions};

/// Create an in-memory test store.
#[allow(dead_code)]
pub fn test_store() -> Store {
    Store::open_in_memory().expect("Failed to open in-memory store")
}

/// Build a raw location sample.
#[allow(dead_code)]
pub fn test_location(timestamp: i64, user_id: &str, device_id: &str, lat: f64, lon: f64) -> Location {
    Location {
        timestamp,
        user_id: user_id.to_string(),
        device_id: device_id.to_string(),
        lat,
        lon,
        altitude_m: None,
        accuracy_m: None,
        speed_kmh: None,
        source: None,
    }
}

/// Build an asset with GPS EXIF data.
#[allow(dead_code)]
pub fn gps_asset(id: &str, timestamp: i64, lat: f64, lon: f64, make: &str, model: &str) -> ImmichAsset {
    ImmichAsset {
        id: id.to_string(),
        file_created_at: DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap(),
        exif_info: Some(ImmichExifInfo {
            latitude: Some(lat),
            longitude: Some(lon),
            date_time_original: Some(DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap()),
            make: Some(make.to_string()),
            model: Some(model.to_string()),
        }),
        original_path: Some(format!("/library/{}.jpg", id)),
    }
}

/// Build an asset without GPS data.
#[allow(dead_code)]
pub fn plain_asset(id: &str, timestamp: i64) -> ImmichAsset {
    ImmichAsset {
        id: id.to_string(),
        file_created_at: DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap(),
        exif_info: None,
        original_path: None,
    }
}

/// Pauses the source when the worker requests `page`, reports arrival
/// to the test, and waits for a permit before answering.
pub struct PageGate {
    pub page: i64,
    pub arrived: mpsc::Sender<()>,
    pub proceed: Arc<Semaphore>,
}

/// A scripted asset source. Pages are served in order; requests past
/// the script return an empty final page.
pub struct MockAssetSource {
    pages: Vec<Vec<ImmichAsset>>,
    fail_at_page: Option<i64>,
    gate: Option<PageGate>,
    requested: Arc<Mutex<Vec<i64>>>,
}

impl MockAssetSource {
    #[allow(dead_code)]
    pub fn new(pages: Vec<Vec<ImmichAsset>>) -> Self {
        Self {
            pages,
            fail_at_page: None,
            gate: None,
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail with an error when the given page is requested.
    #[allow(dead_code)]
    pub fn failing_at(mut self, page: i64) -> Self {
        self.fail_at_page = Some(page);
        self
    }

    /// Block when the given page is requested until the test releases it.
    #[allow(dead_code)]
    pub fn gated_at(mut self, gate: PageGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Handle to the recorded page requests.
    #[allow(dead_code)]
    pub fn requested_pages(&self) -> Arc<Mutex<Vec<i64>>> {
        self.requested.clone()
    }
}

#[async_trait]
impl AssetSource for MockAssetSource {
    async fn search_assets(
        &self,
        opts: &SearchOptions,
    ) -> Result<(Vec<ImmichAsset>, bool), AppError> {
        if let Some(gate) = &self.gate {
            if gate.page == opts.page {
                let _ = gate.arrived.send(()).await;
                let permit = gate.proceed.acquire().await.expect("gate closed");
                permit.forget();
            }
        }

        self.requested.lock().unwrap().push(opts.page);

        if self.fail_at_page == Some(opts.page) {
            return Err(AppError::Immich("simulated page failure".to_string()));
        }

        let idx = (opts.page - 1) as usize;
        if idx >= self.pages.len() {
            return Ok((Vec::new(), false));
        }
        let has_more = idx + 1 < self.pages.len();
        Ok((self.pages[idx].clone(), has_more))
    }
}
