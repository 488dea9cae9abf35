// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Immich API client for scanning photo assets.
//!
//! Handles:
//! - Paginated metadata search (oldest first, for stable pagination)
//! - EXIF GPS / timestamp / camera extraction
//! - Thumbnail proxying
//! - Connection validation

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// An external source of photo assets, paginated.
///
/// The backfill manager only needs this narrow contract, so tests can
/// substitute a scripted source for the real Immich server.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fetch one page of assets. Returns the page and whether more
    /// pages remain.
    async fn search_assets(
        &self,
        opts: &SearchOptions,
    ) -> Result<(Vec<ImmichAsset>, bool), AppError>;

    /// URL to view an asset in the source's web UI, if it has one.
    fn asset_web_url(&self, _asset_id: &str) -> String {
        String::new()
    }
}

/// Parameters for an asset search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    /// 1-based page number
    pub page: i64,
    pub page_size: i64,
}

/// An asset returned from the Immich API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmichAsset {
    pub id: String,
    pub file_created_at: DateTime<Utc>,
    #[serde(default)]
    pub exif_info: Option<ImmichExifInfo>,
    #[serde(default)]
    pub original_path: Option<String>,
}

/// EXIF metadata for an asset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmichExifInfo {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date_time_original: Option<DateTime<Utc>>,
    pub make: Option<String>,
    pub model: Option<String>,
}

impl ImmichAsset {
    /// True if the asset has GPS coordinates.
    pub fn has_gps(&self) -> bool {
        self.exif_info
            .as_ref()
            .is_some_and(|e| e.latitude.is_some() && e.longitude.is_some())
    }

    /// Best capture timestamp: EXIF original time, else file creation.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.exif_info
            .as_ref()
            .and_then(|e| e.date_time_original)
            .unwrap_or(self.file_created_at)
    }

    /// Device ID derived from EXIF make/model.
    pub fn device_id_from_exif(&self) -> String {
        let Some(exif) = &self.exif_info else {
            return "immich-unknown".to_string();
        };

        let make = exif.make.as_deref().unwrap_or("").trim();
        let model = exif.model.as_deref().unwrap_or("").trim();

        match (make.is_empty(), model.is_empty()) {
            (true, true) => "immich-unknown".to_string(),
            (true, false) => model.to_string(),
            (false, true) => make.to_string(),
            (false, false) => {
                // Avoid duplication like "Apple Apple iPhone 15 Pro"
                if model.to_lowercase().starts_with(&make.to_lowercase()) {
                    model.to_string()
                } else {
                    format!("{} {}", make, model)
                }
            }
        }
    }

    /// Just the filename part of the original path.
    pub fn original_filename(&self) -> String {
        self.original_path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .unwrap_or("")
            .to_string()
    }
}

/// Response from POST /api/search/metadata.
#[derive(Debug, Deserialize)]
struct MetadataSearchResponse {
    assets: MetadataSearchAssets,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSearchAssets {
    items: Vec<ImmichAsset>,
    #[serde(default)]
    next_page: Option<String>,
}

/// Immich API client.
#[derive(Clone)]
pub struct ImmichClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ImmichClient {
    /// Create a new Immich client.
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL to view an asset in the Immich web UI.
    pub fn web_url(&self, asset_id: &str) -> String {
        format!("{}/photos/{}", self.base_url, asset_id)
    }

    /// Verify connectivity and asset.read permission by doing a minimal
    /// search. That is the only permission the importer needs.
    pub async fn validate_connection(&self) -> Result<(), AppError> {
        self.search_assets(&SearchOptions {
            page: 1,
            page_size: 1,
            ..Default::default()
        })
        .await
        .map(|_| ())
        .map_err(|e| {
            AppError::Immich(format!(
                "Failed to connect or API key lacks asset.read permission: {}",
                e
            ))
        })
    }

    /// Fetch a thumbnail for an asset. `size` can be "thumbnail",
    /// "preview" or "fullsize". Returns (bytes, content type).
    pub async fn get_thumbnail(
        &self,
        asset_id: &str,
        size: &str,
    ) -> Result<(Vec<u8>, String), AppError> {
        let mut url = format!("{}/api/assets/{}/thumbnail", self.base_url, asset_id);
        if !size.is_empty() && size != "thumbnail" {
            url.push_str(&format!("?size={}", size));
        }

        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Immich(format!("Thumbnail request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Immich(format!(
                "Thumbnail request failed with status {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| AppError::Immich(format!("Failed to read thumbnail body: {}", e)))?;

        Ok((data.to_vec(), content_type))
    }
}

#[async_trait]
impl AssetSource for ImmichClient {
    async fn search_assets(
        &self,
        opts: &SearchOptions,
    ) -> Result<(Vec<ImmichAsset>, bool), AppError> {
        let page = if opts.page == 0 { 1 } else { opts.page };
        let page_size = if opts.page_size == 0 {
            200
        } else {
            opts.page_size
        };

        let mut body = serde_json::json!({
            "page": page,
            "size": page_size,
            "withExif": true,
            // Oldest first for consistent pagination
            "order": "asc",
        });
        if let Some(after) = opts.after {
            body["takenAfter"] = serde_json::json!(after.to_rfc3339());
        }
        if let Some(before) = opts.before {
            body["takenBefore"] = serde_json::json!(before.to_rfc3339());
        }

        let response = self
            .http
            .post(format!("{}/api/search/metadata", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Immich(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Immich(format!(
                "Search failed with status {}: {}",
                status, body
            )));
        }

        let result: MetadataSearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Immich(format!("Failed to parse search response: {}", e)))?;

        let has_more = result.assets.next_page.is_some();
        Ok((result.assets.items, has_more))
    }

    fn asset_web_url(&self, asset_id: &str) -> String {
        self.web_url(asset_id)
    }
}
