// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reverse geocoding through the Nominatim API.
//!
//! Handles:
//! - Batch resolution of stop centroids to place names
//! - A bounding-box cache in SQLite so nearby points reuse results
//! - Nominatim's 1 request/second rate limit
//!
//! Points that cannot be resolved are silently skipped; the timeline is
//! complete without place names.

use crate::db::{CachedPlace, Store};
use crate::error::AppError;
use crate::models::Bounds;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";
/// Required by the Nominatim usage policy.
const USER_AGENT: &str = "Whence/0.1 (location-history-app)";
const RATE_LIMIT: Duration = Duration::from_secs(1);

/// A reverse-geocoded result.
#[derive(Debug, Clone)]
pub struct GeocodedPlace {
    pub place_name: String,
    pub place_type: Option<String>,
    pub display_name: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

/// Reverse-geocoding client with cache and rate limiting.
#[derive(Clone)]
pub struct GeocodingService {
    store: Store,
    http: reqwest::Client,
    /// Time of the last upstream request, shared across clones.
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl GeocodingService {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Resolve a batch of points, returning a map from input index to
    /// place. Cached results are free; upstream requests are spaced at
    /// least one second apart. Unresolvable points are skipped.
    pub async fn reverse_geocode_batch(
        &self,
        points: &[(f64, f64)],
    ) -> Result<HashMap<usize, GeocodedPlace>, AppError> {
        let mut results = HashMap::new();

        for (i, &(lat, lon)) in points.iter().enumerate() {
            if let Some(cached) = self.store.geocache_lookup(lat, lon).await? {
                results.insert(
                    i,
                    GeocodedPlace {
                        place_name: cached.place_name,
                        place_type: cached.place_type,
                        display_name: cached.display_name,
                        lat,
                        lon,
                    },
                );
                continue;
            }

            self.wait_for_rate_limit().await;

            match self.fetch_from_nominatim(lat, lon).await {
                Ok(Some(place)) => {
                    results.insert(i, place);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(lat, lon, error = %e, "Nominatim lookup failed, skipping point");
                }
            }
        }

        Ok(results)
    }

    /// Sleep until at least RATE_LIMIT has passed since the previous
    /// upstream request. The gate serializes concurrent callers.
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < RATE_LIMIT {
                tokio::time::sleep(RATE_LIMIT - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Query Nominatim for one point and cache the result.
    async fn fetch_from_nominatim(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<GeocodedPlace>, AppError> {
        // zoom=18 gives building-level detail
        let response = self
            .http
            .get(NOMINATIM_URL)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("lat", format!("{:.6}", lat)),
                ("lon", format!("{:.6}", lon)),
                ("format", "jsonv2".to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Geocoding(format!("Nominatim request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Geocoding(format!(
                "Nominatim returned status {}",
                response.status()
            )));
        }

        let nr: NominatimResponse = response
            .json()
            .await
            .map_err(|e| AppError::Geocoding(format!("Failed to parse Nominatim response: {}", e)))?;

        let place_name = extract_place_name(&nr);
        if place_name.is_empty() {
            return Ok(None);
        }

        let place = GeocodedPlace {
            place_name,
            place_type: Some(nr.place_type.clone()).filter(|t| !t.is_empty()),
            display_name: Some(nr.display_name.clone()).filter(|d| !d.is_empty()),
            lat,
            lon,
        };

        // Cache under Nominatim's bounding box, expanded to cover the
        // query point itself
        if let [min_lat, max_lat, min_lon, max_lon] = nr.boundingbox.as_slice() {
            let parsed = (
                min_lat.parse::<f64>(),
                max_lat.parse::<f64>(),
                min_lon.parse::<f64>(),
                max_lon.parse::<f64>(),
            );
            if let (Ok(min_lat), Ok(max_lat), Ok(min_lon), Ok(max_lon)) = parsed {
                let bounds = Bounds {
                    min_lat: min_lat.min(lat),
                    max_lat: max_lat.max(lat),
                    min_lon: min_lon.min(lon),
                    max_lon: max_lon.max(lon),
                };
                let cached = CachedPlace {
                    place_name: place.place_name.clone(),
                    place_type: place.place_type.clone(),
                    display_name: place.display_name.clone(),
                };
                if let Err(e) = self
                    .store
                    .geocache_insert(bounds, &cached, chrono::Utc::now().timestamp())
                    .await
                {
                    tracing::warn!(error = %e, "Failed to cache geocoding result");
                }
            }
        }

        tracing::debug!(lat, lon, place = %place.place_name, "Resolved place name");

        Ok(Some(place))
    }
}

/// JSON response from the Nominatim reverse API.
#[derive(Debug, Clone, Default, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(rename = "type", default)]
    place_type: String,
    /// [min_lat, max_lat, min_lon, max_lon] as strings
    #[serde(default)]
    boundingbox: Vec<String>,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NominatimAddress {
    #[serde(default)]
    amenity: String,
    #[serde(default)]
    shop: String,
    #[serde(default)]
    tourism: String,
    #[serde(default)]
    leisure: String,
    #[serde(default)]
    building: String,
    #[serde(default)]
    house_number: String,
    #[serde(default)]
    road: String,
    #[serde(default)]
    neighbourhood: String,
    #[serde(default)]
    suburb: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    town: String,
    #[serde(default)]
    village: String,
}

/// Pick the most useful place name from a Nominatim response: named
/// places first, then street address, then successively coarser
/// administrative areas.
fn extract_place_name(nr: &NominatimResponse) -> String {
    if !nr.name.is_empty() {
        return nr.name.clone();
    }

    let addr = &nr.address;
    for candidate in [&addr.amenity, &addr.shop, &addr.tourism, &addr.leisure] {
        if !candidate.is_empty() {
            return candidate.clone();
        }
    }
    if !addr.building.is_empty() && addr.building != "yes" {
        return addr.building.clone();
    }

    if !addr.road.is_empty() {
        if !addr.house_number.is_empty() {
            return format!("{} {}", addr.house_number, addr.road);
        }
        return addr.road.clone();
    }

    for candidate in [
        &addr.neighbourhood,
        &addr.suburb,
        &addr.city,
        &addr.town,
        &addr.village,
    ] {
        if !candidate.is_empty() {
            return candidate.clone();
        }
    }

    String::new()
}
