// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Raw location samples and their provenance records.

use serde::{Deserialize, Serialize};

/// One raw GPS observation from a device.
///
/// Uniqueness is (timestamp, device_id); duplicate inserts are ignored
/// so ingestion is idempotent under redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Unix seconds
    pub timestamp: i64,
    pub user_id: String,
    pub device_id: String,
    pub lat: f64,
    pub lon: f64,
    /// Altitude in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f64>,
    /// Horizontal accuracy in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    /// Speed in km/h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    /// Where the fix came from: "owntracks", "gpslogger", "immich", ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Links an imported location back to the asset it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSource {
    pub timestamp: i64,
    pub device_id: String,
    /// Source system, e.g. "immich"
    pub source_type: String,
    /// Source-system asset ID
    pub source_id: String,
    /// JSON blob with source-specific extras (web URL, filename, camera)
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub metadata: String,
}

/// Geographic bounding box in map order: south-west corner, north-east corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub sw_lng: f64,
    pub sw_lat: f64,
    pub ne_lng: f64,
    pub ne_lat: f64,
}

impl BBox {
    /// Parse a bbox string in "sw_lng,sw_lat,ne_lng,ne_lat" format.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(',').map(|p| p.trim().parse::<f64>());
        let sw_lng = parts.next()?.ok()?;
        let sw_lat = parts.next()?.ok()?;
        let ne_lng = parts.next()?.ok()?;
        let ne_lat = parts.next()?.ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            sw_lng,
            sw_lat,
            ne_lng,
            ne_lat,
        })
    }
}

/// Tight envelope of a set of locations.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// A photo with GPS coordinates, joined from locations and their sources.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoLocation {
    pub timestamp: i64,
    pub lat: f64,
    pub lon: f64,
    pub source_id: String,
    pub web_url: String,
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_parse() {
        let bbox = BBox::parse("-122.5,37.2,-121.9,37.9").unwrap();
        assert_eq!(bbox.sw_lng, -122.5);
        assert_eq!(bbox.sw_lat, 37.2);
        assert_eq!(bbox.ne_lng, -121.9);
        assert_eq!(bbox.ne_lat, 37.9);
    }

    #[test]
    fn test_bbox_parse_rejects_bad_input() {
        assert!(BBox::parse("").is_none());
        assert!(BBox::parse("1,2,3").is_none());
        assert!(BBox::parse("1,2,3,4,5").is_none());
        assert!(BBox::parse("a,b,c,d").is_none());
    }
}
