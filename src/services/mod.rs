// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - the location-processing pipeline.

pub mod backfill;
pub mod filtering;
pub mod geocode;
pub mod geometry;
pub mod immich;
pub mod paths;
pub mod timeline;

pub use backfill::BackfillManager;
pub use geocode::GeocodingService;
pub use immich::ImmichClient;
pub use paths::PathIndexer;
pub use timeline::TimelineBuilder;
