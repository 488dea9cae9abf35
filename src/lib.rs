// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Whence: a self-hosted location history server.
//!
//! Ingests raw GPS samples, compresses them into renderable daily
//! paths, reconstructs a stay/travel timeline, and bulk-imports
//! geotagged photos from an Immich server.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Store;
use services::{BackfillManager, ImmichClient, PathIndexer, TimelineBuilder};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub indexer: PathIndexer,
    pub timeline: TimelineBuilder,
    /// Present only when Immich is configured
    pub immich: Option<ImmichClient>,
    pub backfill: Option<BackfillManager>,
}
