// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Whence API Server
//!
//! Tracks location history from GPS trackers and geotagged photos,
//! serving simplified paths and a daily stay/travel timeline.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whence::{
    config::Config,
    db::Store,
    services::{BackfillManager, GeocodingService, ImmichClient, PathIndexer, TimelineBuilder},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Whence API");

    // Open the SQLite store
    let store = Store::open(&config.database_path).expect("Failed to open database");

    let indexer = PathIndexer::new(store.clone());

    let geocoder = config
        .geocoding_enabled
        .then(|| GeocodingService::new(store.clone()));
    let timeline = TimelineBuilder::new(store.clone(), indexer.clone(), geocoder);

    // Immich import pipeline, when configured
    let (immich, backfill) = match (&config.immich_url, &config.immich_api_key) {
        (Some(url), Some(api_key)) => {
            tracing::info!(url = %url, "Immich configured");
            let client = ImmichClient::new(url, api_key);
            let manager =
                BackfillManager::new(store.clone(), Arc::new(client.clone()), indexer.clone())
                    .await;
            (Some(client), Some(manager))
        }
        _ => {
            tracing::info!("Immich not configured (set IMMICH_URL and IMMICH_API_KEY)");
            (None, None)
        }
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        indexer,
        timeline,
        immich,
        backfill,
    });

    // Build router
    let app = whence::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("whence=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
