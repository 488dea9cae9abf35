// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod job;
pub mod location;
pub mod path;

pub use job::{ImportConfig, ImportJob, JobStatus};
pub use location::{BBox, Bounds, Location, LocationSource, PhotoLocation};
pub use path::{Path, PathPoint};
