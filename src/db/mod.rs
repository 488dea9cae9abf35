//! Database layer (SQLite).

pub mod store;

pub use store::{CachedPlace, Store};
