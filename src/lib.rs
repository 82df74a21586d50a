//! Core of a geospatial feature server.
//!
//! Providers are registered with a cache-aware fetch lifecycle and their
//! datasets are resolved against client query options into GeoServices or
//! GeoJSON responses.

pub mod cache;
pub mod config;
pub mod core;
pub mod logging;
pub mod model;
pub mod orchestration;
pub mod provider;
pub mod query;
pub(crate) mod utils;
