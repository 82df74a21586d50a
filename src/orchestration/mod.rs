//! Provider fetch orchestration
//!
//! Coordinates the cache, the registration hooks and the provider for every
//! fetch so that callers never deal with any of them directly.

pub mod fetch;

pub use fetch::{FetchOptions, FetchOrchestrator};
