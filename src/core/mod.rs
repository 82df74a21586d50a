//! Core abstractions for featureserver
//!
//! Request context, the unified error type, the provider registry and the
//! traits every pluggable component implements.

pub mod context;
pub mod error;
pub mod registry;
pub mod traits;

#[cfg(test)]
mod tests;

pub use context::ProviderRequest;
pub use error::{BoxError, ErrorContext, FeatureServerError, FeatureServerResult};
pub use registry::ProviderRegistry;
pub use traits::*;
