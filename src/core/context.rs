//! Request context management
//!
//! This module provides the [`ProviderRequest`] handed to every provider,
//! hook and cache-key generator for the lifetime of one fetch.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use super::error::{FeatureServerError, FeatureServerResult};
use crate::utils::request::parse_query;

/// Per-request state shared with providers and hooks
#[derive(Clone, Debug)]
pub struct ProviderRequest {
    /// Request identifier used to correlate log lines
    pub id: String,

    /// The full request URI; its string form is the default cache identity
    pub uri: http::Uri,

    /// Parameters extracted from the route pattern (e.g. `id`, `layer`)
    pub params: BTreeMap<String, String>,

    /// Query string decoded into a JSON map
    pub query: Map<String, JsonValue>,
}

impl ProviderRequest {
    /// Build a request from a URI string, decoding its query string.
    pub fn new(uri: &str) -> FeatureServerResult<Self> {
        let uri: http::Uri = uri.parse().map_err(|e: http::uri::InvalidUri| {
            FeatureServerError::validation("uri", e.to_string())
        })?;
        let query = uri.query().map(parse_query).unwrap_or_default();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            uri,
            params: BTreeMap::new(),
            query,
        })
    }

    /// Attach a route parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get a route parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Stable identity of the request, used by the default cache key.
    pub fn identity(&self) -> String {
        self.uri.to_string()
    }
}
