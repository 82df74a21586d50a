//! Core traits for featureserver components
//!
//! These are the seams between the fetch lifecycle, the query dispatcher and
//! the pluggable pieces around them (cache backends, providers, hooks,
//! filtering and rendering).

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value as JsonValue};

use super::{context::ProviderRequest, error::FeatureServerResult};
use crate::model::{Dataset, Feature, GeometryKind, QueryParameters};

/// Layer description returned by a provider's layer capability.
pub type LayerPayload = JsonValue;

/// Catalog description returned by a provider's catalog capability.
pub type CatalogPayload = JsonValue;

/// Features streamed straight from a provider, bypassing the cache.
pub type FeatureStream = BoxStream<'static, FeatureServerResult<Feature>>;

/// Key/value store with TTL-aware lookup
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up a cached value. `context` carries request options some
    /// backends use to narrow the lookup.
    async fn retrieve(&self, key: &str, context: &JsonValue)
        -> FeatureServerResult<Option<JsonValue>>;

    /// Store a value for `ttl`
    async fn insert(&self, key: &str, value: JsonValue, ttl: Duration) -> FeatureServerResult<()>;
}

/// Required provider capability: fetch the dataset for a request
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn get_data(&self, req: &ProviderRequest) -> FeatureServerResult<Dataset>;
}

/// Optional provider capability: describe a layer
#[async_trait]
pub trait LayerSource: Send + Sync {
    async fn get_layer(&self, req: &ProviderRequest) -> FeatureServerResult<LayerPayload>;
}

/// Optional provider capability: describe the catalog of layers
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn get_catalog(&self, req: &ProviderRequest) -> FeatureServerResult<CatalogPayload>;
}

/// Optional provider capability: stream features
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn get_stream(&self, req: &ProviderRequest) -> FeatureServerResult<FeatureStream>;
}

/// Optional provider capability: derive cache keys
pub trait CacheKeyGenerator: Send + Sync {
    fn create_key(&self, req: &ProviderRequest) -> String;
}

/// Runs before the provider is asked for data
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn before(&self, req: &ProviderRequest) -> FeatureServerResult<()>;
}

/// Post-processes the provider's dataset before it is cached
#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn after(&self, req: &ProviderRequest, data: Dataset) -> FeatureServerResult<Dataset>;
}

/// Authentication and authorization offered to providers at registration
#[async_trait]
pub trait AuthModule: Send + Sync {
    /// Describe how clients authenticate against `namespace`
    fn authentication_specification(&self, namespace: &str) -> Map<String, JsonValue>;

    /// Exchange request credentials for a token payload
    async fn authenticate(&self, req: &ProviderRequest) -> FeatureServerResult<JsonValue>;

    /// Check that the request may access the resource
    async fn authorize(&self, req: &ProviderRequest) -> FeatureServerResult<()>;
}

/// Rejects malformed query parameters
pub trait QueryValidator: Send + Sync {
    fn validate(&self, params: &QueryParameters) -> FeatureServerResult<()>;
}

/// Projection, spatial/attribute filtering and geometry transforms
pub trait FilterAndTransform: Send + Sync {
    fn filter_and_transform(
        &self,
        dataset: &Dataset,
        params: &QueryParameters,
    ) -> FeatureServerResult<Dataset>;
}

/// Diagnostics about a query; must never influence the response
pub trait WarningsLogger: Send + Sync {
    fn log_warnings(&self, dataset: &Dataset, format: Option<&str>, out_fields: Option<&str>);
}

/// Options handed to the features renderer
#[derive(Debug, Clone, Copy)]
pub struct FeaturesOptions<'a> {
    pub params: &'a QueryParameters,
    pub attribute_sample: Option<&'a Map<String, JsonValue>>,
    pub geometry_type: Option<GeometryKind>,
}

/// Options handed to the count/extent renderer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountAndExtentOptions {
    pub return_count_only: bool,
    pub return_extent_only: bool,
    pub out_sr: Option<JsonValue>,
}

/// Options handed to the precalculated statistics renderer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecalculatedStatisticsOptions {
    pub out_statistics: Option<JsonValue>,
    pub group_by_fields_for_statistics: Option<JsonValue>,
}

pub trait FeaturesRenderer: Send + Sync {
    fn render_features(
        &self,
        dataset: &Dataset,
        options: FeaturesOptions<'_>,
    ) -> FeatureServerResult<JsonValue>;
}

pub trait StatisticsRenderer: Send + Sync {
    fn render_statistics(
        &self,
        dataset: &Dataset,
        params: &QueryParameters,
    ) -> FeatureServerResult<JsonValue>;
}

pub trait PrecalculatedStatisticsRenderer: Send + Sync {
    fn render_precalculated_statistics(
        &self,
        dataset: &Dataset,
        options: &PrecalculatedStatisticsOptions,
    ) -> FeatureServerResult<JsonValue>;
}

pub trait CountAndExtentRenderer: Send + Sync {
    fn render_count_and_extent(
        &self,
        dataset: &Dataset,
        options: &CountAndExtentOptions,
    ) -> FeatureServerResult<JsonValue>;
}
