//! Provider registration.
//!
//! A provider is described once, at registration, by a [`ProviderAdapter`]:
//! its required data source plus an explicit record of the optional
//! capabilities it offers. Built-in providers are created from configuration
//! through [`build_provider`].

pub mod geojson_file;
pub mod hooks;

use std::{collections::HashMap, fmt, sync::Arc};

use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;

use crate::core::{
    CacheKeyGenerator, CatalogSource, DataSource, FeatureServerError, FeatureServerResult,
    LayerSource, StreamSource,
};

/// Signature shared by built-in provider factories
pub type ProviderCreateFn = fn(&str, JsonValue) -> FeatureServerResult<ProviderAdapter>;

/// Optional operations a provider offers, resolved at registration.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub layer: Option<Arc<dyn LayerSource>>,
    pub catalog: Option<Arc<dyn CatalogSource>>,
    pub stream: Option<Arc<dyn StreamSource>>,
    pub key_generator: Option<Arc<dyn CacheKeyGenerator>>,
}

impl Capabilities {
    /// Names of the optional capabilities that are present
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.layer.is_some() {
            names.push("getLayer");
        }
        if self.catalog.is_some() {
            names.push("getCatalog");
        }
        if self.stream.is_some() {
            names.push("getStream");
        }
        if self.key_generator.is_some() {
            names.push("createKey");
        }
        names
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// A registered provider: namespace, data source and capability record.
#[derive(Clone)]
pub struct ProviderAdapter {
    namespace: String,
    data: Arc<dyn DataSource>,
    capabilities: Capabilities,
}

impl ProviderAdapter {
    pub fn builder(namespace: impl Into<String>, data: Arc<dyn DataSource>) -> ProviderAdapterBuilder {
        ProviderAdapterBuilder {
            namespace: namespace.into(),
            data,
            capabilities: Capabilities::default(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn data(&self) -> &Arc<dyn DataSource> {
        &self.data
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn layer(&self) -> FeatureServerResult<&Arc<dyn LayerSource>> {
        self.capabilities
            .layer
            .as_ref()
            .ok_or_else(|| FeatureServerError::not_implemented(&self.namespace, "getLayer"))
    }

    pub fn catalog(&self) -> FeatureServerResult<&Arc<dyn CatalogSource>> {
        self.capabilities
            .catalog
            .as_ref()
            .ok_or_else(|| FeatureServerError::not_implemented(&self.namespace, "getCatalog"))
    }

    pub fn stream(&self) -> FeatureServerResult<&Arc<dyn StreamSource>> {
        self.capabilities
            .stream
            .as_ref()
            .ok_or_else(|| FeatureServerError::not_implemented(&self.namespace, "getStream"))
    }
}

impl fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("namespace", &self.namespace)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

pub struct ProviderAdapterBuilder {
    namespace: String,
    data: Arc<dyn DataSource>,
    capabilities: Capabilities,
}

impl ProviderAdapterBuilder {
    pub fn layer(mut self, source: Arc<dyn LayerSource>) -> Self {
        self.capabilities.layer = Some(source);
        self
    }

    pub fn catalog(mut self, source: Arc<dyn CatalogSource>) -> Self {
        self.capabilities.catalog = Some(source);
        self
    }

    pub fn stream(mut self, source: Arc<dyn StreamSource>) -> Self {
        self.capabilities.stream = Some(source);
        self
    }

    pub fn key_generator(mut self, generator: Arc<dyn CacheKeyGenerator>) -> Self {
        self.capabilities.key_generator = Some(generator);
        self
    }

    pub fn build(self) -> ProviderAdapter {
        log::debug!(
            "Provider '{}' registered with capabilities {:?}",
            self.namespace,
            self.capabilities
        );
        ProviderAdapter {
            namespace: self.namespace,
            data: self.data,
            capabilities: self.capabilities,
        }
    }
}

/// Global registry mapping built-in provider types to their factory functions.
static PROVIDER_BUILDER_REGISTRY: Lazy<HashMap<&'static str, ProviderCreateFn>> =
    Lazy::new(|| {
        let arr: Vec<(&str, ProviderCreateFn)> = vec![(
            geojson_file::PROVIDER_TYPE,
            geojson_file::create_geojson_file_provider,
        )];
        arr.into_iter().collect()
    });

/// Whether `kind` names a built-in provider type
pub fn is_builtin_provider(kind: &str) -> bool {
    PROVIDER_BUILDER_REGISTRY.contains_key(kind)
}

/// Creates a built-in provider from configuration.
///
/// Looks up the factory for `kind` and invokes it with the namespace the
/// provider is registered under and its provider-specific configuration.
///
/// # Errors
/// Returns `Configuration` for unknown provider types or invalid configuration
pub fn build_provider(
    kind: &str,
    namespace: &str,
    cfg: JsonValue,
) -> FeatureServerResult<ProviderAdapter> {
    let builder = PROVIDER_BUILDER_REGISTRY.get(kind).ok_or_else(|| {
        FeatureServerError::Configuration(format!("Unknown provider type '{kind}'"))
    })?;
    builder(namespace, cfg)
}
