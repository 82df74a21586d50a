//! Provider registry
//!
//! Maps each registered namespace to the fetch orchestrator serving it.

use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use log::{debug, info};

use super::{error::FeatureServerResult, traits::CacheBackend, FeatureServerError};
use crate::{
    config::Config,
    orchestration::{FetchOptions, FetchOrchestrator},
    provider::{build_provider, ProviderAdapter},
};

/// Registered providers, keyed by namespace
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<FetchOrchestrator>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    /// Register a provider, replacing any previous registration of the same
    /// namespace.
    pub fn register(
        &self,
        provider: ProviderAdapter,
        cache: Arc<dyn CacheBackend>,
        options: FetchOptions,
    ) -> Arc<FetchOrchestrator> {
        let namespace = provider.namespace().to_string();
        debug!("Registering provider '{namespace}'");
        let orchestrator = Arc::new(FetchOrchestrator::new(provider, cache, options));
        self.providers.insert(namespace, orchestrator.clone());
        orchestrator
    }

    /// Look up the orchestrator for a namespace
    pub fn get(&self, namespace: &str) -> FeatureServerResult<Arc<FetchOrchestrator>> {
        self.providers
            .get(namespace)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FeatureServerError::NotFound(format!("provider '{namespace}'")))
    }

    pub fn remove(&self, namespace: &str) -> Option<Arc<FetchOrchestrator>> {
        debug!("Removing provider '{namespace}'");
        self.providers.remove(namespace).map(|(_, provider)| provider)
    }

    /// Registered namespaces, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Build and register every provider named in the configuration.
    ///
    /// Providers that were registered earlier but are missing from the
    /// configuration are dropped.
    pub fn load_static_providers(
        &self,
        config: &Config,
        cache: Arc<dyn CacheBackend>,
    ) -> FeatureServerResult<()> {
        info!("Loading {} providers from configuration", config.providers.len());

        let mut adapters = Vec::with_capacity(config.providers.len());
        for entry in &config.providers {
            let adapter = build_provider(&entry.kind, &entry.name, entry.config.clone())?;
            adapters.push((adapter, entry.cache_ttl));
        }

        let names: HashSet<&str> = config.providers.iter().map(|p| p.name.as_str()).collect();
        self.providers.retain(|name, _| names.contains(name.as_str()));

        for (adapter, cache_ttl) in adapters {
            self.register(
                adapter,
                cache.clone(),
                FetchOptions {
                    cache_ttl,
                    ..Default::default()
                },
            );
        }
        Ok(())
    }
}
