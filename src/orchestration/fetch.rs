//! Cache-aware provider fetch lifecycle
//!
//! One [`FetchOrchestrator`] exists per provider registration. It derives
//! cache keys, serves fresh cache entries, runs the registration hooks around
//! the provider and writes results back to the cache without making the
//! caller wait for the write.

use std::{sync::Arc, time::Duration};

use serde_json::{Map, Value as JsonValue};

use crate::{
    cache,
    core::{
        AfterHook, AuthModule, BeforeHook, CacheBackend, CatalogPayload, FeatureServerError,
        FeatureServerResult, FeatureStream, LayerPayload, ProviderRequest,
    },
    model::Dataset,
    provider::{
        hooks::{NoopBefore, PassthroughAfter},
        ProviderAdapter,
    },
};

/// Per-registration options
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Default cache lifetime in seconds; `None` or `0` disables caching
    pub cache_ttl: Option<u64>,
    pub before: Option<Arc<dyn BeforeHook>>,
    pub after: Option<Arc<dyn AfterHook>>,
    pub auth: Option<Arc<dyn AuthModule>>,
}

pub struct FetchOrchestrator {
    provider: ProviderAdapter,
    cache: Arc<dyn CacheBackend>,
    cache_ttl: Option<u64>,
    before: Arc<dyn BeforeHook>,
    after: Arc<dyn AfterHook>,
    auth: Option<Arc<dyn AuthModule>>,
}

impl FetchOrchestrator {
    pub fn new(provider: ProviderAdapter, cache: Arc<dyn CacheBackend>, options: FetchOptions) -> Self {
        Self {
            provider,
            cache,
            cache_ttl: options.cache_ttl,
            before: options.before.unwrap_or_else(|| Arc::new(NoopBefore)),
            after: options.after.unwrap_or_else(|| Arc::new(PassthroughAfter)),
            auth: options.auth,
        }
    }

    pub fn namespace(&self) -> &str {
        self.provider.namespace()
    }

    pub fn provider(&self) -> &ProviderAdapter {
        &self.provider
    }

    /// Provider-supplied key if the provider generates keys, else a stable
    /// hash of the request URI.
    pub fn cache_key(&self, req: &ProviderRequest) -> String {
        match &self.provider.capabilities().key_generator {
            Some(generator) => generator.create_key(req),
            None => cache::hash_key(&req.identity()),
        }
    }

    /// Fetch the dataset for a request, from the cache when a usable entry
    /// exists, otherwise from the provider.
    pub async fn fetch_features(&self, req: &ProviderRequest) -> FeatureServerResult<Dataset> {
        let key = self.cache_key(req);

        if let Some(cached) = self.lookup(req, &key, &JsonValue::Object(Map::new())).await {
            match serde_json::from_value::<Dataset>(cached) {
                Ok(dataset) => return Ok(dataset),
                Err(e) => log::debug!("[{}] Ignoring undecodable cache entry '{key}': {e}", req.id),
            }
        }

        self.before.before(req).await.map_err(into_fetch_error)?;
        let raw = self
            .provider
            .data()
            .get_data(req)
            .await
            .map_err(into_fetch_error)?;
        let dataset = self.after.after(req, raw).await.map_err(into_fetch_error)?;

        let ttl = dataset.ttl.or(self.cache_ttl);
        if let Some(ttl) = ttl.filter(|ttl| *ttl > 0) {
            match serde_json::to_value(&dataset) {
                Ok(value) => self.spawn_insert(req, key, value, ttl),
                Err(e) => log::debug!("[{}] Dataset not cacheable: {e}", req.id),
            }
        }

        Ok(dataset)
    }

    /// Fetch the layer description, cached under `<key>::layer`.
    pub async fn fetch_layer(&self, req: &ProviderRequest) -> FeatureServerResult<LayerPayload> {
        let source = self.provider.layer()?;
        let key = cache::layer_key(&self.cache_key(req));

        if let Some(cached) = self.lookup(req, &key, &JsonValue::Object(req.query.clone())).await {
            return Ok(cached);
        }

        let payload = source.get_layer(req).await.map_err(into_fetch_error)?;
        self.cache_payload(req, key, &payload);
        Ok(payload)
    }

    /// Fetch the catalog description, cached under `<key>::catalog`.
    pub async fn fetch_catalog(&self, req: &ProviderRequest) -> FeatureServerResult<CatalogPayload> {
        let source = self.provider.catalog()?;
        let key = cache::catalog_key(&self.cache_key(req));

        if let Some(cached) = self.lookup(req, &key, &JsonValue::Object(req.query.clone())).await {
            return Ok(cached);
        }

        let payload = source.get_catalog(req).await.map_err(into_fetch_error)?;
        self.cache_payload(req, key, &payload);
        Ok(payload)
    }

    /// Stream features straight from the provider. Only the `before` hook
    /// runs; streams are never cached.
    pub async fn fetch_stream(&self, req: &ProviderRequest) -> FeatureServerResult<FeatureStream> {
        let source = self.provider.stream()?;
        self.before.before(req).await.map_err(into_fetch_error)?;
        source.get_stream(req).await.map_err(into_fetch_error)
    }

    /// Authentication specification for this namespace
    pub fn authentication_specification(&self) -> FeatureServerResult<Map<String, JsonValue>> {
        let auth = self.auth_module("authenticationSpecification")?;
        let mut spec = auth.authentication_specification(self.namespace());
        spec.insert(
            "provider".to_string(),
            JsonValue::String(self.namespace().to_string()),
        );
        Ok(spec)
    }

    pub async fn authenticate(&self, req: &ProviderRequest) -> FeatureServerResult<JsonValue> {
        self.auth_module("authenticate")?.authenticate(req).await
    }

    pub async fn authorize(&self, req: &ProviderRequest) -> FeatureServerResult<()> {
        self.auth_module("authorize")?.authorize(req).await
    }

    fn auth_module(&self, capability: &'static str) -> FeatureServerResult<&Arc<dyn AuthModule>> {
        self.auth
            .as_ref()
            .ok_or_else(|| FeatureServerError::not_implemented(self.namespace(), capability))
    }

    /// Read a usable entry; cache failures only cost a provider call.
    async fn lookup(&self, req: &ProviderRequest, key: &str, context: &JsonValue) -> Option<JsonValue> {
        match self.cache.retrieve(key, context).await {
            Ok(Some(value)) if cache::should_use_cache(Some(&value)) => {
                log::debug!("[{}] Cache hit for '{key}'", req.id);
                Some(value)
            }
            Ok(Some(_)) => {
                log::debug!("[{}] Cache entry '{key}' is stale", req.id);
                None
            }
            Ok(None) => None,
            Err(e) => {
                log::debug!("[{}] Cache retrieve for '{key}' failed: {e}", req.id);
                None
            }
        }
    }

    fn cache_payload(&self, req: &ProviderRequest, key: String, payload: &JsonValue) {
        let ttl = payload
            .get("ttl")
            .and_then(JsonValue::as_u64)
            .filter(|ttl| *ttl > 0)
            .or(self.cache_ttl);
        if let Some(ttl) = ttl.filter(|ttl| *ttl > 0) {
            self.spawn_insert(req, key, payload.clone(), ttl);
        }
    }

    /// Fire-and-forget cache write
    fn spawn_insert(&self, req: &ProviderRequest, key: String, value: JsonValue, ttl: u64) {
        let cache = self.cache.clone();
        let request_id = req.id.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.insert(&key, value, Duration::from_secs(ttl)).await {
                log::debug!("[{request_id}] Cache insert for '{key}' failed: {e}");
            }
        });
    }
}

/// Provider and hook failures surface as `ProviderFetch` unless they already
/// carry a more specific kind.
fn into_fetch_error(err: FeatureServerError) -> FeatureServerError {
    match err {
        FeatureServerError::ProviderFetch(_)
        | FeatureServerError::CapabilityNotImplemented { .. }
        | FeatureServerError::Validation { .. } => err,
        other => FeatureServerError::ProviderFetch(Box::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;
    use futures::{stream, StreamExt};
    use serde_json::json;

    use super::*;
    use crate::{
        cache::MemoryCache,
        core::{CacheKeyGenerator, CatalogSource, LayerSource, StreamSource},
        model::{Feature, Geometry, Metadata},
        provider::hooks,
    };

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn request(uri: &str) -> ProviderRequest {
        ProviderRequest::new(uri).unwrap()
    }

    fn sample_dataset() -> Dataset {
        let mut attributes = Map::new();
        attributes.insert("OBJECTID".to_string(), json!(1));
        Dataset::from_features(vec![Feature::new(attributes, Some(Geometry::point(0.0, 0.0)))])
    }

    /// Provider that counts how often it is asked for data
    struct CountingProvider {
        calls: AtomicUsize,
        dataset: Dataset,
    }

    impl CountingProvider {
        fn new(dataset: Dataset) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                dataset,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl crate::core::DataSource for CountingProvider {
        async fn get_data(&self, _req: &ProviderRequest) -> FeatureServerResult<Dataset> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.dataset.clone())
        }
    }

    #[async_trait]
    impl LayerSource for CountingProvider {
        async fn get_layer(&self, _req: &ProviderRequest) -> FeatureServerResult<LayerPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"name": "layer", "ttl": 60}))
        }
    }

    #[async_trait]
    impl CatalogSource for CountingProvider {
        async fn get_catalog(&self, _req: &ProviderRequest) -> FeatureServerResult<CatalogPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"layers": []}))
        }
    }

    #[async_trait]
    impl StreamSource for CountingProvider {
        async fn get_stream(&self, _req: &ProviderRequest) -> FeatureServerResult<FeatureStream> {
            let features = self.dataset.features().to_vec();
            Ok(Box::pin(stream::iter(
                features.into_iter().map(Ok::<_, FeatureServerError>),
            )))
        }
    }

    struct FixedKey;

    impl CacheKeyGenerator for FixedKey {
        fn create_key(&self, req: &ProviderRequest) -> String {
            format!("fixed::{}", req.param("id").unwrap_or("none"))
        }
    }

    /// Cache double that records writes and can be told to fail
    #[derive(Default)]
    struct RecordingCache {
        inner: MemoryCache,
        inserts: Mutex<Vec<(String, Duration)>>,
        retrieves: AtomicUsize,
        fail_retrieve: bool,
        fail_insert: bool,
        canned: Mutex<Option<JsonValue>>,
    }

    impl RecordingCache {
        fn insert_count(&self) -> usize {
            self.inserts.lock().unwrap().len()
        }

        fn inserted_keys(&self) -> Vec<String> {
            self.inserts.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
        }
    }

    #[async_trait]
    impl CacheBackend for RecordingCache {
        async fn retrieve(
            &self,
            key: &str,
            context: &JsonValue,
        ) -> FeatureServerResult<Option<JsonValue>> {
            self.retrieves.fetch_add(1, Ordering::SeqCst);
            if self.fail_retrieve {
                return Err(FeatureServerError::Cache("backend unavailable".to_string()));
            }
            if let Some(value) = self.canned.lock().unwrap().clone() {
                return Ok(Some(value));
            }
            self.inner.retrieve(key, context).await
        }

        async fn insert(&self, key: &str, value: JsonValue, ttl: Duration) -> FeatureServerResult<()> {
            self.inserts.lock().unwrap().push((key.to_string(), ttl));
            if self.fail_insert {
                return Err(FeatureServerError::Cache("disk full".to_string()));
            }
            self.inner.insert(key, value, ttl).await
        }
    }

    /// Let spawned cache writes run
    async fn settle<F: Fn() -> bool>(done: F) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn orchestrator(
        provider: Arc<CountingProvider>,
        cache: Arc<RecordingCache>,
        options: FetchOptions,
    ) -> FetchOrchestrator {
        let adapter = ProviderAdapter::builder("test", provider.clone())
            .layer(provider.clone())
            .catalog(provider.clone())
            .stream(provider)
            .build();
        FetchOrchestrator::new(adapter, cache, options)
    }

    #[tokio::test]
    async fn test_warm_cache_invokes_provider_once() {
        init_log();
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache::default());
        let orchestrator = orchestrator(
            provider.clone(),
            cache.clone(),
            FetchOptions {
                cache_ttl: Some(300),
                ..Default::default()
            },
        );
        let req = request("/test/FeatureServer/0/query?where=1%3D1");

        let first = orchestrator.fetch_features(&req).await.unwrap();
        settle(|| cache.inner.len() == 1).await;
        let second = orchestrator.fetch_features(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(cache.insert_count(), 1);
        assert_eq!(cache.inserts.lock().unwrap()[0].1, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_retrieve_failure_falls_back_to_provider() {
        init_log();
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache {
            fail_retrieve: true,
            ..Default::default()
        });
        let orchestrator = orchestrator(provider.clone(), cache.clone(), FetchOptions::default());

        let dataset = orchestrator
            .fetch_features(&request("/test/FeatureServer/0/query"))
            .await
            .unwrap();

        assert_eq!(dataset, sample_dataset());
        assert_eq!(provider.calls(), 1);
        assert_eq!(cache.retrieves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_is_not_surfaced() {
        init_log();
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache {
            fail_insert: true,
            ..Default::default()
        });
        let orchestrator = orchestrator(
            provider.clone(),
            cache.clone(),
            FetchOptions {
                cache_ttl: Some(60),
                ..Default::default()
            },
        );
        let req = request("/test/FeatureServer/0/query");

        assert!(orchestrator.fetch_features(&req).await.is_ok());
        settle(|| cache.insert_count() == 1).await;
        assert!(orchestrator.fetch_features(&req).await.is_ok());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched() {
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache::default());
        *cache.canned.lock().unwrap() = Some(json!({
            "features": [],
            "_cache": {"expires": cache::now_millis() - 1_000}
        }));
        let orchestrator = orchestrator(provider.clone(), cache.clone(), FetchOptions::default());

        let dataset = orchestrator
            .fetch_features(&request("/test/FeatureServer/0/query"))
            .await
            .unwrap();
        assert_eq!(dataset.features().len(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_legacy_entry_is_served() {
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache::default());
        *cache.canned.lock().unwrap() = Some(json!({
            "features": [],
            "metadata": {"expires": cache::now_millis() + 60_000}
        }));
        let orchestrator = orchestrator(provider.clone(), cache.clone(), FetchOptions::default());

        let dataset = orchestrator
            .fetch_features(&request("/test/FeatureServer/0/query"))
            .await
            .unwrap();
        assert!(dataset.features().is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_fractional_expiry_entry_is_served() {
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache::default());
        *cache.canned.lock().unwrap() = Some(json!({
            "features": [],
            "metadata": {"expires": cache::now_millis() as f64 + 60_000.5}
        }));
        let orchestrator = orchestrator(provider.clone(), cache.clone(), FetchOptions::default());

        let dataset = orchestrator
            .fetch_features(&request("/test/FeatureServer/0/query"))
            .await
            .unwrap();
        assert!(dataset.features().is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_ttl_resolution() {
        // Dataset ttl wins over the registration default
        let mut with_ttl = sample_dataset();
        with_ttl.ttl = Some(5);
        let cache = Arc::new(RecordingCache::default());
        let orchestrator_a = orchestrator(
            CountingProvider::new(with_ttl),
            cache.clone(),
            FetchOptions {
                cache_ttl: Some(300),
                ..Default::default()
            },
        );
        orchestrator_a
            .fetch_features(&request("/a/FeatureServer/0/query"))
            .await
            .unwrap();
        settle(|| cache.insert_count() == 1).await;
        assert_eq!(cache.inserts.lock().unwrap()[0].1, Duration::from_secs(5));

        // No ttl anywhere: nothing is written
        let cache = Arc::new(RecordingCache::default());
        let orchestrator_b = orchestrator(
            CountingProvider::new(sample_dataset()),
            cache.clone(),
            FetchOptions::default(),
        );
        orchestrator_b
            .fetch_features(&request("/b/FeatureServer/0/query"))
            .await
            .unwrap();
        settle(|| false).await;
        assert_eq!(cache.insert_count(), 0);

        // An explicit zero disables caching even with a default
        let mut zero = sample_dataset();
        zero.ttl = Some(0);
        let cache = Arc::new(RecordingCache::default());
        let orchestrator_c = orchestrator(
            CountingProvider::new(zero),
            cache.clone(),
            FetchOptions {
                cache_ttl: Some(300),
                ..Default::default()
            },
        );
        orchestrator_c
            .fetch_features(&request("/c/FeatureServer/0/query"))
            .await
            .unwrap();
        settle(|| false).await;
        assert_eq!(cache.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache::default());
        let orchestrator = orchestrator(
            provider.clone(),
            cache,
            FetchOptions {
                before: Some(hooks::before_sync(|req| {
                    assert_eq!(req.param("layer"), Some("0"));
                    Ok(())
                })),
                after: Some(hooks::after_sync(|_req, mut data| {
                    data.metadata = Some(Metadata {
                        name: Some("after".to_string()),
                        ..Default::default()
                    });
                    Ok(data)
                })),
                ..Default::default()
            },
        );

        let dataset = orchestrator
            .fetch_features(&request("/test/FeatureServer/0/query").with_param("layer", "0"))
            .await
            .unwrap();
        assert_eq!(
            dataset.metadata.and_then(|m| m.name),
            Some("after".to_string())
        );
    }

    #[tokio::test]
    async fn test_before_failure_aborts_fetch() {
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache::default());
        let orchestrator = orchestrator(
            provider.clone(),
            cache.clone(),
            FetchOptions {
                cache_ttl: Some(60),
                before: Some(hooks::before_async(|_req| async {
                    Err(FeatureServerError::provider("token expired"))
                })),
                ..Default::default()
            },
        );

        let err = orchestrator
            .fetch_features(&request("/test/FeatureServer/0/query"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeatureServerError::ProviderFetch(_)));
        assert!(err.to_string().contains("token expired"));
        assert_eq!(provider.calls(), 0);
        settle(|| false).await;
        assert_eq!(cache.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_cause_preserved() {
        let adapter = ProviderAdapter::builder(
            "broken",
            hooks::data_sync(|_req| {
                Err(FeatureServerError::provider(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "upstream down",
                )))
            }),
        )
        .build();
        let orchestrator =
            FetchOrchestrator::new(adapter, Arc::new(MemoryCache::new()), FetchOptions::default());

        let err = orchestrator
            .fetch_features(&request("/broken/FeatureServer/0/query"))
            .await
            .unwrap_err();
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("upstream down"));
    }

    #[tokio::test]
    async fn test_custom_key_and_sub_resource_suffixes() {
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache::default());
        let adapter = ProviderAdapter::builder("test", provider.clone())
            .layer(provider.clone())
            .catalog(provider.clone())
            .key_generator(Arc::new(FixedKey))
            .build();
        let orchestrator = FetchOrchestrator::new(
            adapter,
            cache.clone(),
            FetchOptions {
                cache_ttl: Some(60),
                ..Default::default()
            },
        );
        let req = request("/test/FeatureServer/0/query").with_param("id", "parks");

        assert_eq!(orchestrator.cache_key(&req), "fixed::parks");
        orchestrator.fetch_features(&req).await.unwrap();
        orchestrator.fetch_layer(&req).await.unwrap();
        orchestrator.fetch_catalog(&req).await.unwrap();
        settle(|| cache.insert_count() == 3).await;

        let mut keys = cache.inserted_keys();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "fixed::parks".to_string(),
                "fixed::parks::catalog".to_string(),
                "fixed::parks::layer".to_string()
            ]
        );

        // Layer payload ttl (60) is used for the layer entry
        let layer_ttl = cache
            .inserts
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k.ends_with("::layer"))
            .map(|(_, ttl)| *ttl);
        assert_eq!(layer_ttl, Some(Duration::from_secs(60)));

        // Second layer fetch is served from the cache
        let calls = provider.calls();
        orchestrator.fetch_layer(&req).await.unwrap();
        assert_eq!(provider.calls(), calls);
    }

    #[tokio::test]
    async fn test_default_key_hashes_request_uri() {
        let provider = CountingProvider::new(sample_dataset());
        let orchestrator = orchestrator(
            provider,
            Arc::new(RecordingCache::default()),
            FetchOptions::default(),
        );
        let a = orchestrator.cache_key(&request("/test/FeatureServer/0/query?a=1"));
        let b = orchestrator.cache_key(&request("/test/FeatureServer/0/query?a=1"));
        let c = orchestrator.cache_key(&request("/test/FeatureServer/0/query?a=2"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_missing_capabilities_fail_fast() {
        let provider = CountingProvider::new(sample_dataset());
        let adapter = ProviderAdapter::builder("bare", provider.clone()).build();
        let before_calls = Arc::new(AtomicUsize::new(0));
        let counter = before_calls.clone();
        let orchestrator = FetchOrchestrator::new(
            adapter,
            Arc::new(MemoryCache::new()),
            FetchOptions {
                before: Some(hooks::before_sync(move |_req| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
                ..Default::default()
            },
        );
        let req = request("/bare/FeatureServer/0");

        for err in [
            orchestrator.fetch_layer(&req).await.unwrap_err(),
            orchestrator.fetch_catalog(&req).await.unwrap_err(),
            orchestrator.fetch_stream(&req).await.err().unwrap(),
        ] {
            assert!(matches!(
                err,
                FeatureServerError::CapabilityNotImplemented { ref provider, .. } if provider == "bare"
            ));
        }
        assert_eq!(before_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_stream_runs_before_hook_and_skips_cache() {
        let provider = CountingProvider::new(sample_dataset());
        let cache = Arc::new(RecordingCache::default());
        let before_calls = Arc::new(AtomicUsize::new(0));
        let counter = before_calls.clone();
        let orchestrator = orchestrator(
            provider,
            cache.clone(),
            FetchOptions {
                cache_ttl: Some(60),
                before: Some(hooks::before_callback(move |_req, done| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    done.complete(Ok(()));
                })),
                ..Default::default()
            },
        );

        let features: Vec<_> = orchestrator
            .fetch_stream(&request("/test/FeatureServer/0/query"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(features.len(), 1);
        assert_eq!(before_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.retrieves.load(Ordering::SeqCst), 0);
        settle(|| false).await;
        assert_eq!(cache.insert_count(), 0);
    }

    struct StaticAuth;

    #[async_trait]
    impl AuthModule for StaticAuth {
        fn authentication_specification(&self, _namespace: &str) -> Map<String, JsonValue> {
            let mut spec = Map::new();
            spec.insert("useHttp".to_string(), json!(true));
            spec
        }

        async fn authenticate(&self, _req: &ProviderRequest) -> FeatureServerResult<JsonValue> {
            Ok(json!({"token": "abc", "expires": 1}))
        }

        async fn authorize(&self, req: &ProviderRequest) -> FeatureServerResult<()> {
            match req.query.get("token") {
                Some(token) if token == "abc" => Ok(()),
                _ => Err(FeatureServerError::provider("unauthorized")),
            }
        }
    }

    #[tokio::test]
    async fn test_auth_capability_is_injected() {
        let provider = CountingProvider::new(sample_dataset());
        let with_auth = orchestrator(
            provider.clone(),
            Arc::new(RecordingCache::default()),
            FetchOptions {
                auth: Some(Arc::new(StaticAuth)),
                ..Default::default()
            },
        );
        let spec = with_auth.authentication_specification().unwrap();
        assert_eq!(spec["provider"], json!("test"));
        assert_eq!(spec["useHttp"], json!(true));
        assert!(with_auth
            .authorize(&request("/test/FeatureServer/0/query?token=abc"))
            .await
            .is_ok());
        assert!(with_auth
            .authorize(&request("/test/FeatureServer/0/query"))
            .await
            .is_err());

        let without_auth =
            orchestrator(provider, Arc::new(RecordingCache::default()), FetchOptions::default());
        assert!(without_auth.authentication_specification().is_err());
        assert!(without_auth
            .authenticate(&request("/test/FeatureServer/0/query"))
            .await
            .is_err());
    }
}
