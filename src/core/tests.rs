//! Tests spanning the registry, the fetch lifecycle and query dispatch.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde_json::json;
use uuid::Uuid;

use super::*;
use crate::{
    cache::MemoryCache,
    config::Config,
    model::QueryParameters,
    orchestration::FetchOptions,
    provider::{hooks, ProviderAdapter},
    query::{QueryDispatcher, QueryResponse},
};

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_fixture() -> PathBuf {
    let path = std::env::temp_dir().join(format!("featureserver-core-{}.geojson", Uuid::new_v4()));
    let body = json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"PARK_ID": 10, "name": "Riverside", "acres": 12.5},
             "geometry": {"type": "Point", "coordinates": [-77.0, 38.9]}},
            {"type": "Feature", "properties": {"PARK_ID": 11, "name": "Hilltop", "acres": 3.0},
             "geometry": {"type": "Point", "coordinates": [-77.1, 39.0]}},
            {"type": "Feature", "properties": {"PARK_ID": 12, "name": "Marsh", "acres": 40.0},
             "geometry": {"type": "Point", "coordinates": [-76.8, 38.7]}}
        ]
    });
    std::fs::write(&path, body.to_string()).unwrap();
    path
}

fn config_for(path: &PathBuf) -> Config {
    let conf_str = format!(
        r#"
---
providers:
  - name: parks
    type: geojson-file
    cache_ttl: 120
    config:
      path: "{}"
      id_field: PARK_ID
        "#,
        path.display()
    );
    Config::from_yaml(&conf_str).unwrap()
}

async fn wait_for_entries(cache: &MemoryCache, expected: usize) {
    for _ in 0..100 {
        if cache.len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[test]
fn test_registry_operations() {
    let registry = ProviderRegistry::new();
    assert!(registry.is_empty());
    assert!(matches!(
        registry.get("nonexistent"),
        Err(FeatureServerError::NotFound(_))
    ));

    let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
    for namespace in ["zeta", "alpha"] {
        let adapter = ProviderAdapter::builder(
            namespace,
            hooks::data_sync(|_| Ok(crate::model::Dataset::default())),
        )
        .build();
        registry.register(adapter, cache.clone(), FetchOptions::default());
    }

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.namespaces(), vec!["alpha", "zeta"]);
    assert_eq!(registry.get("alpha").unwrap().namespace(), "alpha");
    assert!(registry.remove("alpha").is_some());
    assert!(registry.get("alpha").is_err());
}

#[tokio::test]
async fn test_configured_provider_query_end_to_end() {
    init_log();
    let path = write_fixture();
    let config = config_for(&path);
    let cache = Arc::new(MemoryCache::new());
    let registry = ProviderRegistry::new();
    registry.load_static_providers(&config, cache.clone()).unwrap();
    assert_eq!(registry.namespaces(), vec!["parks"]);

    let orchestrator = registry.get("parks").unwrap();
    let dispatcher = QueryDispatcher::default();

    let req = ProviderRequest::new("/parks/FeatureServer/0/query?returnIdsOnly=true").unwrap();
    let dataset = orchestrator.fetch_features(&req).await.unwrap();
    let params = QueryParameters::from_query(&req.query).unwrap();
    let response = dispatcher.resolve(&dataset, &params).unwrap();
    assert_eq!(
        response,
        QueryResponse::ObjectIds {
            object_id_field_name: "PARK_ID".to_string(),
            object_ids: vec![json!(10), json!(11), json!(12)],
        }
    );

    // The file provider keys every request on its path, and the registration
    // ttl applies, so the dataset is now cached.
    wait_for_entries(&cache, 1).await;
    assert_eq!(cache.len(), 1);
    std::fs::remove_file(&path).unwrap();

    let req = ProviderRequest::new(
        "/parks/FeatureServer/0/query?returnCountOnly=true&returnExtentOnly=true&outSR=3857",
    )
    .unwrap();
    let dataset = orchestrator.fetch_features(&req).await.unwrap();
    let params = QueryParameters::from_query(&req.query).unwrap();
    let body = dispatcher.resolve(&dataset, &params).unwrap().to_json().unwrap();
    assert_eq!(body["count"], json!(3));
    assert_eq!(body["extent"]["xmin"], json!(-77.1));
    assert_eq!(body["extent"]["spatialReference"], json!({"wkid": 3857}));

    let req = ProviderRequest::new("/parks/FeatureServer/0/query?f=geojson&outFields=name").unwrap();
    let dataset = orchestrator.fetch_features(&req).await.unwrap();
    let params = QueryParameters::from_query(&req.query).unwrap();
    match dispatcher.resolve(&dataset, &params).unwrap() {
        QueryResponse::FeatureCollection { features, .. } => {
            let features = features.unwrap();
            assert_eq!(features.len(), 3);
            assert_eq!(
                features[0].attributes,
                json!({"PARK_ID": 10, "name": "Riverside"})
                    .as_object()
                    .cloned()
                    .unwrap()
            );
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[tokio::test]
async fn test_layer_capability_from_configured_provider() {
    let path = write_fixture();
    let config = config_for(&path);
    let registry = ProviderRegistry::new();
    registry
        .load_static_providers(&config, Arc::new(MemoryCache::new()))
        .unwrap();
    let orchestrator = registry.get("parks").unwrap();

    let req = ProviderRequest::new("/parks/FeatureServer/0").unwrap();
    let layer = orchestrator.fetch_layer(&req).await.unwrap();
    assert_eq!(layer["objectIdField"], json!("PARK_ID"));
    assert_eq!(layer["count"], json!(3));

    let err = orchestrator.fetch_catalog(&req).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "getCatalog() method is not implemented in the parks provider"
    );
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn test_reload_drops_missing_providers() {
    let path = write_fixture();
    let registry = ProviderRegistry::new();
    let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());
    registry.register(
        ProviderAdapter::builder("legacy", hooks::data_sync(|_| Ok(Default::default()))).build(),
        cache.clone(),
        FetchOptions::default(),
    );

    registry
        .load_static_providers(&config_for(&path), cache)
        .unwrap();
    assert_eq!(registry.namespaces(), vec!["parks"]);
    let _ = std::fs::remove_file(path);
}
