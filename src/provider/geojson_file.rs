use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use validator::Validate;

use super::ProviderAdapter;
use crate::core::{
    CacheKeyGenerator, DataSource, FeatureServerError, FeatureServerResult, FeatureStream,
    LayerPayload, LayerSource, ProviderRequest, StreamSource,
};
use crate::model::{Dataset, Metadata};

pub const PROVIDER_TYPE: &str = "geojson-file";

/// Creates a GeoJSON file provider with the given configuration.
pub fn create_geojson_file_provider(
    namespace: &str,
    cfg: JsonValue,
) -> FeatureServerResult<ProviderAdapter> {
    let config: ProviderConfig = serde_json::from_value(cfg).map_err(|e| {
        FeatureServerError::Configuration(format!("Invalid geojson-file provider config: {e}"))
    })?;

    config.validate().map_err(|e| {
        FeatureServerError::Configuration(format!("Invalid geojson-file provider config: {e}"))
    })?;

    let provider = Arc::new(GeoJsonFileProvider { config });

    Ok(ProviderAdapter::builder(namespace, provider.clone())
        .layer(provider.clone())
        .stream(provider.clone())
        .key_generator(provider)
        .build())
}

/// Configuration for the GeoJSON file provider.
#[derive(Default, Debug, Serialize, Deserialize, Validate)]
struct ProviderConfig {
    #[validate(length(min = 1))]
    path: String,
    #[serde(default)]
    id_field: Option<String>,
    #[serde(default)]
    name: Option<String>,
    /// Overrides the registration TTL for datasets read from this file
    #[serde(default)]
    ttl: Option<u64>,
}

/// Serves a GeoJSON FeatureCollection stored on disk.
pub struct GeoJsonFileProvider {
    config: ProviderConfig,
}

impl GeoJsonFileProvider {
    async fn read_dataset(&self) -> FeatureServerResult<Dataset> {
        let path = PathBuf::from(&self.config.path);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| FeatureServerError::provider(format!("{}: {e}", path.display())))?;
        let mut dataset: Dataset = serde_json::from_slice(&raw).map_err(|e| {
            FeatureServerError::provider(format!("{} is not valid GeoJSON: {e}", path.display()))
        })?;

        let metadata = dataset.metadata.get_or_insert_with(Metadata::default);
        if metadata.id_field.is_none() {
            metadata.id_field = self.config.id_field.clone();
        }
        if metadata.name.is_none() {
            metadata.name = self.config.name.clone();
        }
        if dataset.ttl.is_none() {
            dataset.ttl = self.config.ttl;
        }

        log::debug!(
            "Read {} features from {}",
            dataset.features().len(),
            path.display()
        );
        Ok(dataset)
    }
}

#[async_trait]
impl DataSource for GeoJsonFileProvider {
    async fn get_data(&self, _req: &ProviderRequest) -> FeatureServerResult<Dataset> {
        self.read_dataset().await
    }
}

#[async_trait]
impl LayerSource for GeoJsonFileProvider {
    async fn get_layer(&self, _req: &ProviderRequest) -> FeatureServerResult<LayerPayload> {
        let dataset = self.read_dataset().await?;
        let mut layer = json!({
            "name": dataset
                .metadata
                .as_ref()
                .and_then(|m| m.name.clone())
                .unwrap_or_else(|| self.config.path.clone()),
            "objectIdField": dataset.id_field(),
            "geometryType": dataset.geometry_kind().map(|k| k.esri_type()),
            "count": dataset.features().len(),
        });
        if let Some([xmin, ymin, xmax, ymax]) = dataset.bbox() {
            layer["extent"] = json!({
                "xmin": xmin, "ymin": ymin, "xmax": xmax, "ymax": ymax,
                "spatialReference": {"wkid": 4326},
            });
        }
        if let Some(ttl) = self.config.ttl {
            layer["ttl"] = json!(ttl);
        }
        Ok(layer)
    }
}

#[async_trait]
impl StreamSource for GeoJsonFileProvider {
    async fn get_stream(&self, _req: &ProviderRequest) -> FeatureServerResult<FeatureStream> {
        let dataset = self.read_dataset().await?;
        let features = dataset.features.unwrap_or_default();
        Ok(Box::pin(stream::iter(features.into_iter().map(Ok::<_, FeatureServerError>))))
    }
}

impl CacheKeyGenerator for GeoJsonFileProvider {
    // The file is the same whatever the query asks for
    fn create_key(&self, _req: &ProviderRequest) -> String {
        format!("{PROVIDER_TYPE}::{}", self.config.path)
    }
}
