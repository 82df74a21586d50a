//! Response-shape dispatch
//!
//! [`QueryDispatcher::resolve`] maps a dataset and the client's query options
//! onto exactly one response pipeline. The collaborators doing the actual
//! filtering and rendering are trait objects; [`defaults`] and [`render`]
//! provide the implementations used unless a caller swaps them out.

pub mod defaults;
pub mod render;

use std::{borrow::Cow, sync::Arc};

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    core::{
        CountAndExtentOptions, CountAndExtentRenderer, ErrorContext, FeatureServerResult,
        FeaturesOptions, FeaturesRenderer, FilterAndTransform, PrecalculatedStatisticsOptions,
        PrecalculatedStatisticsRenderer, QueryValidator, StatisticsRenderer, WarningsLogger,
    },
    model::{Dataset, Feature, OutputFormat, QueryParameters},
};

pub use defaults::{LogWarnings, OutFieldsProjection, ParamsValidator};
pub use render::GeoServicesRenderer;

/// Payload produced by [`QueryDispatcher::resolve`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    /// Raw GeoJSON, `f=geojson`
    FeatureCollection {
        #[serde(rename = "type")]
        kind: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        features: Option<Vec<Feature>>,
    },
    /// Precomputed count and/or extent copied from the dataset
    CountAndExtent {
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        extent: Option<JsonValue>,
    },
    #[serde(rename_all = "camelCase")]
    ObjectIds {
        object_id_field_name: String,
        object_ids: Vec<JsonValue>,
    },
    /// Output of one of the renderers
    Rendered(JsonValue),
}

impl QueryResponse {
    pub fn to_json(&self) -> FeatureServerResult<JsonValue> {
        serde_json::to_value(self).with_context("Unable to encode query response")
    }
}

/// Chooses and runs the response pipeline for a query.
#[derive(Clone)]
pub struct QueryDispatcher {
    validator: Arc<dyn QueryValidator>,
    filter: Arc<dyn FilterAndTransform>,
    warnings: Arc<dyn WarningsLogger>,
    features: Arc<dyn FeaturesRenderer>,
    statistics: Arc<dyn StatisticsRenderer>,
    precalculated: Arc<dyn PrecalculatedStatisticsRenderer>,
    count_and_extent: Arc<dyn CountAndExtentRenderer>,
}

impl Default for QueryDispatcher {
    fn default() -> Self {
        let renderer = Arc::new(GeoServicesRenderer);
        Self {
            validator: Arc::new(ParamsValidator),
            filter: Arc::new(OutFieldsProjection),
            warnings: Arc::new(LogWarnings),
            features: renderer.clone(),
            statistics: renderer.clone(),
            precalculated: renderer.clone(),
            count_and_extent: renderer,
        }
    }
}

impl QueryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(mut self, validator: Arc<dyn QueryValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn FilterAndTransform>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_warnings(mut self, warnings: Arc<dyn WarningsLogger>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_features_renderer(mut self, renderer: Arc<dyn FeaturesRenderer>) -> Self {
        self.features = renderer;
        self
    }

    pub fn with_statistics_renderer(mut self, renderer: Arc<dyn StatisticsRenderer>) -> Self {
        self.statistics = renderer;
        self
    }

    pub fn with_precalculated_renderer(
        mut self,
        renderer: Arc<dyn PrecalculatedStatisticsRenderer>,
    ) -> Self {
        self.precalculated = renderer;
        self
    }

    pub fn with_count_and_extent_renderer(
        mut self,
        renderer: Arc<dyn CountAndExtentRenderer>,
    ) -> Self {
        self.count_and_extent = renderer;
        self
    }

    /// Resolve `dataset` against `params` into a single response payload.
    ///
    /// # Errors
    /// `Validation` when the parameters are rejected, before anything else
    /// runs; otherwise whatever the selected collaborator reports.
    pub fn resolve(
        &self,
        dataset: &Dataset,
        params: &QueryParameters,
    ) -> FeatureServerResult<QueryResponse> {
        self.validator.validate(params)?;

        if should_render_precalculated(dataset, params) {
            return self.render_precalculated(dataset, params);
        }

        let working: Cow<'_, Dataset> =
            if dataset.filters_fully_applied() || dataset.features.is_none() {
                Cow::Borrowed(dataset)
            } else {
                Cow::Owned(self.filter.filter_and_transform(dataset, params)?)
            };

        if !(params.count_only() || params.extent_only() || params.ids_only()) {
            self.warnings
                .log_warnings(&working, params.f.as_deref(), params.out_fields.as_deref());
        }

        // Count, extent and ids flags are ignored for geojson output
        if params.format() == Some(OutputFormat::Geojson) {
            return Ok(QueryResponse::FeatureCollection {
                kind: "FeatureCollection",
                features: working.into_owned().features,
            });
        }

        let options = FeaturesOptions {
            params,
            attribute_sample: dataset.attribute_sample(),
            geometry_type: dataset.geometry_kind(),
        };
        self.render_geoservices(&working, options)
    }

    fn render_precalculated(
        &self,
        dataset: &Dataset,
        params: &QueryParameters,
    ) -> FeatureServerResult<QueryResponse> {
        if dataset.statistics.is_some() {
            let options = PrecalculatedStatisticsOptions {
                out_statistics: params.out_statistics.clone(),
                group_by_fields_for_statistics: params.group_by_fields_for_statistics.clone(),
            };
            return self
                .precalculated
                .render_precalculated_statistics(dataset, &options)
                .map(QueryResponse::Rendered);
        }

        Ok(QueryResponse::CountAndExtent {
            count: dataset.count.filter(|_| params.count_only()),
            extent: dataset.extent.clone().filter(|_| params.extent_only()),
        })
    }

    fn render_geoservices(
        &self,
        working: &Dataset,
        options: FeaturesOptions<'_>,
    ) -> FeatureServerResult<QueryResponse> {
        let params = options.params;

        if params.count_only() || params.extent_only() {
            let count_options = CountAndExtentOptions {
                return_count_only: params.count_only(),
                return_extent_only: params.extent_only(),
                out_sr: params.out_sr.clone(),
            };
            return self
                .count_and_extent
                .render_count_and_extent(working, &count_options)
                .map(QueryResponse::Rendered);
        }

        if params.ids_only() {
            let id_field = working.id_field();
            let object_ids = working
                .features()
                .iter()
                .map(|f| f.attributes.get(id_field).cloned().unwrap_or(JsonValue::Null))
                .collect();
            return Ok(QueryResponse::ObjectIds {
                object_id_field_name: id_field.to_string(),
                object_ids,
            });
        }

        if working.statistics.is_some() {
            return self
                .statistics
                .render_statistics(working, params)
                .map(QueryResponse::Rendered);
        }

        self.features
            .render_features(working, options)
            .map(QueryResponse::Rendered)
    }
}

fn should_render_precalculated(dataset: &Dataset, params: &QueryParameters) -> bool {
    dataset.statistics.is_some()
        || (params.count_only() && dataset.count.is_some())
        || (params.extent_only() && dataset.extent.is_some() && !params.count_only())
}
