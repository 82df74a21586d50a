//! Default validator, filter and diagnostics collaborators.

use std::borrow::Cow;

use log::warn;
use validator::Validate;

use crate::{
    core::{
        FeatureServerError, FeatureServerResult, FilterAndTransform, QueryValidator,
        WarningsLogger,
    },
    model::{Dataset, OutputFormat, QueryParameters},
};

/// Validates query parameters with their `validator` rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParamsValidator;

impl QueryValidator for ParamsValidator {
    fn validate(&self, params: &QueryParameters) -> FeatureServerResult<()> {
        let Err(errors) = params.validate() else {
            return Ok(());
        };

        let field_errors = errors.field_errors();
        let mut fields: Vec<&Cow<'static, str>> = field_errors.keys().collect();
        fields.sort();

        let Some(field) = fields.first() else {
            return Err(FeatureServerError::validation("query", errors.to_string()));
        };
        let message = field_errors
            .get(*field)
            .and_then(|errs| errs.first())
            .map(|err| match &err.message {
                Some(message) => message.to_string(),
                None => err.code.to_string(),
            })
            .unwrap_or_else(|| errors.to_string());

        Err(FeatureServerError::validation(parameter_name(field), message))
    }
}

/// Query-string name of a `QueryParameters` field
fn parameter_name(field: &str) -> String {
    match field {
        "out_fields" => "outFields".to_string(),
        "out_sr" => "outSR".to_string(),
        "out_statistics" => "outStatistics".to_string(),
        other => other.to_string(),
    }
}

/// Projects feature attributes onto the requested `outFields`.
///
/// The dataset's id field is always kept; `*` or no `outFields` keeps every
/// attribute.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutFieldsProjection;

impl FilterAndTransform for OutFieldsProjection {
    fn filter_and_transform(
        &self,
        dataset: &Dataset,
        params: &QueryParameters,
    ) -> FeatureServerResult<Dataset> {
        let mut projected = dataset.clone();
        let Some(fields) = params.out_field_names() else {
            return Ok(projected);
        };

        let id_field = dataset.id_field().to_string();
        if let Some(features) = projected.features.as_mut() {
            for feature in features {
                feature
                    .attributes
                    .retain(|name, _| name == &id_field || fields.iter().any(|f| f == name));
            }
        }
        Ok(projected)
    }
}

/// Logs requests that will produce incomplete responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWarnings;

impl WarningsLogger for LogWarnings {
    fn log_warnings(&self, dataset: &Dataset, format: Option<&str>, out_fields: Option<&str>) {
        let is_geojson = format.and_then(OutputFormat::parse) == Some(OutputFormat::Geojson);

        if !is_geojson && dataset.metadata.as_ref().and_then(|m| m.fields.as_ref()).is_none() {
            warn!("Requested GeoServices output but the dataset declares no metadata.fields; field types will be inferred");
        }

        let Some(sample) = dataset.attribute_sample() else {
            return;
        };
        let requested = QueryParameters {
            out_fields: out_fields.map(str::to_string),
            ..Default::default()
        };
        for field in requested.out_field_names().unwrap_or_default() {
            if !sample.contains_key(&field) {
                warn!("Requested outField '{field}' is not present in the data");
            }
        }
    }
}
