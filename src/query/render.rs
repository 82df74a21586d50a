//! Minimal GeoServices (Esri JSON) response rendering.

use serde_json::{json, Map, Value as JsonValue};

use crate::{
    core::{
        CountAndExtentOptions, CountAndExtentRenderer, FeatureServerResult, FeaturesOptions,
        FeaturesRenderer, PrecalculatedStatisticsOptions, PrecalculatedStatisticsRenderer,
        StatisticsRenderer,
    },
    model::{Dataset, Geometry, GeometryKind, QueryParameters},
};

const DEFAULT_WKID: u64 = 4326;

/// Renders every GeoServices response shape the dispatcher asks for.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoServicesRenderer;

impl FeaturesRenderer for GeoServicesRenderer {
    fn render_features(
        &self,
        dataset: &Dataset,
        options: FeaturesOptions<'_>,
    ) -> FeatureServerResult<JsonValue> {
        let id_field = dataset.id_field();
        let features: Vec<JsonValue> = dataset
            .features()
            .iter()
            .map(|feature| {
                json!({
                    "attributes": feature.attributes,
                    "geometry": feature.geometry.as_ref().and_then(esri_geometry),
                })
            })
            .collect();

        let fields = match dataset.metadata.as_ref().and_then(|m| m.fields.clone()) {
            Some(fields) => fields,
            None => options
                .attribute_sample
                .map(|sample| infer_fields(sample, Some(id_field)))
                .unwrap_or_default(),
        };

        let mut body = json!({
            "objectIdFieldName": id_field,
            "spatialReference": spatial_reference(options.params.out_sr.as_ref()),
            "fields": fields,
            "features": features,
            "exceededTransferLimit": false,
        });
        if let Some(kind) = options.geometry_type {
            body["geometryType"] = json!(kind.esri_type());
        }
        Ok(body)
    }
}

impl StatisticsRenderer for GeoServicesRenderer {
    fn render_statistics(
        &self,
        dataset: &Dataset,
        _params: &QueryParameters,
    ) -> FeatureServerResult<JsonValue> {
        Ok(statistics_response(dataset.statistics.as_ref()))
    }
}

impl PrecalculatedStatisticsRenderer for GeoServicesRenderer {
    fn render_precalculated_statistics(
        &self,
        dataset: &Dataset,
        options: &PrecalculatedStatisticsOptions,
    ) -> FeatureServerResult<JsonValue> {
        let mut body = statistics_response(dataset.statistics.as_ref());
        if let Some(group_by) = &options.group_by_fields_for_statistics {
            body["groupByFieldsForStatistics"] = group_by.clone();
        }
        Ok(body)
    }
}

impl CountAndExtentRenderer for GeoServicesRenderer {
    fn render_count_and_extent(
        &self,
        dataset: &Dataset,
        options: &CountAndExtentOptions,
    ) -> FeatureServerResult<JsonValue> {
        let mut body = Map::new();
        if options.return_count_only {
            let count = dataset
                .count
                .unwrap_or(dataset.features().len() as u64);
            body.insert("count".to_string(), json!(count));
        }
        if options.return_extent_only {
            let extent = match dataset.bbox() {
                Some([xmin, ymin, xmax, ymax]) => json!({
                    "xmin": xmin,
                    "ymin": ymin,
                    "xmax": xmax,
                    "ymax": ymax,
                    "spatialReference": spatial_reference(options.out_sr.as_ref()),
                }),
                None => JsonValue::Null,
            };
            body.insert("extent".to_string(), extent);
        }
        Ok(JsonValue::Object(body))
    }
}

/// Esri JSON geometry for a GeoJSON geometry; collections have no equivalent.
fn esri_geometry(geometry: &Geometry) -> Option<JsonValue> {
    let coordinates = &geometry.coordinates;
    match geometry.kind {
        GeometryKind::Point => {
            let x = coordinates.get(0)?.as_f64()?;
            let y = coordinates.get(1)?.as_f64()?;
            Some(json!({"x": x, "y": y}))
        }
        GeometryKind::MultiPoint => Some(json!({"points": coordinates})),
        GeometryKind::LineString => Some(json!({"paths": [coordinates]})),
        GeometryKind::MultiLineString => Some(json!({"paths": coordinates})),
        GeometryKind::Polygon => Some(json!({"rings": coordinates})),
        GeometryKind::MultiPolygon => {
            let rings: Vec<JsonValue> = coordinates
                .as_array()?
                .iter()
                .filter_map(JsonValue::as_array)
                .flatten()
                .cloned()
                .collect();
            Some(json!({"rings": rings}))
        }
        GeometryKind::GeometryCollection => None,
    }
}

fn esri_field_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "esriFieldTypeInteger",
        JsonValue::Number(_) => "esriFieldTypeDouble",
        _ => "esriFieldTypeString",
    }
}

/// Field definitions inferred from one row of attributes
fn infer_fields(sample: &Map<String, JsonValue>, id_field: Option<&str>) -> Vec<JsonValue> {
    sample
        .iter()
        .map(|(name, value)| {
            let field_type = if Some(name.as_str()) == id_field {
                "esriFieldTypeOID"
            } else {
                esri_field_type(value)
            };
            json!({"name": name, "type": field_type, "alias": name})
        })
        .collect()
}

/// `outSR` as a spatial reference object, WGS84 when absent.
fn spatial_reference(out_sr: Option<&JsonValue>) -> JsonValue {
    match out_sr {
        Some(JsonValue::Number(wkid)) => json!({"wkid": wkid}),
        Some(JsonValue::String(s)) => match s.parse::<u64>() {
            Ok(wkid) => json!({"wkid": wkid}),
            Err(_) => json!({"wkid": DEFAULT_WKID}),
        },
        Some(JsonValue::Object(sr)) => JsonValue::Object(sr.clone()),
        _ => json!({"wkid": DEFAULT_WKID}),
    }
}

fn statistics_response(statistics: Option<&JsonValue>) -> JsonValue {
    let rows: Vec<Map<String, JsonValue>> = match statistics {
        Some(JsonValue::Array(rows)) => rows
            .iter()
            .filter_map(|row| row.as_object().cloned())
            .collect(),
        Some(JsonValue::Object(row)) => vec![row.clone()],
        _ => Vec::new(),
    };
    let fields = rows
        .first()
        .map(|row| infer_fields(row, None))
        .unwrap_or_default();
    let features: Vec<JsonValue> = rows
        .into_iter()
        .map(|row| json!({"attributes": row}))
        .collect();

    json!({
        "displayFieldName": "",
        "fields": fields,
        "features": features,
    })
}
