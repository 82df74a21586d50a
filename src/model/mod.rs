//! Datasets and features exchanged between providers, the cache and the
//! query dispatcher.

pub mod query;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

pub use query::{OutputFormat, QueryParameters};

/// Id field assumed when a dataset's metadata does not name one.
pub const DEFAULT_ID_FIELD: &str = "OBJECTID";

/// GeoJSON geometry types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    /// The GeoServices name for this geometry type.
    pub fn esri_type(&self) -> &'static str {
        match self {
            GeometryKind::Point => "esriGeometryPoint",
            GeometryKind::MultiPoint => "esriGeometryMultipoint",
            GeometryKind::LineString | GeometryKind::MultiLineString => "esriGeometryPolyline",
            GeometryKind::Polygon | GeometryKind::MultiPolygon => "esriGeometryPolygon",
            GeometryKind::GeometryCollection => "esriGeometryEnvelope",
        }
    }

    /// Parse either a GeoJSON or a GeoServices type name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Point" | "esriGeometryPoint" => Some(GeometryKind::Point),
            "MultiPoint" | "esriGeometryMultipoint" => Some(GeometryKind::MultiPoint),
            "LineString" => Some(GeometryKind::LineString),
            "MultiLineString" | "esriGeometryPolyline" => Some(GeometryKind::MultiLineString),
            "Polygon" => Some(GeometryKind::Polygon),
            "MultiPolygon" | "esriGeometryPolygon" => Some(GeometryKind::MultiPolygon),
            "GeometryCollection" => Some(GeometryKind::GeometryCollection),
            _ => None,
        }
    }
}

/// A GeoJSON geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub coordinates: JsonValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometries: Vec<Geometry>,
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Self {
            kind: GeometryKind::Point,
            coordinates: JsonValue::from(vec![x, y]),
            geometries: Vec::new(),
        }
    }

    /// Visit every `[x, y, ...]` position of the geometry.
    pub fn for_each_position<F>(&self, f: &mut F)
    where
        F: FnMut(f64, f64),
    {
        fn walk<F: FnMut(f64, f64)>(value: &JsonValue, f: &mut F) {
            let Some(items) = value.as_array() else {
                return;
            };
            let x = items.first().and_then(JsonValue::as_f64);
            let y = items.get(1).and_then(JsonValue::as_f64);
            if let (Some(x), Some(y)) = (x, y) {
                f(x, y);
                return;
            }
            for item in items {
                walk(item, f);
            }
        }

        walk(&self.coordinates, f);
        for geometry in &self.geometries {
            geometry.for_each_position(f);
        }
    }
}

/// One geographic record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "Feature::default_type")]
    pub kind: String,
    #[serde(rename = "properties", alias = "attributes", default)]
    pub attributes: Map<String, JsonValue>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl Feature {
    fn default_type() -> String {
        "Feature".to_string()
    }

    pub fn new(attributes: Map<String, JsonValue>, geometry: Option<Geometry>) -> Self {
        Self {
            kind: Self::default_type(),
            attributes,
            geometry,
        }
    }
}

/// Epoch milliseconds from a JSON number; fractional values are truncated.
pub fn epoch_millis(value: &JsonValue) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

fn deserialize_epoch_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(epoch_millis))
}

/// Marker written by legacy cache backends next to the payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMarker {
    #[serde(
        default,
        deserialize_with = "deserialize_epoch_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<i64>,
    #[serde(
        default,
        deserialize_with = "deserialize_epoch_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<JsonValue>>,
    /// Expiry (epoch millis) recorded by newer cache backends
    #[serde(
        default,
        deserialize_with = "deserialize_epoch_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FiltersApplied {
    #[serde(default)]
    pub all: bool,
    #[serde(flatten)]
    pub other: Map<String, JsonValue>,
}

/// A feature collection plus metadata and optional precomputed aggregates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<Feature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters_applied: Option<FiltersApplied>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    /// Cache lifetime in seconds requested by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(rename = "_cache", default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheMarker>,
}

impl Dataset {
    pub fn from_features(features: Vec<Feature>) -> Self {
        Self {
            kind: Some("FeatureCollection".to_string()),
            features: Some(features),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn features(&self) -> &[Feature] {
        self.features.as_deref().unwrap_or_default()
    }

    pub fn filters_fully_applied(&self) -> bool {
        self.filters_applied.as_ref().is_some_and(|f| f.all)
    }

    /// `metadata.idField`, else [`DEFAULT_ID_FIELD`].
    pub fn id_field(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| m.id_field.as_deref())
            .unwrap_or(DEFAULT_ID_FIELD)
    }

    /// Attributes of the first feature, if any.
    pub fn attribute_sample(&self) -> Option<&Map<String, JsonValue>> {
        self.features().first().map(|f| &f.attributes)
    }

    /// Declared geometry type, else the type of the first feature carrying a
    /// geometry.
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        let declared = self
            .geometry_type
            .as_deref()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.geometry_type.as_deref()));
        if let Some(name) = declared {
            return GeometryKind::from_name(name);
        }
        self.features()
            .iter()
            .find_map(|f| f.geometry.as_ref().map(|g| g.kind))
    }

    /// Bounding box `[xmin, ymin, xmax, ymax]` over every feature position.
    pub fn bbox(&self) -> Option<[f64; 4]> {
        let mut bbox: Option<[f64; 4]> = None;
        for geometry in self.features().iter().filter_map(|f| f.geometry.as_ref()) {
            geometry.for_each_position(&mut |x, y| {
                bbox = Some(match bbox {
                    None => [x, y, x, y],
                    Some([xmin, ymin, xmax, ymax]) => {
                        [xmin.min(x), ymin.min(y), xmax.max(x), ymax.max(y)]
                    }
                });
            });
        }
        bbox
    }
}
