use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use validator::{Validate, ValidationError};

static OUT_FIELDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\*|[A-Za-z_][\w.]*(\s*,\s*[A-Za-z_][\w.]*)*)\s*$")
        .expect("out fields pattern is valid")
});

const STATISTIC_TYPES: [&str; 7] = ["count", "sum", "min", "max", "avg", "stddev", "var"];

/// Output formats understood by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Pjson,
    Geojson,
    Pbf,
    Html,
}

impl OutputFormat {
    /// Exact, case-sensitive match on the `f` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "pjson" => Some(OutputFormat::Pjson),
            "geojson" => Some(OutputFormat::Geojson),
            "pbf" => Some(OutputFormat::Pbf),
            "html" => Some(OutputFormat::Html),
            _ => None,
        }
    }
}

/// Client query options.
///
/// Flags accept JSON booleans as well as the `"true"`/`"false"` strings that
/// arrive from query strings. Options the dispatcher does not interpret are
/// kept in `extra` and passed through to renderers.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_format"))]
    pub f: Option<String>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_count_only: Option<bool>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_extent_only: Option<bool>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_ids_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_out_fields"))]
    pub out_fields: Option<String>,

    #[serde(default, rename = "outSR", skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_out_sr"))]
    pub out_sr: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_out_statistics"))]
    pub out_statistics: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by_fields_for_statistics: Option<JsonValue>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl QueryParameters {
    /// Decode parameters from a query map (see `utils::request::parse_query`).
    pub fn from_query(query: &Map<String, JsonValue>) -> serde_json::Result<Self> {
        serde_json::from_value(JsonValue::Object(query.clone()))
    }

    pub fn count_only(&self) -> bool {
        self.return_count_only == Some(true)
    }

    pub fn extent_only(&self) -> bool {
        self.return_extent_only == Some(true)
    }

    pub fn ids_only(&self) -> bool {
        self.return_ids_only == Some(true)
    }

    pub fn format(&self) -> Option<OutputFormat> {
        self.f.as_deref().and_then(OutputFormat::parse)
    }

    /// Requested out fields, `None` when every field is requested.
    pub fn out_field_names(&self) -> Option<Vec<String>> {
        let raw = self.out_fields.as_deref()?.trim();
        if raw.is_empty() || raw == "*" {
            return None;
        }
        Some(raw.split(',').map(|s| s.trim().to_string()).collect())
    }
}

fn validate_format(f: &str) -> Result<(), ValidationError> {
    if OutputFormat::parse(f).is_none() {
        let mut err = ValidationError::new("unsupported_format");
        err.add_param("f".into(), &f.to_string());
        return Err(err.with_message(format!("unsupported output format '{f}'").into()));
    }
    Ok(())
}

fn validate_out_fields(out_fields: &str) -> Result<(), ValidationError> {
    if out_fields.trim().is_empty() || OUT_FIELDS_RE.is_match(out_fields) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_out_fields")
            .with_message("outFields must be '*' or a comma separated list of field names".into()))
    }
}

fn validate_out_sr(out_sr: &JsonValue) -> Result<(), ValidationError> {
    let valid = match out_sr {
        JsonValue::Number(n) => n.as_u64().is_some(),
        JsonValue::String(s) => s.parse::<u64>().is_ok(),
        JsonValue::Object(sr) => sr.contains_key("wkid") || sr.contains_key("wkt"),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_out_sr")
            .with_message("outSR must be a WKID or a spatial reference object".into()))
    }
}

fn validate_out_statistics(out_statistics: &JsonValue) -> Result<(), ValidationError> {
    let parsed;
    let value = match out_statistics {
        JsonValue::String(s) => {
            parsed = serde_json::from_str::<JsonValue>(s)
                .map_err(|_| ValidationError::new("invalid_out_statistics"))?;
            &parsed
        }
        other => other,
    };

    let definitions = value
        .as_array()
        .ok_or_else(|| ValidationError::new("invalid_out_statistics"))?;

    for definition in definitions {
        let statistic_type = definition
            .get("statisticType")
            .and_then(JsonValue::as_str)
            .map(str::to_ascii_lowercase);
        let on_field = definition.get("onStatisticField").and_then(JsonValue::as_str);

        match (statistic_type, on_field) {
            (Some(t), Some(_)) if STATISTIC_TYPES.contains(&t.as_str()) => {}
            _ => {
                return Err(ValidationError::new("invalid_out_statistics").with_message(
                    "each outStatistics entry needs a valid statisticType and onStatisticField"
                        .into(),
                ))
            }
        }
    }
    Ok(())
}
