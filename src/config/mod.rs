use std::collections::HashSet;
use std::fs;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::{Validate, ValidationError};

use crate::config_error;
use crate::core::FeatureServerResult;
use crate::provider::is_builtin_provider;

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_providers"))]
pub struct Config {
    #[serde(default)]
    pub log: Option<Log>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[validate(length(min = 1))]
    #[validate(nested)]
    pub providers: Vec<ProviderConfig>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> FeatureServerResult<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path)
            .map_err(|e| config_error!("Unable to read conf file from {}: {}", path, e))?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> FeatureServerResult<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str)
            .map_err(|e| config_error!("Unable to parse yaml conf: {}", e))?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()
            .map_err(|e| config_error!("Conf file validation failed: {}", e))?;

        Ok(conf)
    }

    pub fn to_yaml(&self) -> FeatureServerResult<String> {
        serde_yaml::to_string(self).map_err(|e| config_error!("Unable to dump conf: {}", e))
    }

    fn validate_providers(&self) -> Result<(), ValidationError> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(ValidationError::new("duplicate_provider_name")
                    .with_message(format!("provider '{}' is defined twice", provider.name).into()));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub path: String,
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on entries kept by the in-memory cache
    #[serde(default)]
    pub max_entries: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct ProviderConfig {
    /// Namespace the provider is registered under
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(rename = "type")]
    #[validate(custom(function = "validate_provider_type"))]
    pub kind: String,
    /// Default cache lifetime in seconds
    #[serde(default)]
    pub cache_ttl: Option<u64>,
    #[serde(default)]
    pub config: JsonValue,
}

fn validate_provider_type(kind: &str) -> Result<(), ValidationError> {
    if is_builtin_provider(kind) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_provider_type")
            .with_message(format!("unknown provider type '{kind}'").into()))
    }
}
