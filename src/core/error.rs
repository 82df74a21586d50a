//! Unified error handling for featureserver
//!
//! Every layer reports failures through [`FeatureServerError`]. Cache failures
//! are the one class the fetch lifecycle absorbs locally; everything else
//! propagates to the caller.

use std::fmt;

/// Boxed cause carried by provider-side failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error types for the feature server
#[derive(Debug)]
pub enum FeatureServerError {
    /// A query parameter was rejected before any work started
    Validation { parameter: String, message: String },

    /// An optional provider capability was requested but never registered
    CapabilityNotImplemented {
        provider: String,
        capability: &'static str,
    },

    /// Provider or hook failure, original cause preserved
    ProviderFetch(BoxError),

    /// Cache backend failures
    Cache(String),

    /// Configuration-related errors
    Configuration(String),

    /// File and I/O errors
    Io(std::io::Error),

    /// JSON encoding and decoding errors
    Serialization(serde_json::Error),

    /// Resource not found errors
    NotFound(String),

    /// Internal system errors
    Internal(String),
}

impl FeatureServerError {
    /// Wrap any error raised by a provider or one of its hooks.
    pub fn provider<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        FeatureServerError::ProviderFetch(err.into())
    }

    pub fn validation(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        FeatureServerError::Validation {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    pub fn not_implemented(provider: impl Into<String>, capability: &'static str) -> Self {
        FeatureServerError::CapabilityNotImplemented {
            provider: provider.into(),
            capability,
        }
    }
}

impl fmt::Display for FeatureServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureServerError::Validation { parameter, message } => {
                write!(f, "Invalid query parameter '{parameter}': {message}")
            }
            FeatureServerError::CapabilityNotImplemented {
                provider,
                capability,
            } => write!(
                f,
                "{capability}() method is not implemented in the {provider} provider"
            ),
            FeatureServerError::ProviderFetch(err) => write!(f, "Provider fetch failed: {err}"),
            FeatureServerError::Cache(msg) => write!(f, "Cache error: {msg}"),
            FeatureServerError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            FeatureServerError::Io(err) => write!(f, "I/O error: {err}"),
            FeatureServerError::Serialization(err) => write!(f, "Serialization error: {err}"),
            FeatureServerError::NotFound(msg) => write!(f, "Resource not found: {msg}"),
            FeatureServerError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for FeatureServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeatureServerError::ProviderFetch(err) => Some(err.as_ref()),
            FeatureServerError::Io(err) => Some(err),
            FeatureServerError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

// Error conversions
impl From<std::io::Error> for FeatureServerError {
    fn from(err: std::io::Error) -> Self {
        FeatureServerError::Io(err)
    }
}

impl From<serde_json::Error> for FeatureServerError {
    fn from(err: serde_json::Error) -> Self {
        FeatureServerError::Serialization(err)
    }
}

/// Result type alias for feature server operations
pub type FeatureServerResult<T> = std::result::Result<T, FeatureServerError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> FeatureServerResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> FeatureServerResult<T> {
        self.map_err(|e| FeatureServerError::Internal(format!("{context}: {e}")))
    }
}

/// Convenience macros for error creation
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::FeatureServerError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::FeatureServerError::Configuration(format!($fmt, $($arg)*))
    };
}
