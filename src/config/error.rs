//! Configuration Error Types
//!
//! Errors raised while loading, merging and validating [`super::FleetConfig`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration sources could not be read or merged
    #[error("Failed to load configuration from '{source_name}': {error}")]
    LoadError { source_name: String, error: String },

    /// A value could not be deserialized into the expected type
    #[error("Failed to deserialize configuration: {0}")]
    DeserializationError(String),

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::Type { .. } | config::ConfigError::Message(_) => {
                Self::DeserializationError(err.to_string())
            }
            other => Self::LoadError {
                source_name: "configuration sources".to_string(),
                error: other.to_string(),
            },
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
