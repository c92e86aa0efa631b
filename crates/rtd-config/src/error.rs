//! Configuration error types.

use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A TOML config file failed to parse.
    #[error("failed to parse TOML config {path}: {source}")]
    TomlParseError {
        /// Path of the offending file.
        path: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A YAML config document failed to parse.
    #[error("failed to parse serverless config {path}: {source}")]
    YamlParseError {
        /// Path of the offending file.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A tunable failed post-parse validation.
    #[error("invalid value for {field}: {message}")]
    ValidationError {
        /// Name of the offending field.
        field: String,
        /// Human-readable explanation.
        message: String,
    },

    /// Two entries in the serverless config named the same package.
    #[error("duplicate package in serverless config: {0}")]
    DuplicatePackage(String),

    /// Two entries in the serverless config shared the same client_id.
    #[error("duplicate client_id in serverless config: {0}")]
    DuplicateClientId(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
