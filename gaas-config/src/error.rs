//! Configuration errors.

use thiserror::Error;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for the schema.
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// File path, or `<string>`.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// An environment variable held an unusable value.
    #[error("environment variable {var}={value:?}: {message}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// What was wrong.
        message: String,
    },
    /// A value is outside its allowed range.
    #[error("invalid configuration value {field}: {message}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// What was wrong.
        message: &'static str,
    },
}
