//! Tracing subscriber setup for the governance runtime.
//!
//! Library crates only emit `tracing` events; binaries call [`init`] once at
//! startup to install a formatter and filter.

#![warn(missing_docs, clippy::pedantic)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output layout of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, human oriented.
    #[default]
    Pretty,
    /// Single line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl LogFormat {
    /// Returns the configuration label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::UnknownFormat(other.to_owned())),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, e.g. `info,gaas_enforcement=debug`.
    pub filter: String,
    /// Output layout.
    pub format: LogFormat,
    /// Include the event target (module path).
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Pretty,
            with_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Parses the filter directives.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFilter`] when the directives do not parse.
    pub fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_new(&self.filter).map_err(|err| TelemetryError::InvalidFilter {
            filter: self.filter.clone(),
            reason: err.to_string(),
        })
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Filter directives did not parse.
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter {
        /// Offending directives.
        filter: String,
        /// Parser message.
        reason: String,
    },
    /// Format label was not recognised.
    #[error("unknown log format `{0}` (expected pretty, compact or json)")]
    UnknownFormat(String),
    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or a subscriber is
/// already installed.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| TelemetryError::AlreadyInstalled(err.to_string()))?;
    tracing::debug!(filter = %config.filter, format = %config.format, "telemetry initialised");
    Ok(())
}
