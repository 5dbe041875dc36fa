//! Configuration error taxonomy. Everything here is fatal before I/O.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed reading config file {path}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid YAML or does not fit the model.
    #[error("failed parsing config file")]
    Parse {
        /// Underlying YAML failure.
        #[source]
        source: serde_yaml::Error,
    },
    /// A field value is invalid.
    #[error("invalid config field {section}.{field}: {reason}")]
    InvalidField {
        /// Section the field lives in.
        section: String,
        /// Field name.
        field: String,
        /// Human-readable reason.
        reason: String,
    },
    /// No client with the requested name is configured.
    #[error("no client configuration found for `{name}`")]
    UnknownClient {
        /// Requested client name.
        name: String,
    },
    /// The requested client is disabled.
    #[error("client `{name}` is disabled")]
    ClientDisabled {
        /// Requested client name.
        name: String,
    },
    /// No filter with the requested name is configured.
    #[error("no filter configuration found for `{name}`")]
    UnknownFilter {
        /// Requested filter name.
        name: String,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
