//! Config loading errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read
    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single config file is not valid YAML
    #[error("config file {path} is not valid YAML: {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The merged base and tag overlay do not fit the config schema
    #[error("config in {dir} (tag {tag}) does not match the schema: {source}")]
    Schema {
        dir: PathBuf,
        tag: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A `HOPS_*` environment override could not be parsed
    #[error("environment override {var}={value:?} rejected: {reason}")]
    EnvOverride {
        var: String,
        value: String,
        reason: String,
    },
}
