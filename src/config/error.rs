//! Config error type.

use thiserror::Error;

/// Errors raised while loading or validating the YAML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}
