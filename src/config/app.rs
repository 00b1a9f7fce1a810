//! Top-level application settings.

use serde::Deserialize;

/// Identity and logging settings for the running process.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Name reported in startup logs.
    pub name: String,
    /// Deployment environment; credentials are only required outside
    /// "development".
    pub env: String,
    /// Log level filter, "trace" through "error". Defaults to "info".
    pub log_level: Option<String>,
}
