//! Storage configuration.

use serde::Deserialize;

/// Persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub path: Option<String>,
    /// Maximum number of connections in the pool.
    pub max_connections: Option<u32>,
}
