//! Storage configuration types.

use serde::Deserialize;

/// SQLite database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path. `:memory:` keeps everything in memory.
    pub path: String,
    /// Pool size. Forced to 1 for in-memory databases.
    pub max_connections: u32,
    /// How long a writer waits on a locked database.
    pub busy_timeout_secs: u64,
    /// How long a request waits for a pooled connection.
    pub acquire_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/clientdesk.db".to_string(),
            max_connections: 5,
            busy_timeout_secs: 30,
            acquire_timeout_secs: 10,
        }
    }
}

impl StorageConfig {
    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}
