//! Paging limits for list endpoints.

use serde::Deserialize;

/// Page size used when the request names none.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Largest page a client may request; larger values are clamped.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl LimitsConfig {
    /// Resolve a requested page size: absent means default, oversize is clamped.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}
