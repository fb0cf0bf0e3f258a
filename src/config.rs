use crate::schema::DEFAULT_MAX_FIELD_BYTES;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-owner import rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Imports allowed per window
    pub max_imports: u32,
    pub window_secs: u64,
}

/// Pipeline limits and knobs. Every field has a default, so a partial JSON file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Ceiling for the decoded upload text
    pub max_source_bytes: usize,
    /// Ceiling for one sanitized cell
    pub max_field_bytes: usize,
    /// Per-row persistence timeout
    pub row_timeout_ms: u64,
    /// Row writes in flight at once
    pub concurrency: usize,
    /// Write job counters back every N rows
    pub progress_every: usize,
    pub jobs_table: String,
    pub rate_limit: Option<RateLimitConfig>,
    pub validate_before_import: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: 10 * 1024 * 1024,
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
            row_timeout_ms: 10_000,
            concurrency: 1,
            progress_every: 1,
            jobs_table: "import_jobs".into(),
            rate_limit: None,
            validate_before_import: true,
        }
    }
}

impl ImportConfig {
    pub fn row_timeout(&self) -> Duration {
        Duration::from_millis(self.row_timeout_ms)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
