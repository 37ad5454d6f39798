//! Configuration and dependency wiring.

mod dependencies;

pub use dependencies::{ConnectionMode, Dependencies};

use std::env;
use std::str::FromStr;

/// Default number of studies indexed concurrently by a repository command.
const DEFAULT_MAX_CONCURRENT_STUDIES: usize = 2;

/// Tuning of the orchestrator itself.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Studies processed at once when indexing a whole repository.
    pub max_concurrent_studies: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_studies: DEFAULT_MAX_CONCURRENT_STUDIES,
        }
    }
}

impl IndexerConfig {
    /// Use a custom study concurrency. Zero is treated as one.
    pub fn with_max_concurrent_studies(mut self, max_concurrent_studies: usize) -> Self {
        self.max_concurrent_studies = max_concurrent_studies.max(1);
        self
    }
}

/// Read `key` from the environment, falling back to `default` when unset or unparsable.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Boolean flag from the environment (`true`/`false`, `1`/`0`, `yes`/`no`).
pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key).map(|v| v.trim().to_lowercase()) {
        Ok(v) if matches!(v.as_str(), "true" | "1" | "yes") => true,
        Ok(v) if matches!(v.as_str(), "false" | "0" | "no") => false,
        _ => default,
    }
}
