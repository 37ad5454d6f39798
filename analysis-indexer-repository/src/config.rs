//! Configuration types for the SearchIndexService.

use std::time::Duration;

/// Configuration for the SearchIndexService.
///
/// Controls how document batches are split into bulk requests, how many of
/// those run at once, and how failed requests are retried.
#[derive(Debug, Clone)]
pub struct SearchIndexServiceConfig {
    /// Maximum number of documents per bulk request.
    pub partition_size: usize,
    /// Number of partitions written concurrently.
    pub max_concurrent_partitions: usize,
    /// Attempts per partition, the first one included.
    pub max_attempts: usize,
    /// Wait between two attempts of the same partition.
    pub retry_wait: Duration,
}

impl Default for SearchIndexServiceConfig {
    fn default() -> Self {
        Self {
            partition_size: 5000,
            max_concurrent_partitions: 4,
            max_attempts: 3,
            retry_wait: Duration::from_millis(100),
        }
    }
}

impl SearchIndexServiceConfig {
    /// Use a custom partition size. Zero is treated as one.
    pub fn with_partition_size(mut self, partition_size: usize) -> Self {
        self.partition_size = partition_size.max(1);
        self
    }

    /// Use a custom write concurrency. Zero is treated as one.
    pub fn with_max_concurrent_partitions(mut self, max_concurrent_partitions: usize) -> Self {
        self.max_concurrent_partitions = max_concurrent_partitions.max(1);
        self
    }

    /// Use a custom retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Attempts per partition including the first (at least one)
    /// * `retry_wait` - Fixed delay between attempts
    pub fn with_retry(mut self, max_attempts: usize, retry_wait: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_wait = retry_wait;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_are_clamped() {
        let config = SearchIndexServiceConfig::default()
            .with_partition_size(0)
            .with_max_concurrent_partitions(0)
            .with_retry(0, Duration::ZERO);

        assert_eq!(config.partition_size, 1);
        assert_eq!(config.max_concurrent_partitions, 1);
        assert_eq!(config.max_attempts, 1);
    }
}
