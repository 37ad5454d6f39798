//! Dependency initialization and wiring for the analysis indexer.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use analysis_indexer_repository::opensearch::{DocumentKind, IndexConfig};
use analysis_indexer_repository::{
    OpenSearchProvider, SearchIndexProvider, SearchIndexService, SearchIndexServiceConfig,
};
use analysis_indexer_shared::IndexDocument;
use tokio::time::sleep;
use tokio_retry::Retry;
use tracing::{error, info, warn};

use super::{env_flag, env_or, IndexerConfig};
use crate::errors::IndexerError;
use crate::metadata::{SongClientConfig, SongMetadataClient};
use crate::notifier::Notifier;
use crate::orchestrator::Indexer;
use crate::registry::StaticRepositoryRegistry;
use crate::rules::{ExclusionRuleSource, JsonFileRuleSource};

const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;
const DEFAULT_REPOSITORIES_PATH: &str = "repositories.json";

const DEFAULT_FILE_CENTRIC_ALIAS: &str = "file_centric";
const DEFAULT_ANALYSIS_CENTRIC_ALIAS: &str = "analysis_centric";
const DEFAULT_INDEX_VERSION: u32 = 1;

/// Index bootstrap: attempts, first delay and growth factor.
const BOOTSTRAP_ATTEMPTS: usize = 5;
const BOOTSTRAP_INITIAL_DELAY: Duration = Duration::from_secs(1);
const BOOTSTRAP_BACKOFF_FACTOR: f64 = 1.5;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Give up on the first failed connection.
    FailFast,
    /// Keep trying every `OPENSEARCH_RETRY_INTERVAL_SECS`.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry", case-insensitive. Anything else is "retry".
    fn from_env() -> Self {
        match env::var("OPENSEARCH_CONNECTION_MODE")
            .unwrap_or_else(|_| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The indexer, ready to run commands.
    pub indexer: Indexer,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: seconds between connection attempts (default: 15)
    /// - `FILE_CENTRIC_ENABLED` / `ANALYSIS_CENTRIC_ENABLED`: document kinds to index (default: both)
    /// - `FILE_CENTRIC_ALIAS`, `FILE_CENTRIC_INDEX_VERSION`: file-centric index (default: file_centric, 1)
    /// - `ANALYSIS_CENTRIC_ALIAS`, `ANALYSIS_CENTRIC_INDEX_VERSION`: analysis-centric index (default: analysis_centric, 1)
    /// - `MAX_DOCS_PER_BULK_REQUEST`, `MAX_CONCURRENT_PARTITIONS`: bulk write partitioning (default: 5000, 4)
    /// - `INDEX_RETRY_MAX_ATTEMPTS`, `INDEX_RETRY_WAIT_MILLIS`: per-partition retries (default: 3, 100)
    /// - `MAX_CONCURRENT_STUDIES`: studies indexed at once per repository (default: 2)
    /// - `REPOSITORIES_PATH`: repository registry file (default: repositories.json)
    /// - `EXCLUSION_RULES_PATH`: optional exclusion rules file
    /// - `SONG_PAGE_LIMIT`, `SONG_MAX_RETRIES`: metadata paging and retries (default: 25, 3)
    /// - `SONG_TIMEOUT_SECS`, `SONG_ANALYSIS_TIMEOUT_SECS`: metadata call timeouts (default: 60, 5)
    /// - `INDEXABLE_ANALYSIS_STATES`: comma separated states to index (default: PUBLISHED)
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexerError)` - If a configuration file is unreadable, or OpenSearch is
    ///   unreachable in fail-fast mode
    pub async fn new() -> Result<Self, IndexerError> {
        let opensearch_url =
            env::var("OPENSEARCH_URL").unwrap_or_else(|_| DEFAULT_OPENSEARCH_URL.to_string());
        let connection_mode = ConnectionMode::from_env();
        let retry_interval = Duration::from_secs(env_or(
            "OPENSEARCH_RETRY_INTERVAL_SECS",
            DEFAULT_RETRY_INTERVAL_SECS,
        ));
        let repositories_path = PathBuf::from(
            env::var("REPOSITORIES_PATH").unwrap_or_else(|_| DEFAULT_REPOSITORIES_PATH.to_string()),
        );
        let rules_path = env::var("EXCLUSION_RULES_PATH").ok().map(PathBuf::from);

        info!(
            opensearch_url = %opensearch_url,
            connection_mode = ?connection_mode,
            retry_interval_secs = retry_interval.as_secs(),
            repositories_path = %repositories_path.display(),
            "Initializing dependencies"
        );

        let registry = StaticRepositoryRegistry::from_file(&repositories_path).await?;
        let rules = JsonFileRuleSource::new(rules_path).get_rules().await?;

        let defaults = SongClientConfig::default();
        let song_config = SongClientConfig {
            page_limit: env_or("SONG_PAGE_LIMIT", defaults.page_limit).max(1),
            max_retries: env_or("SONG_MAX_RETRIES", defaults.max_retries),
            study_timeout: Duration::from_secs(env_or(
                "SONG_TIMEOUT_SECS",
                defaults.study_timeout.as_secs(),
            )),
            analysis_timeout: Duration::from_secs(env_or(
                "SONG_ANALYSIS_TIMEOUT_SECS",
                defaults.analysis_timeout.as_secs(),
            )),
            indexable_states: defaults.indexable_states,
        }
        .with_indexable_states(
            &env::var("INDEXABLE_ANALYSIS_STATES").unwrap_or_else(|_| "PUBLISHED".to_string()),
        );
        let metadata = SongMetadataClient::new(song_config);

        let service_defaults = SearchIndexServiceConfig::default();
        let service_config = SearchIndexServiceConfig::default()
            .with_partition_size(env_or(
                "MAX_DOCS_PER_BULK_REQUEST",
                service_defaults.partition_size,
            ))
            .with_max_concurrent_partitions(env_or(
                "MAX_CONCURRENT_PARTITIONS",
                service_defaults.max_concurrent_partitions,
            ))
            .with_retry(
                env_or("INDEX_RETRY_MAX_ATTEMPTS", service_defaults.max_attempts),
                Duration::from_millis(env_or(
                    "INDEX_RETRY_WAIT_MILLIS",
                    service_defaults.retry_wait.as_millis() as u64,
                )),
            );

        let indexer_config = IndexerConfig::default().with_max_concurrent_studies(env_or(
            "MAX_CONCURRENT_STUDIES",
            IndexerConfig::default().max_concurrent_studies,
        ));

        let mut indexer = Indexer::new(Arc::new(metadata), Arc::new(registry), Notifier::logging())
            .with_rules(rules)
            .with_config(indexer_config);

        if env_flag("FILE_CENTRIC_ENABLED", true) {
            let index_config = IndexConfig::new(
                env::var("FILE_CENTRIC_ALIAS")
                    .unwrap_or_else(|_| DEFAULT_FILE_CENTRIC_ALIAS.to_string()),
                env_or("FILE_CENTRIC_INDEX_VERSION", DEFAULT_INDEX_VERSION),
                DocumentKind::FileCentric,
            );
            let service = Self::index_service(
                &opensearch_url,
                index_config,
                connection_mode,
                retry_interval,
                service_config.clone(),
            )
            .await?;
            indexer = indexer.with_file_centric(service);
        }

        if env_flag("ANALYSIS_CENTRIC_ENABLED", true) {
            let index_config = IndexConfig::new(
                env::var("ANALYSIS_CENTRIC_ALIAS")
                    .unwrap_or_else(|_| DEFAULT_ANALYSIS_CENTRIC_ALIAS.to_string()),
                env_or("ANALYSIS_CENTRIC_INDEX_VERSION", DEFAULT_INDEX_VERSION),
                DocumentKind::AnalysisCentric,
            );
            let service = Self::index_service(
                &opensearch_url,
                index_config,
                connection_mode,
                retry_interval,
                service_config,
            )
            .await?;
            indexer = indexer.with_analysis_centric(service);
        }

        Ok(Self { indexer })
    }

    /// Connect, bootstrap the index and wrap the provider in a bulk writer.
    async fn index_service<D: IndexDocument>(
        url: &str,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
        service_config: SearchIndexServiceConfig,
    ) -> Result<SearchIndexService<D>, IndexerError> {
        let provider: Arc<dyn SearchIndexProvider> =
            Arc::new(Self::connect_to_opensearch(url, index_config, mode, retry_interval).await?);

        Self::bootstrap_index(provider.as_ref()).await;

        Ok(SearchIndexService::with_config(provider, service_config))
    }

    /// Create the index and alias if missing, with exponential backoff.
    /// Exhausting the attempts is logged, not fatal.
    async fn bootstrap_index(provider: &dyn SearchIndexProvider) {
        let strategy = std::iter::successors(Some(BOOTSTRAP_INITIAL_DELAY), |delay| {
            Some(delay.mul_f64(BOOTSTRAP_BACKOFF_FACTOR))
        })
        .take(BOOTSTRAP_ATTEMPTS - 1);

        match Retry::spawn(strategy, || provider.ensure_index_exists()).await {
            Ok(()) => info!(index = %provider.index_name(), "Index ready"),
            Err(e) => error!(
                index = %provider.index_name(),
                error = %e,
                "Failed to ensure index exists, continuing without bootstrap"
            ),
        }
    }

    /// Connect to OpenSearch, retrying or not depending on the connection mode.
    async fn connect_to_opensearch(
        url: &str,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexerError> {
        loop {
            match OpenSearchProvider::new(url, index_config.clone()).await {
                Ok(provider) => {
                    info!(index = %index_config.alias, "OpenSearch connection established");
                    return Ok(provider);
                }
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexerError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }
}
