//! Bulk index writer.
//!
//! `SearchIndexService` is what application code uses to write typed documents.
//! It splits a batch into order-preserving partitions, writes them concurrently
//! with a bounded number in flight, retries transient failures, and reports the
//! ids of partitions that never made it as an [`IndexResult`] instead of failing
//! the whole batch.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use analysis_indexer_shared::{FailureData, IndexDocument, IndexResult};
use futures::stream::{self, StreamExt};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{debug, error, instrument, warn};

use crate::config::SearchIndexServiceConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::{RemovalSummary, UpsertDocumentRequest};

/// Label under which the analysis ids of failed documents are reported.
pub const ANALYSIS_ID_LABEL: &str = "analysisId";

/// The main service for writing documents of one shape to one index.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use analysis_indexer_repository::SearchIndexService;
/// use analysis_indexer_repository::opensearch::{DocumentKind, IndexConfig, OpenSearchProvider};
/// use analysis_indexer_shared::FileCentricDocument;
///
/// # async fn example(documents: Vec<FileCentricDocument>) -> Result<(), Box<dyn std::error::Error>> {
/// let config = IndexConfig::new("file_centric", 1, DocumentKind::FileCentric);
/// let provider = Arc::new(OpenSearchProvider::new("http://localhost:9200", config).await?);
/// let service: SearchIndexService<FileCentricDocument> = SearchIndexService::new(provider);
///
/// let result = service.upsert(&documents).await;
/// assert!(result.successful);
/// # Ok(())
/// # }
/// ```
pub struct SearchIndexService<D> {
    provider: Arc<dyn SearchIndexProvider>,
    config: SearchIndexServiceConfig,
    _document: PhantomData<fn() -> D>,
}

impl<D: IndexDocument> SearchIndexService<D> {
    /// Create a new SearchIndexService with default configuration.
    pub fn new(provider: Arc<dyn SearchIndexProvider>) -> Self {
        Self::with_config(provider, SearchIndexServiceConfig::default())
    }

    /// Create a new SearchIndexService with custom configuration.
    pub fn with_config(
        provider: Arc<dyn SearchIndexProvider>,
        config: SearchIndexServiceConfig,
    ) -> Self {
        Self {
            provider,
            config,
            _document: PhantomData,
        }
    }

    /// Name of the index this service writes to.
    pub fn index_name(&self) -> &str {
        self.provider.index_name()
    }

    pub fn config(&self) -> &SearchIndexServiceConfig {
        &self.config
    }

    /// Create the index and alias if missing. Not retried here.
    pub async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        self.provider.ensure_index_exists().await
    }

    /// Run `action`, retrying transient errors with a fixed delay.
    async fn with_retry<T, F, Fut>(&self, operation: &str, action: F) -> Result<T, SearchIndexError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SearchIndexError>>,
    {
        let strategy = FixedInterval::new(self.config.retry_wait)
            .take(self.config.max_attempts.saturating_sub(1));

        RetryIf::spawn(strategy, action, |e: &SearchIndexError| {
            let transient = e.is_transient();
            if transient {
                warn!(
                    index = %self.index_name(),
                    operation,
                    error = %e,
                    "Transient search index failure"
                );
            }
            transient
        })
        .await
    }

    /// Upsert a batch of documents.
    ///
    /// Documents are split into chunks of `partition_size`, in input order. Each
    /// chunk is one bulk request, applied in order by the backend. Chunks run
    /// concurrently, at most `max_concurrent_partitions` at a time. A chunk that
    /// still fails after its retries has its document and analysis ids recorded
    /// in the returned failure data; the other chunks are unaffected.
    #[instrument(skip(self, documents), fields(index = %self.index_name(), count = documents.len()))]
    pub async fn upsert(&self, documents: &[D]) -> IndexResult {
        let mut failure_data = FailureData::new();
        let mut requests = Vec::with_capacity(documents.len());

        for document in documents {
            match UpsertDocumentRequest::from_document(document) {
                Ok(request) => requests.push(request),
                Err(e) => {
                    error!(document_id = %document.document_id(), error = %e, "Skipping document");
                    failure_data.add_failure(ANALYSIS_ID_LABEL, document.analysis_id());
                    failure_data.add_failure(D::ID_LABEL, document.document_id());
                }
            }
        }

        let provider = self.provider.as_ref();
        let outcomes: Vec<(usize, &[UpsertDocumentRequest], Result<(), SearchIndexError>)> =
            stream::iter(requests.chunks(self.config.partition_size.max(1)).enumerate())
                .map(|(index, partition)| async move {
                    let result = self
                        .with_retry("bulk_upsert", move || provider.bulk_upsert(partition))
                        .await;
                    (index, partition, result)
                })
                .buffer_unordered(self.config.max_concurrent_partitions.max(1))
                .collect()
                .await;

        let partition_count = outcomes.len();
        for (index, partition, result) in outcomes {
            match result {
                Ok(()) => debug!(partition = index, size = partition.len(), "Partition written"),
                Err(e) => {
                    error!(
                        partition = index,
                        size = partition.len(),
                        error = %e,
                        "Partition failed after retries"
                    );
                    failure_data.add_failures(
                        ANALYSIS_ID_LABEL,
                        partition.iter().map(|r| r.analysis_id.clone()),
                    );
                    failure_data
                        .add_failures(D::ID_LABEL, partition.iter().map(|r| r.document_id.clone()));
                }
            }
        }

        debug!(partitions = partition_count, "Bulk upsert finished");
        if failure_data.is_empty() {
            IndexResult::success(self.index_name())
        } else {
            IndexResult::failure(self.index_name(), failure_data)
        }
    }

    /// Fetch the currently indexed documents for the given ids, keyed by id.
    pub async fn fetch_existing(&self, ids: &[String]) -> Result<HashMap<String, D>, SearchIndexError> {
        let provider = self.provider.as_ref();
        let mut existing = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(self.config.partition_size.max(1)) {
            let sources = self
                .with_retry("get_documents", move || provider.get_documents(chunk))
                .await?;
            for source in sources {
                let document: D = serde_json::from_value(source).map_err(|e| {
                    SearchIndexError::parse(format!("Unreadable indexed document: {}", e))
                })?;
                existing.insert(document.document_id().to_string(), document);
            }
        }

        Ok(existing)
    }

    /// Delete documents by id.
    pub async fn delete(&self, ids: &[String]) -> Result<(), SearchIndexError> {
        let provider = self.provider.as_ref();
        for chunk in ids.chunks(self.config.partition_size.max(1)) {
            self.with_retry("delete_documents", move || provider.delete_documents(chunk))
                .await?;
        }
        Ok(())
    }

    /// Remove a repository from the documents of an analysis, deleting the ones
    /// it was the last repository of.
    pub async fn remove_repository(
        &self,
        analysis_id: &str,
        repository_code: &str,
    ) -> Result<RemovalSummary, SearchIndexError> {
        let provider = self.provider.as_ref();
        self.with_retry("remove_repository", move || {
            provider.remove_repository(analysis_id, repository_code)
        })
        .await
    }
}
