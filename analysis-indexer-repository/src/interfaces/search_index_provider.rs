//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, in-memory test doubles, etc.).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{RemovalSummary, UpsertDocumentRequest};

/// Abstracts the underlying search index implementation.
///
/// One provider targets one index (through its alias). Implementations are injected
/// into `SearchIndexService`, which adds partitioning, concurrency and retries on top.
///
/// # Merge semantics
///
/// `bulk_upsert` must merge repository references on the server side in a single
/// atomic conditional update per document. Reading the document first and writing
/// it back would lose updates when two partitions touch the same key concurrently.
///
/// # Index Initialization
///
/// Implementations should call `ensure_index_exists` during application startup to ensure
/// the search index and any aliases are properly configured before performing document operations.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Name of the index (alias) this provider writes to.
    fn index_name(&self) -> &str;

    /// Ensure the search index and any required aliases exist, creating them if necessary.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index is ready for use
    /// * `Err(SearchIndexError)` - If initialization fails
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError>;

    /// Apply a list of conditional upserts as one bulk request.
    ///
    /// Requests are applied in order. The call fails as a whole if any item fails,
    /// so callers can retry the list; every item is idempotent.
    ///
    /// # Arguments
    ///
    /// * `requests` - Upserts to apply, in order
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If every item was applied
    /// * `Err(SearchIndexError)` - If the request or any item failed
    async fn bulk_upsert(&self, requests: &[UpsertDocumentRequest]) -> Result<(), SearchIndexError>;

    /// Fetch the stored sources of the given document ids.
    ///
    /// Missing ids are skipped, so the result may be shorter than `ids`.
    async fn get_documents(&self, ids: &[String]) -> Result<Vec<Value>, SearchIndexError>;

    /// Delete documents by id. Ids that don't exist are ignored.
    async fn delete_documents(&self, ids: &[String]) -> Result<(), SearchIndexError>;

    /// Strip a repository reference from every document of an analysis, then delete
    /// the documents of that analysis left without any repository.
    ///
    /// # Arguments
    ///
    /// * `analysis_id` - The analysis whose documents are affected
    /// * `repository_code` - Code of the repository to remove
    async fn remove_repository(
        &self,
        analysis_id: &str,
        repository_code: &str,
    ) -> Result<RemovalSummary, SearchIndexError>;
}
