//! Request and response types for search index operations.

use analysis_indexer_shared::{AnalysisLifecycle, IndexDocument, RepositoryRef};
use serde_json::Value;

use crate::errors::SearchIndexError;

/// One conditional upsert against the search index.
///
/// If no document exists under `document_id` the full `document` is inserted.
/// Otherwise each entry of `repositories` is appended unless a repository with
/// the same code is already listed, and the analysis state and timestamps are
/// refreshed from `lifecycle`.
#[derive(Debug, Clone)]
pub struct UpsertDocumentRequest {
    /// Key of the document in the index.
    pub document_id: String,
    /// Analysis the document belongs to.
    pub analysis_id: String,
    /// The full document, used when inserting.
    pub document: Value,
    /// Repository references to merge into an existing document.
    pub repositories: Vec<RepositoryRef>,
    /// State and timestamps written on every upsert.
    pub lifecycle: AnalysisLifecycle,
}

impl UpsertDocumentRequest {
    /// Build the request for a typed document.
    pub fn from_document<D: IndexDocument>(document: &D) -> Result<Self, SearchIndexError> {
        let value = serde_json::to_value(document).map_err(|e| {
            SearchIndexError::serialization(format!(
                "Failed to serialize document {}: {}",
                document.document_id(),
                e
            ))
        })?;

        Ok(Self {
            document_id: document.document_id().to_string(),
            analysis_id: document.analysis_id().to_string(),
            document: value,
            repositories: document.repositories().to_vec(),
            lifecycle: document.lifecycle(),
        })
    }
}

/// Outcome of removing one repository from an analysis's documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    /// Documents that had the repository reference stripped.
    pub updated: u64,
    /// Documents deleted because no repository referenced them any more.
    pub deleted: u64,
}
