//! Error types for the analysis indexer.

use analysis_indexer_repository::SearchIndexError;
use thiserror::Error;

use crate::metadata::MetadataError;

/// Errors raised while indexing one entity or running one command.
#[derive(Error, Debug, Clone)]
pub enum IndexerError {
    /// Requested study, analysis or repository does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Source metadata is structurally invalid (e.g. a sample without a donor).
    #[error("Bad data: {0}")]
    BadData(String),

    /// Transient failure talking to the metadata service.
    #[error("Upstream service error: {0}")]
    UpstreamService(String),

    /// Failure reported by the search index.
    #[error("Search index error: {0}")]
    SearchIndex(#[from] SearchIndexError),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Anything else, wrapped with context.
    #[error("Unhandled error: {0}")]
    Unhandled(String),
}

impl IndexerError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a bad data error.
    pub fn bad_data(msg: impl Into<String>) -> Self {
        Self::BadData(msg.into())
    }

    /// Create an upstream service error.
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamService(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unhandled error.
    pub fn unhandled(msg: impl Into<String>) -> Self {
        Self::Unhandled(msg.into())
    }
}

impl From<MetadataError> for IndexerError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(msg) => Self::NotFound(msg),
            MetadataError::Decode(msg) => Self::BadData(msg),
            other => Self::upstream(other.to_string()),
        }
    }
}
