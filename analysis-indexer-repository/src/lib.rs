//! # Analysis Indexer Repository
//!
//! This crate provides the write path to the search indexes: the
//! `SearchIndexProvider` abstraction, its OpenSearch implementation, and the
//! partitioned, retrying bulk writer built on top of it.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod service;
pub mod types;

pub use config::SearchIndexServiceConfig;
pub use errors::SearchIndexError;
pub use interfaces::SearchIndexProvider;
pub use opensearch::OpenSearchProvider;
pub use service::{SearchIndexService, ANALYSIS_ID_LABEL};
pub use types::{RemovalSummary, UpsertDocumentRequest};
