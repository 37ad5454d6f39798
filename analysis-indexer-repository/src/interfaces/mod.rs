//! Backend abstraction for the analysis indexes.
//!
//! `SearchIndexProvider` is implemented by the OpenSearch provider and by the
//! in-memory doubles used in tests.

mod search_index_provider;

pub use search_index_provider::SearchIndexProvider;
