//! OpenSearch implementation of the search index provider.
//!
//! One `OpenSearchProvider` serves one index, described by an `IndexConfig`.

mod index_config;
mod provider;

pub use index_config::{get_index_settings, get_versioned_index_name, DocumentKind, IndexConfig};
pub use provider::OpenSearchProvider;
