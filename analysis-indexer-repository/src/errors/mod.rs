//! Error types for the analysis index repository.

mod search_index_error;

pub use search_index_error::{is_transient_status, SearchIndexError};
