//! Document converter.
//!
//! Pure functions turning a source [`Analysis`] fetched from a repository into
//! the search documents of one shape. No I/O happens here; malformed input
//! fails fast with [`IndexerError::BadData`].

mod analysis_centric;
mod donors;
mod file_centric;

pub use donors::merge_donors;

use analysis_indexer_shared::{Analysis, IndexDocument, NotificationName, StudyRepository};

use crate::errors::IndexerError;

/// A document shape that can be built from a source analysis.
pub trait DocumentConverter: IndexDocument {
    /// Notification emitted when conversion of an analysis fails.
    const CONVERSION_FAILED: NotificationName;

    /// Build the documents describing `analysis` as hosted by `repository`.
    fn convert(analysis: &Analysis, repository: &StudyRepository)
        -> Result<Vec<Self>, IndexerError>;
}
