//! # Analysis Indexer Shared
//!
//! Data structures shared across the analysis indexer crates: the source
//! metadata read from study repositories, the two search document shapes,
//! indexing results and notifications.

pub mod types;

pub use types::commands::{
    AnalysisIdentifier, IndexAnalysisCommand, IndexAnalysisPayloadCommand, IndexRepositoryCommand,
    IndexStudyCommand, RemoveAnalysisCommand,
};
pub use types::documents::{
    AnalysisCentricDocument, AnalysisCentricFile, AnalysisLifecycle, ConflictingDocument,
    FileCentricAnalysis, FileCentricDocument, FileInfo, IndexDocument, IndexFile, IndexedDonor,
    IndexedSample, IndexedSpecimen, RepositoryRef,
};
pub use types::index_result::{merge_results, FailureData, IndexResult, IndexResults};
pub use types::metadata::{
    Analysis, AnalysisType, Donor, File, Properties, Sample, Specimen, StorageType,
    StudyRepository,
};
pub use types::notification::{IndexerNotification, NotificationCategory, NotificationName};
