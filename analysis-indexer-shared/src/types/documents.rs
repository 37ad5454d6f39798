//! Search document types.
//!
//! Two document shapes are indexed: one per file (keyed by object id) and one
//! per analysis (keyed by analysis id). Both carry the merged donor tree and
//! the list of repositories the entity can be fetched from.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::metadata::{Properties, StudyRepository};

/// Reference to a repository hosting the indexed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub code: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub storage_type: String,
    pub country: String,
    pub url: String,
    pub data_path: String,
    pub metadata_path: String,
}

impl RepositoryRef {
    /// Build a reference from a configured repository with a resolved metadata path.
    pub fn new(repository: &StudyRepository, metadata_path: impl Into<String>) -> Self {
        Self {
            code: repository.code.clone(),
            organization: repository.organization.clone(),
            name: repository.name.clone(),
            storage_type: repository.storage_type.as_str().to_string(),
            country: repository.country.clone(),
            url: repository.base_url.clone(),
            data_path: repository.data_path.clone(),
            metadata_path: metadata_path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDonor {
    pub donor_id: String,
    pub submitter_donor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub specimens: Vec<IndexedSpecimen>,
    #[serde(default)]
    pub info: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSpecimen {
    pub specimen_id: String,
    pub submitter_specimen_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specimen_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specimen_tissue_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tumour_normal_designation: Option<String>,
    pub samples: Vec<IndexedSample>,
    #[serde(default)]
    pub info: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSample {
    pub sample_id: String,
    pub submitter_sample_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_normal_submitter_sample_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_type: Option<String>,
    #[serde(default)]
    pub info: Properties,
}

/// Analysis state and timestamps, refreshed on every upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisLifecycle {
    pub state: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub first_published_at: Option<DateTime<Utc>>,
}

/// One side of a detected conflict: ids plus the repositories reporting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingDocument {
    pub id: String,
    pub analysis_id: String,
    pub study_id: String,
    pub repo_codes: Vec<String>,
}

/// Behaviour shared by both document shapes.
pub trait IndexDocument:
    Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static
{
    /// Label under which failing document ids are reported.
    const ID_LABEL: &'static str;

    fn document_id(&self) -> &str;

    fn analysis_id(&self) -> &str;

    fn study_id(&self) -> &str;

    fn repositories(&self) -> &[RepositoryRef];

    fn repositories_mut(&mut self) -> &mut Vec<RepositoryRef>;

    fn lifecycle(&self) -> AnalysisLifecycle;

    /// Whether `other` describes the same logical entity, as mirrored by
    /// another repository. Repositories and analysis state are ignored.
    fn is_valid_replica(&self, other: &Self) -> bool;

    fn has_repository(&self, code: &str) -> bool {
        self.repositories().iter().any(|r| r.code == code)
    }

    /// Document equality when the repository lists are left out.
    fn matches_ignoring_repositories(&self, other: &Self) -> bool {
        let mut left = self.clone();
        left.repositories_mut().clear();
        let mut right = other.clone();
        right.repositories_mut().clear();
        left == right
    }

    fn conflict_descriptor(&self) -> ConflictingDocument {
        ConflictingDocument {
            id: self.document_id().to_string(),
            analysis_id: self.analysis_id().to_string(),
            study_id: self.study_id().to_string(),
            repo_codes: self.repositories().iter().map(|r| r.code.clone()).collect(),
        }
    }
}

/// Analysis summary embedded in a file-centric document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCentricAnalysis {
    pub analysis_id: String,
    pub analysis_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_version: Option<i64>,
    pub analysis_state: String,
    pub study_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Properties>,
    #[serde(flatten)]
    pub data: Properties,
}

/// Companion index file (BAI, TBI, ...) attached to its primary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFile {
    pub object_id: String,
    pub name: String,
    pub file_type: String,
    pub md5sum: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub md5sum: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_file: Option<IndexFile>,
    #[serde(default)]
    pub info: Properties,
}

/// Document describing one data file of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCentricDocument {
    pub object_id: String,
    pub study_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub file_type: String,
    pub file_access: String,
    pub analysis: FileCentricAnalysis,
    pub file: FileInfo,
    pub repositories: Vec<RepositoryRef>,
    pub donors: Vec<IndexedDonor>,
}

impl IndexDocument for FileCentricDocument {
    const ID_LABEL: &'static str = "objectId";

    fn document_id(&self) -> &str {
        &self.object_id
    }

    fn analysis_id(&self) -> &str {
        &self.analysis.analysis_id
    }

    fn study_id(&self) -> &str {
        &self.study_id
    }

    fn repositories(&self) -> &[RepositoryRef] {
        &self.repositories
    }

    fn repositories_mut(&mut self) -> &mut Vec<RepositoryRef> {
        &mut self.repositories
    }

    fn lifecycle(&self) -> AnalysisLifecycle {
        AnalysisLifecycle {
            state: self.analysis.analysis_state.clone(),
            published_at: self.analysis.published_at,
            updated_at: self.analysis.updated_at,
            first_published_at: self.analysis.first_published_at,
        }
    }

    fn is_valid_replica(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        self.object_id == other.object_id
            && self.study_id == other.study_id
            && self.data_type == other.data_type
            && self.file_type == other.file_type
            && self.file_access == other.file_access
            && self.donors == other.donors
            && self.analysis.analysis_id == other.analysis.analysis_id
            && self.analysis.analysis_type == other.analysis.analysis_type
            && self.file == other.file
    }
}

/// File entry embedded in an analysis-centric document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCentricFile {
    pub object_id: String,
    pub name: String,
    pub size: u64,
    pub file_type: String,
    pub md5sum: String,
    pub file_access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub info: Properties,
}

/// Document describing one analysis with all of its files and donors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCentricDocument {
    pub analysis_id: String,
    pub analysis_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_version: Option<i64>,
    pub analysis_state: String,
    pub study_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_published_at: Option<DateTime<Utc>>,
    pub donors: Vec<IndexedDonor>,
    pub files: Vec<AnalysisCentricFile>,
    pub repositories: Vec<RepositoryRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Properties>,
    #[serde(flatten)]
    pub data: Properties,
}

impl IndexDocument for AnalysisCentricDocument {
    const ID_LABEL: &'static str = "analysisId";

    fn document_id(&self) -> &str {
        &self.analysis_id
    }

    fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    fn study_id(&self) -> &str {
        &self.study_id
    }

    fn repositories(&self) -> &[RepositoryRef] {
        &self.repositories
    }

    fn repositories_mut(&mut self) -> &mut Vec<RepositoryRef> {
        &mut self.repositories
    }

    fn lifecycle(&self) -> AnalysisLifecycle {
        AnalysisLifecycle {
            state: self.analysis_state.clone(),
            published_at: self.published_at,
            updated_at: self.updated_at,
            first_published_at: self.first_published_at,
        }
    }

    fn is_valid_replica(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        self.analysis_id == other.analysis_id
            && self.study_id == other.study_id
            && self.analysis_type == other.analysis_type
            && self.analysis_version == other.analysis_version
            && self.donors == other.donors
            && self.files == other.files
    }
}
