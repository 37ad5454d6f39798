//! Study metadata source.
//!
//! The indexer never talks HTTP directly. It asks a [`StudyMetadataSource`]
//! for analyses and studies, which lets tests feed it canned metadata.

mod song;

pub use song::{SongClientConfig, SongMetadataClient};

use analysis_indexer_shared::Analysis;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    /// Study or analysis does not exist, or the analysis is not in an indexable state.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Network failure or an unexpected response status.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The response body is not the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl MetadataError {
    /// Whether retrying the call may help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Upstream(_))
    }
}

/// One page of a study's analyses.
///
/// Entries are decoded one by one, so a malformed analysis only rejects
/// itself and not the rest of the page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawAnalysisPage")]
pub struct AnalysisPage {
    pub analyses: Vec<Analysis>,
    pub rejected: Vec<RejectedAnalysis>,
    pub total_analyses: Option<u64>,
}

/// A page entry that is not a valid analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedAnalysis {
    /// The raw `analysisId`, when the entry has one.
    pub analysis_id: Option<String>,
    pub error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysisPage {
    #[serde(default)]
    analyses: Vec<Value>,
    #[serde(default)]
    total_analyses: Option<u64>,
}

impl From<RawAnalysisPage> for AnalysisPage {
    fn from(raw: RawAnalysisPage) -> Self {
        Self::from_entries(raw.analyses, raw.total_analyses)
    }
}

impl AnalysisPage {
    /// Decode raw page entries, setting aside the ones that are not analyses.
    pub fn from_entries(entries: Vec<Value>, total_analyses: Option<u64>) -> Self {
        let mut analyses = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();

        for entry in entries {
            let analysis_id = entry
                .get("analysisId")
                .and_then(Value::as_str)
                .map(str::to_string);
            match serde_json::from_value::<Analysis>(entry) {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => rejected.push(RejectedAnalysis {
                    analysis_id,
                    error: e.to_string(),
                }),
            }
        }

        Self {
            analyses,
            rejected,
            total_analyses,
        }
    }

    /// Number of entries on the page, valid or not.
    pub fn len(&self) -> usize {
        self.analyses.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every analysis of a study, plus the entries that failed to decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyAnalyses {
    pub analyses: Vec<Analysis>,
    pub rejected: Vec<RejectedAnalysis>,
}

impl StudyAnalyses {
    fn len(&self) -> usize {
        self.analyses.len() + self.rejected.len()
    }
}

/// Read access to a study metadata service.
#[async_trait]
pub trait StudyMetadataSource: Send + Sync {
    /// Fetch one analysis of a study.
    async fn get_analysis(
        &self,
        analysis_id: &str,
        study_id: &str,
        base_url: &str,
    ) -> Result<Analysis, MetadataError>;

    /// Fetch one page of the indexable analyses of a study.
    async fn get_study_analyses_page(
        &self,
        study_id: &str,
        base_url: &str,
        offset: usize,
    ) -> Result<AnalysisPage, MetadataError>;

    /// List the ids of every study hosted by a repository.
    async fn get_studies(&self, base_url: &str) -> Result<Vec<String>, MetadataError>;

    /// Fetch all indexable analyses of a study, page by page until an empty page.
    async fn get_study_analyses(
        &self,
        study_id: &str,
        base_url: &str,
    ) -> Result<StudyAnalyses, MetadataError> {
        let mut study = StudyAnalyses::default();
        loop {
            let page = self
                .get_study_analyses_page(study_id, base_url, study.len())
                .await?;
            if page.is_empty() {
                return Ok(study);
            }
            study.analyses.extend(page.analyses);
            study.rejected.extend(page.rejected);
        }
    }
}
