//! Commands accepted by the indexer.

use serde::{Deserialize, Serialize};

use crate::types::metadata::Analysis;

/// Fully qualified reference to one analysis in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisIdentifier {
    pub analysis_id: String,
    pub study_id: String,
    pub repository_code: String,
}

impl AnalysisIdentifier {
    pub fn new(
        analysis_id: impl Into<String>,
        study_id: impl Into<String>,
        repository_code: impl Into<String>,
    ) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            study_id: study_id.into(),
            repository_code: repository_code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexAnalysisCommand {
    pub analysis_identifier: AnalysisIdentifier,
}

/// Index an analysis already in hand (e.g. from a publish event) without fetching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexAnalysisPayloadCommand {
    pub analysis: Analysis,
    pub repository_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStudyCommand {
    pub study_id: String,
    pub repository_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRepositoryCommand {
    pub repository_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveAnalysisCommand {
    pub analysis_identifier: AnalysisIdentifier,
}
