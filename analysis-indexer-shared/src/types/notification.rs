//! Notifications emitted when indexing fails or detects a conflict.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationCategory {
    Error,
    Warn,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationName {
    StudyAnalysesFetchFailed,
    FetchRepoStudiesFailed,
    IndexReqFailed,
    ConvertAnalysisToFileDocsFailed,
    ConvertAnalysisToAnalysisDocsFailed,
    FailedToFetchAnalysis,
    FailedToFetchRepository,
    FailedToRemoveAnalysis,
    IndexFileConflict,
    AnalysisConflict,
    UnhandledError,
}

impl NotificationName {
    pub fn category(&self) -> NotificationCategory {
        match self {
            Self::IndexFileConflict | Self::AnalysisConflict => NotificationCategory::Warn,
            _ => NotificationCategory::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StudyAnalysesFetchFailed => "STUDY_ANALYSES_FETCH_FAILED",
            Self::FetchRepoStudiesFailed => "FETCH_REPO_STUDIES_FAILED",
            Self::IndexReqFailed => "INDEX_REQ_FAILED",
            Self::ConvertAnalysisToFileDocsFailed => "CONVERT_ANALYSIS_TO_FILE_DOCS_FAILED",
            Self::ConvertAnalysisToAnalysisDocsFailed => "CONVERT_ANALYSIS_TO_ANALYSIS_DOCS_FAILED",
            Self::FailedToFetchAnalysis => "FAILED_TO_FETCH_ANALYSIS",
            Self::FailedToFetchRepository => "FAILED_TO_FETCH_REPOSITORY",
            Self::FailedToRemoveAnalysis => "FAILED_TO_REMOVE_ANALYSIS",
            Self::IndexFileConflict => "INDEX_FILE_CONFLICT",
            Self::AnalysisConflict => "ANALYSIS_CONFLICT",
            Self::UnhandledError => "UNHANDLED_ERROR",
        }
    }
}

impl fmt::Display for NotificationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named event with free-form attributes (ids, repo codes, error text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerNotification {
    pub name: NotificationName,
    pub attributes: BTreeMap<String, Value>,
}

impl IndexerNotification {
    pub fn new(name: NotificationName) -> Self {
        Self {
            name,
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn category(&self) -> NotificationCategory {
        self.name.category()
    }
}

impl fmt::Display for IndexerNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attributes = serde_json::to_string(&self.attributes).map_err(|_| fmt::Error)?;
        write!(f, "{} {}", self.name, attributes)
    }
}
