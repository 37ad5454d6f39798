//! Repository registry.
//!
//! The set of repositories is static configuration, read once at startup.

use std::collections::BTreeMap;
use std::path::Path;

use analysis_indexer_shared::StudyRepository;
use tracing::info;

use crate::errors::IndexerError;

/// Lookup of configured study repositories.
pub trait RepositoryRegistry: Send + Sync {
    fn get_by_code(&self, code: &str) -> Option<StudyRepository>;

    fn get_all(&self) -> Vec<StudyRepository>;
}

/// Registry backed by an in-memory list, usually read from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticRepositoryRegistry {
    repositories: BTreeMap<String, StudyRepository>,
}

impl StaticRepositoryRegistry {
    /// Build a registry. Repository codes must be unique.
    pub fn new(repositories: Vec<StudyRepository>) -> Result<Self, IndexerError> {
        let mut by_code = BTreeMap::new();
        for repository in repositories {
            let code = repository.code.clone();
            if by_code.insert(code.clone(), repository).is_some() {
                return Err(IndexerError::config(format!(
                    "Duplicate repository code '{}'",
                    code
                )));
            }
        }
        Ok(Self {
            repositories: by_code,
        })
    }

    /// Parse a JSON array of repository descriptors.
    pub fn from_json(raw: &str) -> Result<Self, IndexerError> {
        let repositories: Vec<StudyRepository> = serde_json::from_str(raw)
            .map_err(|e| IndexerError::config(format!("Invalid repositories file: {}", e)))?;
        Self::new(repositories)
    }

    pub async fn from_file(path: &Path) -> Result<Self, IndexerError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            IndexerError::config(format!(
                "Failed to read repositories file {}: {}",
                path.display(),
                e
            ))
        })?;
        let registry = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            repositories = registry.repositories.len(),
            "Repository registry loaded"
        );
        Ok(registry)
    }
}

impl RepositoryRegistry for StaticRepositoryRegistry {
    fn get_by_code(&self, code: &str) -> Option<StudyRepository> {
        self.repositories.get(code).cloned()
    }

    fn get_all(&self) -> Vec<StudyRepository> {
        self.repositories.values().cloned().collect()
    }
}
