//! Exclusion rule sources.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{EntityKind, ExclusionRule, ExclusionRuleSource, ExclusionRules, IdExclusionRule};
use crate::errors::IndexerError;

const BY_ID_KEY: &str = "byId";

fn entity_kind(key: &str) -> Option<EntityKind> {
    match key {
        "studyId" => Some(EntityKind::Study),
        "analysis" => Some(EntityKind::Analysis),
        "files" => Some(EntityKind::File),
        "samples" => Some(EntityKind::Sample),
        "specimen" => Some(EntityKind::Specimen),
        "donor" => Some(EntityKind::Donor),
        _ => None,
    }
}

/// Parse a rules document of the form
/// `{"byId": {"studyId": [...], "analysis": [...], "files": [...], "samples": [...], "specimen": [...], "donor": [...]}}`.
pub fn parse_rules(raw: &str) -> Result<ExclusionRules, IndexerError> {
    let document: BTreeMap<String, BTreeMap<String, Vec<String>>> = serde_json::from_str(raw)
        .map_err(|e| IndexerError::config(format!("Invalid exclusion rules: {}", e)))?;

    let mut rules = ExclusionRules::new();
    for (rule_type, by_kind) in document {
        if rule_type != BY_ID_KEY {
            return Err(IndexerError::config(format!(
                "Unknown exclusion rule type '{}'",
                rule_type
            )));
        }
        for (key, ids) in by_kind {
            let kind = entity_kind(&key).ok_or_else(|| {
                IndexerError::config(format!("Unknown exclusion rule entity '{}'", key))
            })?;
            let rule = IdExclusionRule::new(ids);
            if !rule.is_empty() {
                rules = rules.with_rule(kind, ExclusionRule::ById(rule));
            }
        }
    }
    Ok(rules)
}

/// Rules read from a JSON file. No path, or a missing file, means no rules.
pub struct JsonFileRuleSource {
    path: Option<PathBuf>,
}

impl JsonFileRuleSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ExclusionRuleSource for JsonFileRuleSource {
    async fn get_rules(&self) -> Result<ExclusionRules, IndexerError> {
        let Some(path) = &self.path else {
            info!("No exclusion rules configured");
            return Ok(ExclusionRules::new());
        };

        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "Exclusion rules file not found, no rules applied");
                return Ok(ExclusionRules::new());
            }
            Err(e) => {
                return Err(IndexerError::config(format!(
                    "Failed to read exclusion rules {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let rules = parse_rules(&raw)?;
        info!(path = %path.display(), "Exclusion rules loaded");
        Ok(rules)
    }
}

/// Rules fixed at construction.
pub struct StaticRuleSource {
    rules: ExclusionRules,
}

impl StaticRuleSource {
    pub fn new(rules: ExclusionRules) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl ExclusionRuleSource for StaticRuleSource {
    async fn get_rules(&self) -> Result<ExclusionRules, IndexerError> {
        Ok(self.rules.clone())
    }
}
