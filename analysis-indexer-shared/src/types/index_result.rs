//! Outcome of an indexing command.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Ids that failed to be written, grouped by id kind (e.g. "analysisId").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureData {
    pub failing_ids: BTreeMap<String, BTreeSet<String>>,
}

impl FailureData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failure data holding a single id.
    pub fn of(label: impl Into<String>, id: impl Into<String>) -> Self {
        let mut data = Self::new();
        data.add_failure(label, id);
        data
    }

    pub fn add_failure(&mut self, label: impl Into<String>, id: impl Into<String>) {
        self.failing_ids
            .entry(label.into())
            .or_default()
            .insert(id.into());
    }

    pub fn add_failures<I, S>(&mut self, label: impl Into<String>, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.failing_ids.entry(label.into()).or_default();
        entry.extend(ids.into_iter().map(Into::into));
    }

    pub fn merge(&mut self, other: FailureData) {
        for (label, ids) in other.failing_ids {
            self.failing_ids.entry(label).or_default().extend(ids);
        }
    }

    pub fn ids(&self, label: &str) -> Option<&BTreeSet<String>> {
        self.failing_ids.get(label)
    }

    pub fn is_empty(&self) -> bool {
        self.failing_ids.values().all(BTreeSet::is_empty)
    }
}

/// Result of writing to one target index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResult {
    pub index_name: String,
    pub successful: bool,
    #[serde(default, skip_serializing_if = "FailureData::is_empty")]
    pub failure_data: FailureData,
}

impl IndexResult {
    pub fn success(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            successful: true,
            failure_data: FailureData::new(),
        }
    }

    pub fn failure(index_name: impl Into<String>, failure_data: FailureData) -> Self {
        Self {
            index_name: index_name.into(),
            successful: false,
            failure_data,
        }
    }

    /// Union of two results for the same index.
    ///
    /// Failing ids are unioned; the merged result is successful only if both
    /// inputs were and no id failed.
    pub fn merge(mut self, other: IndexResult) -> Self {
        if self.index_name.is_empty() {
            self.index_name = other.index_name;
        }
        self.failure_data.merge(other.failure_data);
        self.successful = self.successful && other.successful && self.failure_data.is_empty();
        self
    }
}

/// Results keyed by index alias, one entry per enabled document kind.
pub type IndexResults = BTreeMap<String, IndexResult>;

/// Merge `other` into `into`, unioning results that target the same index.
pub fn merge_results(into: &mut IndexResults, other: IndexResults) {
    for (index, result) in other {
        let merged = match into.remove(&index) {
            Some(existing) => existing.merge(result),
            None => result,
        };
        into.insert(index, merged);
    }
}
