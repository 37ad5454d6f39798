//! OpenSearch index configuration and mappings.
//!
//! This module defines the index settings and mappings for the file-centric
//! and analysis-centric indexes.

use serde_json::{json, Value};

/// The two document shapes, each stored in its own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    FileCentric,
    AnalysisCentric,
}

impl DocumentKind {
    /// Field holding the owning analysis id.
    pub fn analysis_id_field(&self) -> &'static str {
        match self {
            Self::FileCentric => "analysis.analysis_id",
            Self::AnalysisCentric => "analysis_id",
        }
    }

    /// Painless path of the object holding analysis state and timestamps.
    pub fn lifecycle_path(&self) -> &'static str {
        match self {
            Self::FileCentric => "ctx._source.analysis",
            Self::AnalysisCentric => "ctx._source",
        }
    }
}

/// Configuration for one search index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// The alias name for the search index (used for all operations).
    pub alias: String,
    /// The version number for the index (e.g., 1 for "file_centric_v1").
    pub version: u32,
    /// Which document shape the index stores.
    pub kind: DocumentKind,
}

impl IndexConfig {
    /// Create a new index configuration.
    ///
    /// # Arguments
    ///
    /// * `alias` - The index alias name
    /// * `version` - The version number
    /// * `kind` - The document shape stored in the index
    pub fn new(alias: impl Into<String>, version: u32, kind: DocumentKind) -> Self {
        Self {
            alias: alias.into(),
            version,
            kind,
        }
    }

    /// Name of the concrete index behind the alias.
    pub fn versioned_index_name(&self) -> String {
        get_versioned_index_name(&self.alias, self.version)
    }
}

/// Get the versioned index name (e.g. "file_centric_v1").
pub fn get_versioned_index_name(alias: &str, version: u32) -> String {
    format!("{}_v{}", alias, version)
}

fn repository_mapping() -> Value {
    json!({
        "properties": {
            "code": { "type": "keyword" },
            "organization": { "type": "keyword" },
            "name": { "type": "keyword" },
            "type": { "type": "keyword" },
            "country": { "type": "keyword" },
            "url": { "type": "keyword", "index": false },
            "data_path": { "type": "keyword", "index": false },
            "metadata_path": { "type": "keyword", "index": false }
        }
    })
}

fn donor_mapping() -> Value {
    json!({
        "type": "nested",
        "properties": {
            "donor_id": { "type": "keyword" },
            "submitter_donor_id": { "type": "keyword" },
            "gender": { "type": "keyword" },
            "specimens": {
                "type": "nested",
                "properties": {
                    "specimen_id": { "type": "keyword" },
                    "submitter_specimen_id": { "type": "keyword" },
                    "specimen_type": { "type": "keyword" },
                    "specimen_tissue_source": { "type": "keyword" },
                    "tumour_normal_designation": { "type": "keyword" },
                    "samples": {
                        "type": "nested",
                        "properties": {
                            "sample_id": { "type": "keyword" },
                            "submitter_sample_id": { "type": "keyword" },
                            "matched_normal_submitter_sample_id": { "type": "keyword" },
                            "sample_type": { "type": "keyword" }
                        }
                    }
                }
            }
        }
    })
}

fn lifecycle_properties() -> Value {
    json!({
        "analysis_state": { "type": "keyword" },
        "published_at": { "type": "date" },
        "updated_at": { "type": "date" },
        "first_published_at": { "type": "date" }
    })
}

/// Get the index settings and mappings for the given document shape.
///
/// Repository references are mapped as plain objects (not nested) so that
/// documents without any repository can be found with an `exists` query.
///
/// # Sharding Configuration
///
/// - 1 primary shard
/// - 1 replica for redundancy
pub fn get_index_settings(kind: DocumentKind) -> Value {
    let mut analysis_properties = json!({
        "analysis_id": { "type": "keyword" },
        "analysis_type": { "type": "keyword" },
        "analysis_version": { "type": "integer" },
        "study_id": { "type": "keyword" },
        "experiment": { "type": "object" }
    });
    merge_properties(&mut analysis_properties, lifecycle_properties());

    let properties = match kind {
        DocumentKind::FileCentric => json!({
            "object_id": { "type": "keyword" },
            "study_id": { "type": "keyword" },
            "data_type": { "type": "keyword" },
            "file_type": { "type": "keyword" },
            "file_access": { "type": "keyword" },
            "analysis": { "properties": analysis_properties },
            "file": {
                "properties": {
                    "name": { "type": "keyword" },
                    "md5sum": { "type": "keyword" },
                    "size": { "type": "long" },
                    "data_type": { "type": "keyword" },
                    "index_file": {
                        "properties": {
                            "object_id": { "type": "keyword" },
                            "name": { "type": "keyword" },
                            "file_type": { "type": "keyword" },
                            "md5sum": { "type": "keyword" },
                            "size": { "type": "long" }
                        }
                    }
                }
            },
            "repositories": repository_mapping(),
            "donors": donor_mapping()
        }),
        DocumentKind::AnalysisCentric => {
            let mut properties = analysis_properties;
            merge_properties(
                &mut properties,
                json!({
                    "files": {
                        "type": "nested",
                        "properties": {
                            "object_id": { "type": "keyword" },
                            "name": { "type": "keyword" },
                            "size": { "type": "long" },
                            "file_type": { "type": "keyword" },
                            "md5sum": { "type": "keyword" },
                            "file_access": { "type": "keyword" },
                            "data_type": { "type": "keyword" }
                        }
                    },
                    "repositories": repository_mapping(),
                    "donors": donor_mapping()
                }),
            );
            properties
        }
    };

    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "properties": properties
        }
    })
}

fn merge_properties(target: &mut Value, extra: Value) {
    if let (Some(target), Value::Object(extra)) = (target.as_object_mut(), extra) {
        target.extend(extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_centric_settings_structure() {
        let settings = get_index_settings(DocumentKind::FileCentric);
        let properties = &settings["mappings"]["properties"];

        assert!(settings["settings"]["number_of_shards"].is_number());
        assert_eq!(properties["object_id"]["type"], "keyword");
        assert_eq!(
            properties["analysis"]["properties"]["analysis_id"]["type"],
            "keyword"
        );
        assert_eq!(
            properties["analysis"]["properties"]["analysis_state"]["type"],
            "keyword"
        );
        assert_eq!(properties["donors"]["type"], "nested");
        assert!(properties["repositories"]["type"].is_null());
    }

    #[test]
    fn test_analysis_centric_settings_structure() {
        let settings = get_index_settings(DocumentKind::AnalysisCentric);
        let properties = &settings["mappings"]["properties"];

        assert_eq!(properties["analysis_id"]["type"], "keyword");
        assert_eq!(properties["published_at"]["type"], "date");
        assert_eq!(properties["files"]["type"], "nested");
        assert_eq!(properties["repositories"]["properties"]["code"]["type"], "keyword");
    }

    #[test]
    fn test_analysis_id_fields() {
        assert_eq!(
            DocumentKind::FileCentric.analysis_id_field(),
            "analysis.analysis_id"
        );
        assert_eq!(DocumentKind::AnalysisCentric.analysis_id_field(), "analysis_id");
    }

    #[test]
    fn test_versioned_index_name() {
        assert_eq!(get_versioned_index_name("file_centric", 1), "file_centric_v1");
        let config = IndexConfig::new("analysis_centric", 2, DocumentKind::AnalysisCentric);
        assert_eq!(config.versioned_index_name(), "analysis_centric_v2");
    }
}
