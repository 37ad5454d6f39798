//! Source metadata types as served by the study metadata service.
//!
//! These mirror the upstream JSON (camelCase) and are read-only to the indexer.
//! Unknown analysis attributes are kept in [`Analysis::data`] so they can be
//! copied into documents verbatim.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Free-form attribute map (`info`, `experiment`, extra analysis data).
pub type Properties = BTreeMap<String, Value>;

/// One versioned unit of experimental results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub analysis_id: String,
    pub study_id: String,
    pub analysis_state: String,
    pub analysis_type: AnalysisType,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub first_published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Properties>,
    /// Every attribute the upstream schema defines beyond the fixed ones.
    #[serde(flatten)]
    pub data: Properties,
}

/// Analysis type reference, e.g. `sequencingRead` version 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisType {
    pub name: String,
    #[serde(default)]
    pub version: Option<i64>,
}

/// A sample binds one specimen and one donor to an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub sample_id: String,
    #[serde(default)]
    pub specimen_id: Option<String>,
    #[serde(default)]
    pub submitter_sample_id: String,
    #[serde(default)]
    pub matched_normal_submitter_sample_id: Option<String>,
    #[serde(default)]
    pub sample_type: Option<String>,
    #[serde(default)]
    pub specimen: Option<Specimen>,
    #[serde(default)]
    pub donor: Option<Donor>,
    #[serde(default)]
    pub info: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specimen {
    pub specimen_id: String,
    #[serde(default)]
    pub donor_id: Option<String>,
    #[serde(default)]
    pub submitter_specimen_id: String,
    #[serde(default)]
    pub tumour_normal_designation: Option<String>,
    #[serde(default)]
    pub specimen_tissue_source: Option<String>,
    #[serde(default)]
    pub specimen_type: Option<String>,
    #[serde(default)]
    pub info: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    pub donor_id: String,
    #[serde(default)]
    pub submitter_donor_id: String,
    #[serde(default)]
    pub study_id: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub info: Properties,
}

/// A data file produced by an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub object_id: String,
    #[serde(default)]
    pub study_id: Option<String>,
    #[serde(default)]
    pub analysis_id: Option<String>,
    pub file_name: String,
    pub file_type: String,
    #[serde(default)]
    pub file_md5sum: String,
    #[serde(default)]
    pub file_access: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub info: Properties,
}

/// Where the files of a repository are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    #[serde(rename = "S3", alias = "s3")]
    S3,
    #[serde(rename = "AZURE", alias = "azure")]
    Azure,
}

impl StorageType {
    /// Upper-case name as it appears in indexed repository references.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "S3",
            Self::Azure => "AZURE",
        }
    }
}

/// A configured source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyRepository {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "url", alias = "baseUrl")]
    pub base_url: String,
    #[serde(default)]
    pub data_path: String,
    #[serde(default)]
    pub metadata_path: String,
    pub storage_type: StorageType,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub country: String,
}

/// Accepts RFC 3339 timestamps as well as zone-less ones (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        parse_timestamp(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s)))
    })
    .transpose()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}
