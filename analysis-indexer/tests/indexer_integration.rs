//! Integration tests for the indexer.
//!
//! These run the real Indexer, resolver and bulk writer against an in-memory
//! search index that applies the same append-if-absent upsert as OpenSearch,
//! with mocked metadata source and notification channel.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_indexer::metadata::{AnalysisPage, MetadataError, StudyMetadataSource};
use analysis_indexer::notifier::{NotificationChannel, Notifier, Subscription};
use analysis_indexer::registry::StaticRepositoryRegistry;
use analysis_indexer::rules::{EntityKind, ExclusionRule, ExclusionRules, IdExclusionRule};
use analysis_indexer::{Indexer, IndexerError};
use analysis_indexer_repository::{
    RemovalSummary, SearchIndexError, SearchIndexProvider, SearchIndexService,
    SearchIndexServiceConfig, UpsertDocumentRequest,
};
use analysis_indexer_shared::{
    Analysis, AnalysisIdentifier, IndexAnalysisCommand, IndexAnalysisPayloadCommand,
    IndexRepositoryCommand, IndexResults, IndexStudyCommand, IndexerNotification,
    NotificationName, RemoveAnalysisCommand, StorageType, StudyRepository,
};
use async_trait::async_trait;
use serde_json::{json, Value};

const FILE_INDEX: &str = "file_centric";
const ANALYSIS_INDEX: &str = "analysis_centric";
const PAGE_LIMIT: usize = 2;

// In-memory search index with conditional upsert semantics
struct InMemoryIndex {
    name: String,
    documents: Mutex<BTreeMap<String, Value>>,
    failing_ids: HashSet<String>,
}

impl InMemoryIndex {
    fn new(name: &str) -> Arc<Self> {
        Self::failing(name, &[])
    }

    fn failing(name: &str, failing_ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            documents: Mutex::new(BTreeMap::new()),
            failing_ids: failing_ids.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn get(&self, id: &str) -> Option<Value> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    fn ids(&self) -> Vec<String> {
        self.documents.lock().unwrap().keys().cloned().collect()
    }

    fn repo_codes(&self, id: &str) -> Vec<String> {
        self.get(id)
            .map(|doc| {
                doc["repositories"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|r| r["code"].as_str().unwrap().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn analysis_id_of(document: &Value) -> Option<&str> {
        document
            .pointer("/analysis/analysis_id")
            .or_else(|| document.get("analysis_id"))
            .and_then(Value::as_str)
    }
}

#[async_trait]
impl SearchIndexProvider for InMemoryIndex {
    fn index_name(&self) -> &str {
        &self.name
    }

    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        Ok(())
    }

    async fn bulk_upsert(&self, requests: &[UpsertDocumentRequest]) -> Result<(), SearchIndexError> {
        if requests
            .iter()
            .any(|r| self.failing_ids.contains(&r.document_id))
        {
            return Err(SearchIndexError::bulk_index("Mock bulk failure"));
        }

        let mut documents = self.documents.lock().unwrap();
        for request in requests {
            match documents.entry(request.document_id.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(request.document.clone());
                }
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    let repositories = existing["repositories"].as_array_mut().unwrap();
                    for repository in &request.repositories {
                        if !repositories.iter().any(|r| r["code"] == repository.code.as_str()) {
                            repositories.push(serde_json::to_value(repository).unwrap());
                        }
                    }
                    let state = json!(request.lifecycle.state);
                    if existing.get("analysis").is_some() {
                        existing["analysis"]["analysis_state"] = state;
                    } else {
                        existing["analysis_state"] = state;
                    }
                }
            }
        }
        Ok(())
    }

    async fn get_documents(&self, ids: &[String]) -> Result<Vec<Value>, SearchIndexError> {
        let documents = self.documents.lock().unwrap();
        Ok(ids.iter().filter_map(|id| documents.get(id).cloned()).collect())
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<(), SearchIndexError> {
        let mut documents = self.documents.lock().unwrap();
        for id in ids {
            documents.remove(id);
        }
        Ok(())
    }

    async fn remove_repository(
        &self,
        analysis_id: &str,
        repository_code: &str,
    ) -> Result<RemovalSummary, SearchIndexError> {
        let mut documents = self.documents.lock().unwrap();
        let mut summary = RemovalSummary::default();

        for document in documents.values_mut() {
            if Self::analysis_id_of(document) != Some(analysis_id) {
                continue;
            }
            let repositories = document["repositories"].as_array_mut().unwrap();
            let before = repositories.len();
            repositories.retain(|r| r["code"] != repository_code);
            if repositories.len() != before {
                summary.updated += 1;
            }
        }

        let before = documents.len();
        documents.retain(|_, document| {
            Self::analysis_id_of(document) != Some(analysis_id)
                || !document["repositories"].as_array().unwrap().is_empty()
        });
        summary.deleted = (before - documents.len()) as u64;

        Ok(summary)
    }
}

// Mock metadata source serving canned analyses per repository base URL
#[derive(Default)]
struct MockMetadata {
    analyses: Mutex<HashMap<String, Vec<Analysis>>>,
    malformed: Vec<Value>,
    failing_studies: HashSet<String>,
    page_calls: Mutex<Vec<(String, usize)>>,
}

impl MockMetadata {
    fn with(self, repository: &StudyRepository, analyses: Vec<Analysis>) -> Self {
        self.analyses
            .lock()
            .unwrap()
            .entry(repository.base_url.clone())
            .or_default()
            .extend(analyses);
        self
    }

    /// Serve a raw entry after the valid analyses of its study.
    fn with_malformed(mut self, entry: Value) -> Self {
        self.malformed.push(entry);
        self
    }

    fn failing_study(mut self, study_id: &str) -> Self {
        self.failing_studies.insert(study_id.to_string());
        self
    }

    fn hosted(&self, base_url: &str) -> Vec<Analysis> {
        self.analyses
            .lock()
            .unwrap()
            .get(base_url)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl StudyMetadataSource for MockMetadata {
    async fn get_analysis(
        &self,
        analysis_id: &str,
        study_id: &str,
        base_url: &str,
    ) -> Result<Analysis, MetadataError> {
        self.hosted(base_url)
            .into_iter()
            .find(|a| a.analysis_id == analysis_id && a.study_id == study_id)
            .ok_or_else(|| MetadataError::NotFound(format!("analysis {}", analysis_id)))
    }

    async fn get_study_analyses_page(
        &self,
        study_id: &str,
        base_url: &str,
        offset: usize,
    ) -> Result<AnalysisPage, MetadataError> {
        self.page_calls
            .lock()
            .unwrap()
            .push((study_id.to_string(), offset));

        if self.failing_studies.contains(study_id) {
            return Err(MetadataError::Upstream("connection reset".to_string()));
        }

        let entries: Vec<Value> = self
            .hosted(base_url)
            .into_iter()
            .filter(|a| a.study_id == study_id)
            .map(|a| serde_json::to_value(a).unwrap())
            .chain(
                self.malformed
                    .iter()
                    .filter(|entry| entry["studyId"] == study_id)
                    .cloned(),
            )
            .collect();
        let total = entries.len() as u64;
        Ok(AnalysisPage::from_entries(
            entries.into_iter().skip(offset).take(PAGE_LIMIT).collect(),
            Some(total),
        ))
    }

    async fn get_studies(&self, base_url: &str) -> Result<Vec<String>, MetadataError> {
        let studies: BTreeSet<String> = self
            .hosted(base_url)
            .into_iter()
            .map(|a| a.study_id)
            .chain(self.failing_studies.iter().cloned())
            .collect();
        Ok(studies.into_iter().collect())
    }
}

// Notification channel recording everything it receives
#[derive(Default)]
struct RecordingChannel {
    received: Mutex<Vec<IndexerNotification>>,
}

impl RecordingChannel {
    fn named(&self, name: NotificationName) -> Vec<IndexerNotification> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.name == name)
            .cloned()
            .collect()
    }

    fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl NotificationChannel for RecordingChannel {
    fn subscription(&self) -> Subscription {
        Subscription::All
    }

    fn send(&self, notification: &IndexerNotification) {
        self.received.lock().unwrap().push(notification.clone());
    }
}

fn repository(code: &str) -> StudyRepository {
    StudyRepository {
        code: code.to_string(),
        name: Some(code.to_uppercase()),
        base_url: format!("https://song.{}.org", code),
        data_path: "/oicr.icgc/data".to_string(),
        metadata_path: "/oicr.icgc.meta/metadata".to_string(),
        storage_type: StorageType::S3,
        organization: "ICGC".to_string(),
        country: "CA".to_string(),
    }
}

/// A published analysis with one sample and one BAM file, as SONG serves it.
fn analysis(analysis_id: &str, study_id: &str, object_id: &str, donor_id: &str) -> Analysis {
    serde_json::from_value(json!({
        "analysisId": analysis_id,
        "studyId": study_id,
        "analysisState": "PUBLISHED",
        "analysisType": {"name": "sequencingRead", "version": 1},
        "updatedAt": "2024-05-01T10:00:00.000",
        "samples": [{
            "sampleId": format!("SA-{}", analysis_id),
            "submitterSampleId": format!("sub-SA-{}", analysis_id),
            "sampleType": "Total DNA",
            "specimen": {
                "specimenId": format!("SP-{}", donor_id),
                "submitterSpecimenId": format!("sub-SP-{}", donor_id),
                "specimenType": "Normal"
            },
            "donor": {
                "donorId": donor_id,
                "submitterDonorId": format!("sub-{}", donor_id),
                "gender": "Female"
            }
        }],
        "files": [{
            "objectId": object_id,
            "fileName": format!("{}.bam", object_id),
            "fileType": "BAM",
            "fileMd5sum": format!("md5-{}", object_id),
            "fileAccess": "controlled",
            "dataType": "Aligned Reads",
            "fileSize": 2048
        }],
        "experiment": {"platform": "ILLUMINA"},
        "workflow": {"workflowName": "alignment"}
    }))
    .unwrap()
}

struct Harness {
    indexer: Indexer,
    files: Arc<InMemoryIndex>,
    analyses: Arc<InMemoryIndex>,
    notifications: Arc<RecordingChannel>,
    metadata: Arc<MockMetadata>,
}

fn harness_with(
    metadata: MockMetadata,
    rules: ExclusionRules,
    files: Arc<InMemoryIndex>,
    analysis_centric: bool,
) -> Harness {
    let metadata = Arc::new(metadata);
    let analyses = InMemoryIndex::new(ANALYSIS_INDEX);
    let notifications = Arc::new(RecordingChannel::default());
    let registry =
        StaticRepositoryRegistry::new(vec![repository("collab"), repository("aws")]).unwrap();
    let config = SearchIndexServiceConfig::default()
        .with_partition_size(2)
        .with_retry(1, Duration::ZERO);

    let mut indexer = Indexer::new(
        metadata.clone(),
        Arc::new(registry),
        Notifier::new(vec![notifications.clone() as Arc<dyn NotificationChannel>]),
    )
    .with_rules(rules)
    .with_file_centric(SearchIndexService::with_config(
        files.clone(),
        config.clone(),
    ));
    if analysis_centric {
        indexer = indexer.with_analysis_centric(SearchIndexService::with_config(
            analyses.clone(),
            config,
        ));
    }

    Harness {
        indexer,
        files,
        analyses,
        notifications,
        metadata,
    }
}

fn harness(metadata: MockMetadata) -> Harness {
    harness_with(
        metadata,
        ExclusionRules::new(),
        InMemoryIndex::new(FILE_INDEX),
        true,
    )
}

fn index_analysis(analysis_id: &str, study_id: &str, repo: &str) -> IndexAnalysisCommand {
    IndexAnalysisCommand {
        analysis_identifier: AnalysisIdentifier::new(analysis_id, study_id, repo),
    }
}

fn remove_analysis(analysis_id: &str, study_id: &str, repo: &str) -> RemoveAnalysisCommand {
    RemoveAnalysisCommand {
        analysis_identifier: AnalysisIdentifier::new(analysis_id, study_id, repo),
    }
}

fn all_successful(results: &IndexResults) -> bool {
    !results.is_empty() && results.values().all(|r| r.successful)
}

#[tokio::test]
async fn test_repositories_accumulate_and_removal_keeps_the_rest() {
    let collab = repository("collab");
    let aws = repository("aws");
    let h = harness(
        MockMetadata::default()
            .with(&collab, vec![analysis("A1", "S1", "F1", "DO1")])
            .with(&aws, vec![analysis("A1", "S1", "F1", "DO1")]),
    );

    let results = h
        .indexer
        .index_analysis(&index_analysis("A1", "S1", "collab"))
        .await
        .unwrap();
    assert!(all_successful(&results));
    assert_eq!(h.files.ids(), vec!["F1"]);
    assert_eq!(h.files.repo_codes("F1"), vec!["collab"]);
    assert_eq!(h.analyses.repo_codes("A1"), vec!["collab"]);

    h.indexer
        .index_analysis(&index_analysis("A1", "S1", "aws"))
        .await
        .unwrap();
    assert_eq!(h.files.repo_codes("F1"), vec!["collab", "aws"]);
    assert_eq!(h.analyses.repo_codes("A1"), vec!["collab", "aws"]);

    let results = h
        .indexer
        .remove_analysis(&remove_analysis("A1", "S1", "collab"))
        .await
        .unwrap();
    assert!(all_successful(&results));
    assert_eq!(h.files.repo_codes("F1"), vec!["aws"]);
    assert_eq!(h.analyses.repo_codes("A1"), vec!["aws"]);

    h.indexer
        .remove_analysis(&remove_analysis("A1", "S1", "aws"))
        .await
        .unwrap();
    assert!(h.files.get("F1").is_none());
    assert!(h.analyses.get("A1").is_none());
}

#[tokio::test]
async fn test_repository_accumulation_is_order_independent() {
    let collab = repository("collab");
    let aws = repository("aws");
    let h = harness(
        MockMetadata::default()
            .with(&collab, vec![analysis("A1", "S1", "F1", "DO1")])
            .with(&aws, vec![analysis("A1", "S1", "F1", "DO1")]),
    );

    h.indexer
        .index_analysis(&index_analysis("A1", "S1", "aws"))
        .await
        .unwrap();
    h.indexer
        .index_analysis(&index_analysis("A1", "S1", "collab"))
        .await
        .unwrap();

    let codes: BTreeSet<String> = h.files.repo_codes("F1").into_iter().collect();
    assert_eq!(codes, BTreeSet::from(["aws".to_string(), "collab".to_string()]));
    assert_eq!(h.files.repo_codes("F1").len(), 2);
    assert!(h.notifications.named(NotificationName::IndexFileConflict).is_empty());
}

#[tokio::test]
async fn test_reindexing_is_idempotent() {
    let collab = repository("collab");
    let h = harness(MockMetadata::default().with(&collab, vec![analysis("A1", "S1", "F1", "DO1")]));

    h.indexer
        .index_analysis(&index_analysis("A1", "S1", "collab"))
        .await
        .unwrap();
    let once_file = h.files.get("F1").unwrap();
    let once_analysis = h.analyses.get("A1").unwrap();

    for _ in 0..3 {
        let results = h
            .indexer
            .index_analysis(&index_analysis("A1", "S1", "collab"))
            .await
            .unwrap();
        assert!(all_successful(&results));
    }

    assert_eq!(h.files.get("F1").unwrap(), once_file);
    assert_eq!(h.analyses.get("A1").unwrap(), once_analysis);
    assert_eq!(h.notifications.count(), 0);
}

#[tokio::test]
async fn test_conflicting_file_removes_stale_document() {
    let collab = repository("collab");
    let h = harness_with(
        MockMetadata::default().with(&collab, vec![analysis("A1", "S1", "F1", "DO1")]),
        ExclusionRules::new(),
        InMemoryIndex::new(FILE_INDEX),
        false,
    );

    h.indexer
        .index_analysis(&index_analysis("A1", "S1", "collab"))
        .await
        .unwrap();
    assert!(h.files.get("F1").is_some());

    // aws claims F1 belongs to another analysis
    let results = h
        .indexer
        .index_analysis_payload(&IndexAnalysisPayloadCommand {
            analysis: analysis("A2", "S1", "F1", "DO1"),
            repository_code: "aws".to_string(),
        })
        .await
        .unwrap();

    assert!(all_successful(&results));
    assert!(h.files.get("F1").is_none());

    let conflicts = h.notifications.named(NotificationName::IndexFileConflict);
    assert_eq!(conflicts.len(), 1);
    let attributes = &conflicts[0].attributes;
    assert_eq!(attributes["indexed"]["analysisId"], "A1");
    assert_eq!(attributes["indexed"]["repoCodes"], json!(["collab"]));
    assert_eq!(attributes["incoming"]["analysisId"], "A2");
    assert_eq!(attributes["incoming"]["repoCodes"], json!(["aws"]));
}

#[tokio::test]
async fn test_excluded_analysis_is_not_indexed() {
    let collab = repository("collab");
    let rules = ExclusionRules::new().with_rule(
        EntityKind::Donor,
        ExclusionRule::ById(IdExclusionRule::new(["DO1"])),
    );
    let h = harness_with(
        MockMetadata::default().with(
            &collab,
            vec![
                analysis("A1", "S1", "F1", "DO1"),
                analysis("A2", "S1", "F2", "DO2"),
            ],
        ),
        rules,
        InMemoryIndex::new(FILE_INDEX),
        true,
    );

    let results = h
        .indexer
        .index_analysis(&index_analysis("A1", "S1", "collab"))
        .await
        .unwrap();
    assert!(all_successful(&results));
    assert!(h.files.ids().is_empty());

    h.indexer
        .index_study(&IndexStudyCommand {
            study_id: "S1".to_string(),
            repository_code: "collab".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(h.files.ids(), vec!["F2"]);
    assert_eq!(h.analyses.ids(), vec!["A2"]);
}

#[tokio::test]
async fn test_failed_partition_is_isolated() {
    let collab = repository("collab");
    let analyses = (1..=5)
        .map(|i| analysis(&format!("A{}", i), "S1", &format!("F{}", i), "DO1"))
        .collect();
    let h = harness_with(
        MockMetadata::default().with(&collab, analyses),
        ExclusionRules::new(),
        InMemoryIndex::failing(FILE_INDEX, &["F3"]),
        false,
    );

    let results = h
        .indexer
        .index_study(&IndexStudyCommand {
            study_id: "S1".to_string(),
            repository_code: "collab".to_string(),
        })
        .await
        .unwrap();

    let result = &results[FILE_INDEX];
    assert!(!result.successful);
    let failed: Vec<_> = result
        .failure_data
        .ids("objectId")
        .unwrap()
        .iter()
        .cloned()
        .collect();
    assert_eq!(failed, vec!["F3", "F4"]);
    assert_eq!(h.files.ids(), vec!["F1", "F2", "F5"]);
    assert_eq!(h.notifications.named(NotificationName::IndexReqFailed).len(), 1);
}

#[tokio::test]
async fn test_study_is_paged_until_empty() {
    let collab = repository("collab");
    let analyses = (1..=3)
        .map(|i| analysis(&format!("A{}", i), "S1", &format!("F{}", i), "DO1"))
        .collect();
    let h = harness(MockMetadata::default().with(&collab, analyses));

    h.indexer
        .index_study(&IndexStudyCommand {
            study_id: "S1".to_string(),
            repository_code: "collab".to_string(),
        })
        .await
        .unwrap();

    let offsets: Vec<usize> = h
        .metadata
        .page_calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, offset)| *offset)
        .collect();
    assert_eq!(offsets, vec![0, 2, 3]);
    assert_eq!(h.files.ids(), vec!["F1", "F2", "F3"]);
}

#[tokio::test]
async fn test_bad_analysis_does_not_stop_the_study() {
    let collab = repository("collab");
    let mut broken = analysis("A2", "S1", "F2", "DO1");
    broken.samples.clear();
    let h = harness(MockMetadata::default().with(
        &collab,
        vec![analysis("A1", "S1", "F1", "DO1"), broken],
    ));

    let results = h
        .indexer
        .index_study(&IndexStudyCommand {
            study_id: "S1".to_string(),
            repository_code: "collab".to_string(),
        })
        .await
        .unwrap();

    let file_result = &results[FILE_INDEX];
    assert!(!file_result.successful);
    assert!(file_result.failure_data.ids("analysisId").unwrap().contains("A2"));
    assert_eq!(h.files.ids(), vec!["F1"]);

    // Analysis-centric documents tolerate an analysis without samples
    assert!(results[ANALYSIS_INDEX].successful);

    let failures = h
        .notifications
        .named(NotificationName::ConvertAnalysisToFileDocsFailed);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].attributes["analysisId"], "A2");
    assert_eq!(failures[0].attributes["repoCode"], "collab");
}

#[tokio::test]
async fn test_missing_analysis_is_a_failed_result() {
    let h = harness(MockMetadata::default());

    let results = h
        .indexer
        .index_analysis(&index_analysis("A404", "S1", "collab"))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for result in results.values() {
        assert!(!result.successful);
        assert!(result.failure_data.ids("analysisId").unwrap().contains("A404"));
    }
    let failures = h.notifications.named(NotificationName::FailedToFetchAnalysis);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].attributes["studyId"], "S1");
}

#[tokio::test]
async fn test_unknown_repository_fails_the_command() {
    let h = harness(MockMetadata::default());

    let result = h
        .indexer
        .index_study(&IndexStudyCommand {
            study_id: "S1".to_string(),
            repository_code: "pcawg".to_string(),
        })
        .await;

    assert!(matches!(result, Err(IndexerError::NotFound(_))));
    assert_eq!(
        h.notifications
            .named(NotificationName::FailedToFetchRepository)
            .len(),
        1
    );
}

#[tokio::test]
async fn test_repository_results_are_merged_across_studies() {
    let collab = repository("collab");
    let h = harness(
        MockMetadata::default()
            .with(
                &collab,
                vec![
                    analysis("A1", "S1", "F1", "DO1"),
                    analysis("A2", "S2", "F2", "DO2"),
                ],
            )
            .failing_study("S3"),
    );

    let results = h
        .indexer
        .index_repository(&IndexRepositoryCommand {
            repository_code: "collab".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(h.files.ids(), vec!["F1", "F2"]);
    assert_eq!(h.analyses.ids(), vec!["A1", "A2"]);

    let file_result = &results[FILE_INDEX];
    assert!(!file_result.successful);
    let failed_studies: Vec<_> = file_result
        .failure_data
        .ids("studyId")
        .unwrap()
        .iter()
        .cloned()
        .collect();
    assert_eq!(failed_studies, vec!["S3"]);
    assert_eq!(
        h.notifications
            .named(NotificationName::StudyAnalysesFetchFailed)
            .len(),
        1
    );
}

#[tokio::test]
async fn test_state_change_is_refreshed_on_existing_document() {
    let collab = repository("collab");
    let h = harness(MockMetadata::default().with(&collab, vec![analysis("A1", "S1", "F1", "DO1")]));

    h.indexer
        .index_analysis(&index_analysis("A1", "S1", "collab"))
        .await
        .unwrap();

    let mut suppressed = analysis("A1", "S1", "F1", "DO1");
    suppressed.analysis_state = "SUPPRESSED".to_string();
    h.indexer
        .index_analysis_payload(&IndexAnalysisPayloadCommand {
            analysis: suppressed,
            repository_code: "collab".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(
        h.files.get("F1").unwrap()["analysis"]["analysis_state"],
        "SUPPRESSED"
    );
    assert_eq!(h.analyses.get("A1").unwrap()["analysis_state"], "SUPPRESSED");
    assert_eq!(h.files.repo_codes("F1"), vec!["collab"]);
}

#[tokio::test]
async fn test_donors_are_merged_into_documents() {
    let collab = repository("collab");
    let mut source = analysis("A1", "S1", "F1", "DO1");
    let mut extra = source.samples[0].clone();
    extra.sample_id = "SA-extra".to_string();
    source.samples.push(extra);
    let h = harness(MockMetadata::default().with(&collab, vec![source]));

    h.indexer
        .index_analysis(&index_analysis("A1", "S1", "collab"))
        .await
        .unwrap();

    let document = h.files.get("F1").unwrap();
    let donors = document["donors"].as_array().unwrap();
    assert_eq!(donors.len(), 1);
    let samples = donors[0]["specimens"][0]["samples"].as_array().unwrap();
    let sample_ids: Vec<_> = samples.iter().map(|s| s["sample_id"].as_str().unwrap()).collect();
    assert_eq!(sample_ids, vec!["SA-A1", "SA-extra"]);
    assert_eq!(document["analysis"]["workflow"]["workflowName"], "alignment");
}

#[tokio::test]
async fn test_malformed_analysis_does_not_drop_the_study() {
    let collab = repository("collab");
    let h = harness(
        MockMetadata::default()
            .with(&collab, vec![analysis("A1", "S1", "F1", "DO1")])
            .with_malformed(json!({
                "analysisId": "A2",
                "studyId": "S1",
                "analysisState": "PUBLISHED"
            })),
    );

    let results = h
        .indexer
        .index_study(&IndexStudyCommand {
            study_id: "S1".to_string(),
            repository_code: "collab".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(h.files.ids(), vec!["F1"]);
    assert_eq!(h.analyses.ids(), vec!["A1"]);
    for result in results.values() {
        assert!(!result.successful);
        let failed: Vec<_> = result
            .failure_data
            .ids("analysisId")
            .unwrap()
            .iter()
            .cloned()
            .collect();
        assert_eq!(failed, vec!["A2"]);
        assert!(result.failure_data.ids("studyId").is_none());
    }

    let failures = h.notifications.named(NotificationName::FailedToFetchAnalysis);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].attributes["analysisId"], "A2");
    assert_eq!(failures[0].attributes["studyId"], "S1");
}

#[tokio::test(start_paused = true)]
async fn test_command_past_its_deadline_is_reported() {
    let h = harness(MockMetadata::default());

    let result = h
        .indexer
        .with_deadline(Some(Duration::from_secs(1)), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(IndexResults::new())
        })
        .await;

    assert!(matches!(result, Err(IndexerError::Unhandled(_))));
    let unhandled = h.notifications.named(NotificationName::UnhandledError);
    assert_eq!(unhandled.len(), 1);
    assert!(unhandled[0].attributes["err"]
        .as_str()
        .unwrap()
        .contains("timed out"));
}

#[tokio::test]
async fn test_command_without_deadline_runs_to_completion() {
    let h = harness(MockMetadata::default());

    let result = h
        .indexer
        .with_deadline(None, async { Ok(IndexResults::new()) })
        .await;

    assert!(result.unwrap().is_empty());
    assert_eq!(h.notifications.count(), 0);
}

