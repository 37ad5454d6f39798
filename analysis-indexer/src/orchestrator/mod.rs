//! The indexer façade.
//!
//! Drives every command end to end: fetch metadata, drop excluded analyses,
//! convert, resolve against the index, write. Per-analysis failures are
//! reported as notifications and failing ids; only a missing repository fails
//! a whole command.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use analysis_indexer_repository::{SearchIndexService, ANALYSIS_ID_LABEL};
use analysis_indexer_shared::{
    merge_results, Analysis, AnalysisCentricDocument, AnalysisIdentifier, FailureData,
    FileCentricDocument, IndexAnalysisCommand, IndexAnalysisPayloadCommand, IndexDocument,
    IndexRepositoryCommand, IndexResult, IndexResults, IndexStudyCommand, IndexerNotification,
    NotificationName, RemoveAnalysisCommand, StudyRepository,
};
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::IndexerConfig;
use crate::converter::DocumentConverter;
use crate::errors::IndexerError;
use crate::metadata::{RejectedAnalysis, StudyMetadataSource};
use crate::notifier::Notifier;
use crate::registry::RepositoryRegistry;
use crate::resolver::{self, Replicated};
use crate::rules::ExclusionRules;

const STUDY_ID_LABEL: &str = "studyId";
const REPO_CODE_LABEL: &str = "repoCode";

/// Entry point for every indexing command.
pub struct Indexer {
    metadata: Arc<dyn StudyMetadataSource>,
    registry: Arc<dyn RepositoryRegistry>,
    notifier: Notifier,
    rules: ExclusionRules,
    file_centric: Option<SearchIndexService<FileCentricDocument>>,
    analysis_centric: Option<SearchIndexService<AnalysisCentricDocument>>,
    config: IndexerConfig,
}

impl Indexer {
    /// Create an indexer with no exclusion rules and no document kind enabled.
    pub fn new(
        metadata: Arc<dyn StudyMetadataSource>,
        registry: Arc<dyn RepositoryRegistry>,
        notifier: Notifier,
    ) -> Self {
        Self {
            metadata,
            registry,
            notifier,
            rules: ExclusionRules::default(),
            file_centric: None,
            analysis_centric: None,
            config: IndexerConfig::default(),
        }
    }

    pub fn with_rules(mut self, rules: ExclusionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Enable file-centric documents, written through `service`.
    pub fn with_file_centric(mut self, service: SearchIndexService<FileCentricDocument>) -> Self {
        self.file_centric = Some(service);
        self
    }

    /// Enable analysis-centric documents, written through `service`.
    pub fn with_analysis_centric(
        mut self,
        service: SearchIndexService<AnalysisCentricDocument>,
    ) -> Self {
        self.analysis_centric = Some(service);
        self
    }

    pub fn with_config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run a command under an optional caller deadline.
    ///
    /// On expiry the command is dropped and `UNHANDLED_ERROR` is published.
    /// Partitions already sent to the index are not rolled back.
    pub async fn with_deadline<F>(
        &self,
        deadline: Option<Duration>,
        command: F,
    ) -> Result<IndexResults, IndexerError>
    where
        F: Future<Output = Result<IndexResults, IndexerError>>,
    {
        let Some(deadline) = deadline else {
            return command.await;
        };

        match timeout(deadline, command).await {
            Ok(results) => results,
            Err(_) => {
                let e = IndexerError::unhandled(format!(
                    "command timed out after {}s",
                    deadline.as_secs()
                ));
                self.notifier.notify(
                    IndexerNotification::new(NotificationName::UnhandledError)
                        .with("err", e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Fetch one analysis from its repository and index it.
    #[instrument(skip(self, command), fields(
        analysis_id = %command.analysis_identifier.analysis_id,
        study_id = %command.analysis_identifier.study_id,
        repo_code = %command.analysis_identifier.repository_code,
    ))]
    pub async fn index_analysis(
        &self,
        command: &IndexAnalysisCommand,
    ) -> Result<IndexResults, IndexerError> {
        let identifier = &command.analysis_identifier;
        let repository = self.repository(&identifier.repository_code)?;

        let analysis = match self
            .metadata
            .get_analysis(
                &identifier.analysis_id,
                &identifier.study_id,
                &repository.base_url,
            )
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                let e = IndexerError::from(e);
                self.notifier.notify(
                    IndexerNotification::new(NotificationName::FailedToFetchAnalysis)
                        .with("analysisId", identifier.analysis_id.as_str())
                        .with("studyId", identifier.study_id.as_str())
                        .with("repoCode", repository.code.as_str())
                        .with("err", e.to_string()),
                );
                return Ok(self.failed_results(ANALYSIS_ID_LABEL, &identifier.analysis_id));
            }
        };

        Ok(self.index_analyses(&[analysis], &repository).await)
    }

    /// Index an analysis already in hand, without calling the metadata source.
    #[instrument(skip(self, command), fields(
        analysis_id = %command.analysis.analysis_id,
        repo_code = %command.repository_code,
    ))]
    pub async fn index_analysis_payload(
        &self,
        command: &IndexAnalysisPayloadCommand,
    ) -> Result<IndexResults, IndexerError> {
        let repository = self.repository(&command.repository_code)?;
        Ok(self
            .index_analyses(std::slice::from_ref(&command.analysis), &repository)
            .await)
    }

    /// Index every indexable analysis of one study.
    #[instrument(skip(self, command), fields(
        study_id = %command.study_id,
        repo_code = %command.repository_code,
    ))]
    pub async fn index_study(
        &self,
        command: &IndexStudyCommand,
    ) -> Result<IndexResults, IndexerError> {
        let repository = self.repository(&command.repository_code)?;
        Ok(self.index_study_in(&command.study_id, &repository).await)
    }

    /// Index every study of one repository, a bounded number at a time.
    #[instrument(skip(self, command), fields(repo_code = %command.repository_code))]
    pub async fn index_repository(
        &self,
        command: &IndexRepositoryCommand,
    ) -> Result<IndexResults, IndexerError> {
        let repository = self.repository(&command.repository_code)?;

        let studies = match self.metadata.get_studies(&repository.base_url).await {
            Ok(studies) => studies,
            Err(e) => {
                let e = IndexerError::from(e);
                self.notifier.notify(
                    IndexerNotification::new(NotificationName::FetchRepoStudiesFailed)
                        .with("repoCode", repository.code.as_str())
                        .with("err", e.to_string()),
                );
                return Ok(self.failed_results(REPO_CODE_LABEL, &repository.code));
            }
        };

        info!(studies = studies.len(), "Indexing repository");

        let repository = &repository;
        let results = stream::iter(studies)
            .map(|study_id| async move { self.index_study_in(&study_id, repository).await })
            .buffer_unordered(self.config.max_concurrent_studies.max(1))
            .fold(IndexResults::new(), |mut acc, results| async move {
                merge_results(&mut acc, results);
                acc
            })
            .await;

        Ok(results)
    }

    /// Remove a repository from every document of an analysis. Documents left
    /// without any repository are deleted.
    #[instrument(skip(self, command), fields(
        analysis_id = %command.analysis_identifier.analysis_id,
        repo_code = %command.analysis_identifier.repository_code,
    ))]
    pub async fn remove_analysis(
        &self,
        command: &RemoveAnalysisCommand,
    ) -> Result<IndexResults, IndexerError> {
        let identifier = &command.analysis_identifier;
        let mut results = IndexResults::new();

        if let Some(service) = &self.file_centric {
            let result = self.remove_from(service, identifier).await;
            results.insert(result.index_name.clone(), result);
        }
        if let Some(service) = &self.analysis_centric {
            let result = self.remove_from(service, identifier).await;
            results.insert(result.index_name.clone(), result);
        }

        Ok(results)
    }

    fn repository(&self, code: &str) -> Result<StudyRepository, IndexerError> {
        self.registry.get_by_code(code).ok_or_else(|| {
            let e = IndexerError::not_found(format!("repository {} is not configured", code));
            self.notifier.notify(
                IndexerNotification::new(NotificationName::FailedToFetchRepository)
                    .with("repoCode", code)
                    .with("err", e.to_string()),
            );
            e
        })
    }

    async fn index_study_in(&self, study_id: &str, repository: &StudyRepository) -> IndexResults {
        let study = match self
            .metadata
            .get_study_analyses(study_id, &repository.base_url)
            .await
        {
            Ok(study) => study,
            Err(e) => {
                let e = IndexerError::from(e);
                self.notifier.notify(
                    IndexerNotification::new(NotificationName::StudyAnalysesFetchFailed)
                        .with("studyId", study_id)
                        .with("repoCode", repository.code.as_str())
                        .with("err", e.to_string()),
                );
                return self.failed_results(STUDY_ID_LABEL, study_id);
            }
        };

        info!(
            study_id,
            repo_code = %repository.code,
            analyses = study.analyses.len(),
            rejected = study.rejected.len(),
            "Fetched study analyses"
        );

        let mut results = self.index_analyses(&study.analyses, repository).await;
        for rejected in &study.rejected {
            merge_results(&mut results, self.reject(study_id, repository, rejected));
        }
        results
    }

    /// Report a study entry that could not be decoded as an analysis.
    fn reject(
        &self,
        study_id: &str,
        repository: &StudyRepository,
        rejected: &RejectedAnalysis,
    ) -> IndexResults {
        let e = IndexerError::bad_data(rejected.error.as_str());
        warn!(
            study_id,
            analysis_id = ?rejected.analysis_id,
            error = %e,
            "Malformed analysis skipped"
        );

        let mut notification = IndexerNotification::new(NotificationName::FailedToFetchAnalysis)
            .with("studyId", study_id)
            .with("repoCode", repository.code.as_str())
            .with("err", e.to_string());
        if let Some(analysis_id) = &rejected.analysis_id {
            notification = notification.with("analysisId", analysis_id.as_str());
        }
        self.notifier.notify(notification);

        match &rejected.analysis_id {
            Some(analysis_id) => self.failed_results(ANALYSIS_ID_LABEL, analysis_id),
            None => self.failed_results(STUDY_ID_LABEL, study_id),
        }
    }

    async fn index_analyses(
        &self,
        analyses: &[Analysis],
        repository: &StudyRepository,
    ) -> IndexResults {
        let included: Vec<&Analysis> = analyses
            .iter()
            .filter(|analysis| match self.rules.first_match(analysis) {
                Some((kind, id)) => {
                    info!(
                        analysis_id = %analysis.analysis_id,
                        excluded_by = %kind,
                        excluded_id = id,
                        "Analysis excluded"
                    );
                    false
                }
                None => true,
            })
            .collect();

        let mut results = IndexResults::new();
        if let Some(service) = &self.file_centric {
            let result = self.index_kind(service, &included, repository).await;
            results.insert(result.index_name.clone(), result);
        }
        if let Some(service) = &self.analysis_centric {
            let result = self.index_kind(service, &included, repository).await;
            results.insert(result.index_name.clone(), result);
        }
        results
    }

    /// Convert, resolve and write the documents of one shape.
    async fn index_kind<D>(
        &self,
        service: &SearchIndexService<D>,
        analyses: &[&Analysis],
        repository: &StudyRepository,
    ) -> IndexResult
    where
        D: DocumentConverter + Replicated,
    {
        let mut failure_data = FailureData::new();
        let mut documents = Vec::new();

        for analysis in analyses {
            match D::convert(analysis, repository) {
                Ok(converted) => documents.extend(converted),
                Err(e) => {
                    self.notifier.notify(
                        IndexerNotification::new(D::CONVERSION_FAILED)
                            .with("analysisId", analysis.analysis_id.as_str())
                            .with("studyId", analysis.study_id.as_str())
                            .with("repoCode", repository.code.as_str())
                            .with("err", e.to_string()),
                    );
                    failure_data.add_failure(ANALYSIS_ID_LABEL, analysis.analysis_id.as_str());
                }
            }
        }

        if documents.is_empty() {
            debug!(index = %service.index_name(), "Nothing to write");
            return result_of(service.index_name(), failure_data);
        }

        let resolution = match resolver::resolve(service, &self.notifier, documents.clone()).await
        {
            Ok(resolution) => resolution,
            Err(e) => {
                for document in &documents {
                    failure_data.add_failure(ANALYSIS_ID_LABEL, document.analysis_id());
                    failure_data.add_failure(D::ID_LABEL, document.document_id());
                }
                self.notify_index_failure(
                    service.index_name(),
                    repository,
                    &failure_data,
                    &e.to_string(),
                );
                return IndexResult::failure(service.index_name(), failure_data);
            }
        };
        failure_data.merge(resolution.failure_data);

        let written = service.upsert(&resolution.to_write).await;
        if !written.successful {
            self.notify_index_failure(
                service.index_name(),
                repository,
                &written.failure_data,
                "bulk upsert failed",
            );
        }

        info!(
            index = %service.index_name(),
            written = resolution.to_write.len(),
            conflicts = resolution.conflicts,
            successful = written.successful,
            "Indexed documents"
        );

        written.merge(result_of(service.index_name(), failure_data))
    }

    async fn remove_from<D: IndexDocument>(
        &self,
        service: &SearchIndexService<D>,
        identifier: &AnalysisIdentifier,
    ) -> IndexResult {
        match service
            .remove_repository(&identifier.analysis_id, &identifier.repository_code)
            .await
        {
            Ok(summary) => {
                info!(
                    index = %service.index_name(),
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "Removed analysis from repository"
                );
                IndexResult::success(service.index_name())
            }
            Err(e) => {
                self.notifier.notify(
                    IndexerNotification::new(NotificationName::FailedToRemoveAnalysis)
                        .with("analysisId", identifier.analysis_id.as_str())
                        .with("studyId", identifier.study_id.as_str())
                        .with("repoCode", identifier.repository_code.as_str())
                        .with("index", service.index_name())
                        .with("err", e.to_string()),
                );
                IndexResult::failure(
                    service.index_name(),
                    FailureData::of(ANALYSIS_ID_LABEL, identifier.analysis_id.as_str()),
                )
            }
        }
    }

    fn notify_index_failure(
        &self,
        index: &str,
        repository: &StudyRepository,
        failure_data: &FailureData,
        err: &str,
    ) {
        let analysis_ids: Vec<String> = failure_data
            .ids(ANALYSIS_ID_LABEL)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        warn!(index, failed_analyses = analysis_ids.len(), "Index request failed");

        self.notifier.notify(
            IndexerNotification::new(NotificationName::IndexReqFailed)
                .with("index", index)
                .with("repoCode", repository.code.as_str())
                .with("analysisIds", analysis_ids)
                .with("err", err),
        );
    }

    /// One failed result per enabled index, all reporting the same id.
    fn failed_results(&self, label: &str, id: &str) -> IndexResults {
        let mut results = IndexResults::new();
        let names = [
            self.file_centric.as_ref().map(|s| s.index_name()),
            self.analysis_centric.as_ref().map(|s| s.index_name()),
        ];
        for name in names.into_iter().flatten() {
            results.insert(
                name.to_string(),
                IndexResult::failure(name, FailureData::of(label, id)),
            );
        }
        results
    }
}

fn result_of(index_name: &str, failure_data: FailureData) -> IndexResult {
    if failure_data.is_empty() {
        IndexResult::success(index_name)
    } else {
        IndexResult::failure(index_name, failure_data)
    }
}
