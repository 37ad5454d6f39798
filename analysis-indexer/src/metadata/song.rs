//! HTTP client for SONG study metadata services.

use std::time::Duration;

use analysis_indexer_shared::Analysis;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::de::DeserializeOwned;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use super::{AnalysisPage, MetadataError, StudyMetadataSource};

const DEFAULT_PAGE_LIMIT: usize = 25;
const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_STUDY_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 5;
const MAX_BACKOFF_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct SongClientConfig {
    /// Analyses requested per page.
    pub page_limit: usize,
    /// Retries after the first attempt, transient failures only.
    pub max_retries: usize,
    /// Timeout for study listing and paginated calls.
    pub study_timeout: Duration,
    /// Timeout for single analysis calls.
    pub analysis_timeout: Duration,
    /// Analysis states the indexer accepts, e.g. `PUBLISHED`.
    pub indexable_states: Vec<String>,
}

impl Default for SongClientConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            max_retries: DEFAULT_MAX_RETRIES,
            study_timeout: Duration::from_secs(DEFAULT_STUDY_TIMEOUT_SECS),
            analysis_timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            indexable_states: vec!["PUBLISHED".to_string()],
        }
    }
}

impl SongClientConfig {
    /// Parse a comma separated list of states. Blank entries are dropped.
    pub fn with_indexable_states(mut self, states: &str) -> Self {
        self.indexable_states = states
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self
    }
}

/// Production metadata source backed by the SONG REST API.
pub struct SongMetadataClient {
    client: ReqwestClient,
    config: SongClientConfig,
}

impl SongMetadataClient {
    pub fn new(config: SongClientConfig) -> Self {
        Self {
            client: ReqwestClient::new(),
            config,
        }
    }

    fn study_analyses_url(&self, base_url: &str, study_id: &str, offset: usize) -> String {
        format!(
            "{}/studies/{}/analysis/paginated?analysisStates={}&limit={}&offset={}",
            base_url.trim_end_matches('/'),
            study_id,
            self.config.indexable_states.join(","),
            self.config.page_limit,
            offset
        )
    }

    fn analysis_url(base_url: &str, study_id: &str, analysis_id: &str) -> String {
        format!(
            "{}/studies/{}/analysis/{}",
            base_url.trim_end_matches('/'),
            study_id,
            analysis_id
        )
    }

    fn studies_url(base_url: &str) -> String {
        format!("{}/studies/all", base_url.trim_end_matches('/'))
    }

    fn is_indexable(&self, state: &str) -> bool {
        self.config.indexable_states.iter().any(|s| s == state)
    }

    /// GET `url` and decode the body, retrying transient failures with
    /// exponential backoff (1s doubling, capped at 5s).
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
        not_found: &str,
    ) -> Result<T, MetadataError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(500)
            .max_delay(Duration::from_secs(MAX_BACKOFF_SECS))
            .map(jitter)
            .take(self.config.max_retries);

        RetryIf::spawn(
            strategy,
            || self.fetch(url, timeout, not_found),
            |e: &MetadataError| {
                let transient = e.is_transient();
                if transient {
                    warn!(url = %url, error = %e, "Metadata call failed, retrying");
                }
                transient
            },
        )
        .await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
        not_found: &str,
    ) -> Result<T, MetadataError> {
        debug!(url = %url, "Fetching metadata");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound(not_found.to_string()));
        }
        if !status.is_success() {
            return Err(MetadataError::Upstream(format!(
                "{} responded with {}",
                url, status
            )));
        }

        let bytes = response.bytes().await.map_err(|e| request_error(url, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| MetadataError::Decode(format!("{}: {}", url, e)))
    }
}

fn request_error(url: &str, err: reqwest::Error) -> MetadataError {
    if err.is_timeout() {
        MetadataError::Timeout(url.to_string())
    } else {
        MetadataError::Upstream(format!("{}: {}", url, err))
    }
}

#[async_trait]
impl StudyMetadataSource for SongMetadataClient {
    async fn get_analysis(
        &self,
        analysis_id: &str,
        study_id: &str,
        base_url: &str,
    ) -> Result<Analysis, MetadataError> {
        let not_found = format!(
            "analysis {} doesn't exist for study {} in {} (or is not in an indexable state)",
            analysis_id, study_id, base_url
        );
        let url = Self::analysis_url(base_url, study_id, analysis_id);

        let analysis: Analysis = self
            .get_json(&url, self.config.analysis_timeout, &not_found)
            .await?;

        if !self.is_indexable(&analysis.analysis_state) {
            return Err(MetadataError::NotFound(not_found));
        }
        Ok(analysis)
    }

    async fn get_study_analyses_page(
        &self,
        study_id: &str,
        base_url: &str,
        offset: usize,
    ) -> Result<AnalysisPage, MetadataError> {
        let not_found = format!("study {} doesn't exist in {}", study_id, base_url);
        let url = self.study_analyses_url(base_url, study_id, offset);
        self.get_json(&url, self.config.study_timeout, &not_found)
            .await
    }

    async fn get_studies(&self, base_url: &str) -> Result<Vec<String>, MetadataError> {
        let not_found = format!("no studies listing at {}", base_url);
        let url = Self::studies_url(base_url);
        self.get_json(&url, self.config.study_timeout, &not_found)
            .await
    }
}
