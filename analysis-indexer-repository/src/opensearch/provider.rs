//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsAliasParts},
    BulkParts, DeleteByQueryParts, MgetParts, OpenSearch, UpdateByQueryParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::errors::{is_transient_status, SearchIndexError};
use crate::interfaces::SearchIndexProvider;
use crate::opensearch::index_config::{get_index_settings, DocumentKind, IndexConfig};
use crate::types::{RemovalSummary, UpsertDocumentRequest};

/// Number of times OpenSearch retries a scripted update on a version conflict.
const RETRY_ON_CONFLICT: u32 = 3;

/// OpenSearch provider implementation.
///
/// # Example
///
/// ```ignore
/// use analysis_indexer_repository::opensearch::{DocumentKind, IndexConfig};
/// let config = IndexConfig::new("file_centric", 1, DocumentKind::FileCentric);
/// let provider = OpenSearchProvider::new("http://localhost:9200", config).await?;
/// provider.ensure_index_exists().await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - The index configuration containing alias, version and document kind
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            alias = %index_config.alias,
            version = index_config.version,
            kind = ?index_config.kind,
            "Created OpenSearch provider"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Painless script merging repository references into an existing document.
    ///
    /// A repository is appended only when no entry with the same code exists. The
    /// analysis state and timestamps are always refreshed.
    fn upsert_script(kind: DocumentKind) -> String {
        let path = kind.lifecycle_path();
        format!(
            "for (def repo : params.repositories) {{ \
                boolean present = false; \
                for (def existing : ctx._source.repositories) {{ \
                    if (existing.code == repo.code) {{ present = true; break; }} \
                }} \
                if (!present) {{ ctx._source.repositories.add(repo); }} \
            }} \
            {path}.analysis_state = params.analysis_state; \
            if (params.published_at != null) {{ {path}.published_at = params.published_at; }} \
            if (params.updated_at != null) {{ {path}.updated_at = params.updated_at; }} \
            if (params.first_published_at != null) {{ {path}.first_published_at = params.first_published_at; }}",
            path = path
        )
    }

    /// Build the NDJSON body of a bulk upsert.
    fn upsert_body(
        kind: DocumentKind,
        requests: &[UpsertDocumentRequest],
    ) -> Result<Vec<JsonBody<Value>>, SearchIndexError> {
        let script = Self::upsert_script(kind);
        let mut body = Vec::with_capacity(requests.len() * 2);

        for request in requests {
            if request.document_id.is_empty() {
                return Err(SearchIndexError::validation(format!(
                    "Document of analysis {} has an empty id",
                    request.analysis_id
                )));
            }
            let repositories = serde_json::to_value(&request.repositories)
                .map_err(|e| SearchIndexError::serialization(e.to_string()))?;

            body.push(
                json!({
                    "update": {
                        "_id": request.document_id,
                        "retry_on_conflict": RETRY_ON_CONFLICT
                    }
                })
                .into(),
            );
            body.push(
                json!({
                    "script": {
                        "source": script,
                        "lang": "painless",
                        "params": {
                            "repositories": repositories,
                            "analysis_state": request.lifecycle.state,
                            "published_at": request.lifecycle.published_at,
                            "updated_at": request.lifecycle.updated_at,
                            "first_published_at": request.lifecycle.first_published_at
                        }
                    },
                    "upsert": request.document
                })
                .into(),
            );
        }

        Ok(body)
    }

    /// Turn item-level failures of a bulk response into an error.
    ///
    /// The error is transient if any failing item has a transient status, so the
    /// whole request gets retried.
    fn check_bulk_response(body: &Value) -> Result<(), SearchIndexError> {
        if !body["errors"].as_bool().unwrap_or(false) {
            return Ok(());
        }

        let mut transient_status = None;
        let mut failures = Vec::new();
        for item in body["items"].as_array().into_iter().flatten() {
            let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
                continue;
            };
            if result.get("error").is_none() {
                continue;
            }
            let status = result["status"].as_u64().unwrap_or(0) as u16;
            if is_transient_status(status) {
                transient_status = Some(status);
            }
            failures.push(format!(
                "{} ({}): {}",
                result["_id"].as_str().unwrap_or("?"),
                status,
                result["error"]["reason"].as_str().unwrap_or("unknown reason")
            ));
        }

        let message = format!("{} item(s) failed: {}", failures.len(), failures.join("; "));
        match transient_status {
            Some(status) => Err(SearchIndexError::status(status, message)),
            None => Err(SearchIndexError::bulk_index(message)),
        }
    }

    /// Return the response body as JSON, or an error for non-success statuses.
    async fn read_json(response: Response, action: &str) -> Result<Value, SearchIndexError> {
        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, action, "Request failed");
            return Err(SearchIndexError::status(
                status.as_u16(),
                format!("{} failed: {}", action, error_body),
            ));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    fn index_name(&self) -> &str {
        &self.index_config.alias
    }

    /// Create the versioned index with its alias unless the alias already exists.
    #[instrument(skip(self), fields(alias = %self.index_config.alias))]
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        let alias = self.index_config.alias.as_str();
        let response = self
            .client
            .indices()
            .exists_alias(IndicesExistsAliasParts::Name(&[alias]))
            .send()
            .await?;

        if response.status_code().is_success() {
            debug!("Index alias already exists");
            return Ok(());
        }

        let index_name = self.index_config.versioned_index_name();
        let mut body = get_index_settings(self.index_config.kind);
        body["aliases"] = json!({ alias: {} });

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&index_name))
            .body(body)
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if error_body.contains("resource_already_exists_exception") {
                debug!(index = %index_name, "Index created concurrently");
                return Ok(());
            }
            return Err(SearchIndexError::index_creation(format!(
                "Creating {} failed with status {}: {}",
                index_name, status, error_body
            )));
        }

        info!(index = %index_name, "Created index and alias");
        Ok(())
    }

    /// Apply the conditional upserts of one partition in a single bulk request.
    async fn bulk_upsert(&self, requests: &[UpsertDocumentRequest]) -> Result<(), SearchIndexError> {
        if requests.is_empty() {
            return Ok(());
        }
        let body = Self::upsert_body(self.index_config.kind, requests)?;

        let response = self
            .client
            .bulk(BulkParts::Index(&self.index_config.alias))
            .body(body)
            .send()
            .await?;

        let body = Self::read_json(response, "Bulk upsert").await?;
        Self::check_bulk_response(&body)?;

        debug!(count = requests.len(), "Bulk upsert applied");
        Ok(())
    }

    async fn get_documents(&self, ids: &[String]) -> Result<Vec<Value>, SearchIndexError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .mget(MgetParts::Index(&self.index_config.alias))
            .body(json!({ "ids": ids }))
            .send()
            .await?;

        let body = Self::read_json(response, "Multi get").await?;
        let documents = body["docs"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|doc| doc["found"].as_bool().unwrap_or(false))
            .map(|doc| doc["_source"].clone())
            .collect();

        Ok(documents)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<(), SearchIndexError> {
        if ids.is_empty() {
            return Ok(());
        }

        let body: Vec<JsonBody<Value>> = ids
            .iter()
            .map(|id| json!({ "delete": { "_id": id } }).into())
            .collect();

        let response = self
            .client
            .bulk(BulkParts::Index(&self.index_config.alias))
            .body(body)
            .send()
            .await?;

        let body = Self::read_json(response, "Bulk delete")
            .await
            .map_err(|e| match e {
                SearchIndexError::StatusError { .. } => e,
                other => SearchIndexError::delete(other.to_string()),
            })?;
        Self::check_bulk_response(&body)?;

        debug!(count = ids.len(), "Documents deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(alias = %self.index_config.alias))]
    async fn remove_repository(
        &self,
        analysis_id: &str,
        repository_code: &str,
    ) -> Result<RemovalSummary, SearchIndexError> {
        let alias = self.index_config.alias.as_str();
        let analysis_field = self.index_config.kind.analysis_id_field();

        let response = self
            .client
            .update_by_query(UpdateByQueryParts::Index(&[alias]))
            .refresh(true)
            .body(json!({
                "query": { "term": { analysis_field: analysis_id } },
                "script": {
                    "source": "ctx._source.repositories.removeIf(r -> r.code == params.code)",
                    "lang": "painless",
                    "params": { "code": repository_code }
                }
            }))
            .send()
            .await?;
        let updated = Self::read_json(response, "Update by query").await?;

        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[alias]))
            .refresh(true)
            .body(json!({
                "query": {
                    "bool": {
                        "filter": [{ "term": { analysis_field: analysis_id } }],
                        "must_not": [{ "exists": { "field": "repositories.code" } }]
                    }
                }
            }))
            .send()
            .await?;
        let deleted = Self::read_json(response, "Delete by query").await?;

        let summary = RemovalSummary {
            updated: updated["updated"].as_u64().unwrap_or(0),
            deleted: deleted["deleted"].as_u64().unwrap_or(0),
        };
        debug!(updated = summary.updated, deleted = summary.deleted, "Repository removed");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_indexer_shared::AnalysisLifecycle;

    fn request(id: &str) -> UpsertDocumentRequest {
        UpsertDocumentRequest {
            document_id: id.to_string(),
            analysis_id: "A1".to_string(),
            document: json!({ "object_id": id, "repositories": [] }),
            repositories: vec![],
            lifecycle: AnalysisLifecycle {
                state: "PUBLISHED".to_string(),
                published_at: None,
                updated_at: None,
                first_published_at: None,
            },
        }
    }

    #[test]
    fn test_upsert_script_targets_lifecycle_path() {
        let file_script = OpenSearchProvider::upsert_script(DocumentKind::FileCentric);
        assert!(file_script.contains("ctx._source.analysis.analysis_state = params.analysis_state"));
        assert!(file_script.contains("existing.code == repo.code"));

        let analysis_script = OpenSearchProvider::upsert_script(DocumentKind::AnalysisCentric);
        assert!(analysis_script.contains("ctx._source.analysis_state = params.analysis_state"));
        assert!(!analysis_script.contains("ctx._source.analysis."));
    }

    #[test]
    fn test_upsert_body_pairs_action_and_source() {
        let body =
            OpenSearchProvider::upsert_body(DocumentKind::FileCentric, &[request("F1"), request("F2")])
                .unwrap();
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn test_upsert_body_rejects_empty_id() {
        let result = OpenSearchProvider::upsert_body(DocumentKind::FileCentric, &[request("")]);
        assert!(matches!(result, Err(SearchIndexError::ValidationError(_))));
    }

    #[test]
    fn test_check_bulk_response_ok() {
        let body = json!({ "errors": false, "items": [{ "update": { "_id": "F1", "status": 200 } }] });
        assert!(OpenSearchProvider::check_bulk_response(&body).is_ok());
    }

    #[test]
    fn test_check_bulk_response_permanent_failure() {
        let body = json!({
            "errors": true,
            "items": [
                { "update": { "_id": "F1", "status": 200 } },
                { "update": { "_id": "F2", "status": 400, "error": { "reason": "mapper_parsing_exception" } } }
            ]
        });
        let err = OpenSearchProvider::check_bulk_response(&body).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("F2"));
    }

    #[test]
    fn test_check_bulk_response_rejected_is_transient() {
        let body = json!({
            "errors": true,
            "items": [
                { "update": { "_id": "F1", "status": 429, "error": { "reason": "es_rejected_execution_exception" } } }
            ]
        });
        let err = OpenSearchProvider::check_bulk_response(&body).unwrap_err();
        assert!(err.is_transient());
    }
}
