//! Cross-repository consistency.
//!
//! The same file or analysis may be published by several repositories. Before
//! a batch is written, each converted document is compared with what is
//! already indexed under its id:
//!
//! - nothing indexed: the document is created;
//! - a replica of the same entity: the write appends the repository reference
//!   (a no-op when that repository is already listed);
//! - anything else is a conflict: both sides are reported, the stale indexed
//!   document is deleted and the new one is held back for this pass.
//!
//! The append itself happens in the backend's conditional upsert, never as a
//! read-modify-write here.

use std::collections::HashMap;

use analysis_indexer_repository::{SearchIndexError, SearchIndexService, ANALYSIS_ID_LABEL};
use analysis_indexer_shared::{
    AnalysisCentricDocument, FailureData, FileCentricDocument, IndexDocument,
    IndexerNotification, NotificationName,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::notifier::Notifier;

/// A document shape whose conflicts are reported under a dedicated name.
pub trait Replicated: IndexDocument {
    const CONFLICT: NotificationName;
}

impl Replicated for FileCentricDocument {
    const CONFLICT: NotificationName = NotificationName::IndexFileConflict;
}

impl Replicated for AnalysisCentricDocument {
    const CONFLICT: NotificationName = NotificationName::AnalysisConflict;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    /// Same entity, repository already listed.
    NoOp,
    /// Same entity, new repository to append.
    Merge,
    Conflict,
}

/// Decide what to do with `incoming` given the document indexed under its id.
pub fn decide<D: IndexDocument>(incoming: &D, indexed: Option<&D>) -> Decision {
    match indexed {
        None => Decision::Create,
        Some(indexed) if !indexed.is_valid_replica(incoming) => Decision::Conflict,
        Some(indexed)
            if incoming
                .repositories()
                .iter()
                .all(|r| indexed.has_repository(&r.code)) =>
        {
            Decision::NoOp
        }
        Some(_) => Decision::Merge,
    }
}

/// Outcome of resolving one batch.
#[derive(Debug)]
pub struct Resolution<D> {
    /// Documents to upsert.
    pub to_write: Vec<D>,
    /// Number of conflicts reported.
    pub conflicts: usize,
    /// Ids of conflicting documents whose stale copy could not be deleted.
    pub failure_data: FailureData,
}

/// Resolve a batch of freshly converted documents against the index.
///
/// # Errors
///
/// Fails only if the indexed state could not be read; nothing has been
/// written or notified in that case.
#[instrument(skip(service, notifier, documents), fields(index = %service.index_name(), count = documents.len()))]
pub async fn resolve<D: Replicated>(
    service: &SearchIndexService<D>,
    notifier: &Notifier,
    documents: Vec<D>,
) -> Result<Resolution<D>, SearchIndexError> {
    let mut ids: Vec<String> = documents
        .iter()
        .map(|d| d.document_id().to_string())
        .collect();
    ids.sort();
    ids.dedup();

    let indexed = service.fetch_existing(&ids).await?;

    let mut to_write = Vec::with_capacity(documents.len());
    let mut in_batch: HashMap<String, D> = HashMap::new();
    let mut stale: Vec<(D, D)> = Vec::new();
    let mut conflicts = 0;

    for document in documents {
        let id = document.document_id().to_string();

        match decide(&document, indexed.get(&id)) {
            Decision::Conflict => {
                // One report and one delete per stale id.
                let reported = stale.iter().any(|(kept, _)| kept.document_id() == id);
                if !reported {
                    if let Some(existing) = indexed.get(&id) {
                        stale.push((existing.clone(), document));
                    }
                }
                continue;
            }
            decision => debug!(document_id = %id, ?decision, "Resolved document"),
        }

        // Two documents of one batch claiming the same id.
        if let Some(earlier) = in_batch.get(&id) {
            if !earlier.is_valid_replica(&document) {
                conflicts += 1;
                report_conflict(notifier, earlier, &document);
                continue;
            }
        }
        in_batch.insert(id, document.clone());
        to_write.push(document);
    }

    let mut failure_data = FailureData::new();
    if !stale.is_empty() {
        let stale_ids: Vec<String> = stale
            .iter()
            .map(|(indexed, _)| indexed.document_id().to_string())
            .collect();

        for (indexed, incoming) in &stale {
            conflicts += 1;
            report_conflict(notifier, indexed, incoming);
        }

        match service.delete(&stale_ids).await {
            Ok(()) => info!(removed = stale_ids.len(), "Removed conflicting documents"),
            Err(e) => {
                error!(error = %e, "Failed to remove conflicting documents");
                for (indexed, _) in &stale {
                    failure_data.add_failure(ANALYSIS_ID_LABEL, indexed.analysis_id());
                    failure_data.add_failure(D::ID_LABEL, indexed.document_id());
                }
            }
        }
    }

    Ok(Resolution {
        to_write,
        conflicts,
        failure_data,
    })
}

fn report_conflict<D: Replicated>(notifier: &Notifier, indexed: &D, incoming: &D) {
    warn!(
        document_id = %incoming.document_id(),
        indexed_analysis = %indexed.analysis_id(),
        incoming_analysis = %incoming.analysis_id(),
        "Conflicting document"
    );

    notifier.notify(
        IndexerNotification::new(D::CONFLICT)
            .with(D::ID_LABEL, incoming.document_id())
            .with("analysisId", incoming.analysis_id())
            .with("studyId", incoming.study_id())
            .with("indexed", descriptor(indexed))
            .with("incoming", descriptor(incoming)),
    );
}

fn descriptor<D: IndexDocument>(document: &D) -> Value {
    let conflict = document.conflict_descriptor();
    json!({
        "id": conflict.id,
        "analysisId": conflict.analysis_id,
        "studyId": conflict.study_id,
        "repoCodes": conflict.repo_codes,
    })
}
