//! Analysis to analysis-centric document.

use analysis_indexer_shared::{
    Analysis, AnalysisCentricDocument, AnalysisCentricFile, NotificationName, RepositoryRef,
    StudyRepository,
};

use super::donors::merge_donors;
use super::DocumentConverter;
use crate::errors::IndexerError;

impl DocumentConverter for AnalysisCentricDocument {
    const CONVERSION_FAILED: NotificationName =
        NotificationName::ConvertAnalysisToAnalysisDocsFailed;

    fn convert(
        analysis: &Analysis,
        repository: &StudyRepository,
    ) -> Result<Vec<Self>, IndexerError> {
        let donors = merge_donors(&analysis.samples)?;

        let files = analysis
            .files
            .iter()
            .map(|file| AnalysisCentricFile {
                object_id: file.object_id.clone(),
                name: file.file_name.clone(),
                size: file.file_size,
                file_type: file.file_type.clone(),
                md5sum: file.file_md5sum.clone(),
                file_access: file.file_access.clone(),
                data_type: file.data_type.clone(),
                info: file.info.clone(),
            })
            .collect();

        Ok(vec![AnalysisCentricDocument {
            analysis_id: analysis.analysis_id.clone(),
            analysis_type: analysis.analysis_type.name.clone(),
            analysis_version: analysis.analysis_type.version,
            analysis_state: analysis.analysis_state.clone(),
            study_id: analysis.study_id.clone(),
            published_at: analysis.published_at,
            updated_at: analysis.updated_at,
            first_published_at: analysis.first_published_at,
            donors,
            files,
            repositories: vec![RepositoryRef::new(
                repository,
                repository.metadata_path.clone(),
            )],
            experiment: analysis.experiment.clone(),
            data: analysis.data.clone(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::test_fixtures::{analysis, file, repository, sample};
    use analysis_indexer_shared::Properties;
    use serde_json::json;

    #[test]
    fn test_one_document_with_all_files() {
        let mut source = analysis("A1", "S1");
        source.files = vec![
            file("F1", "reads.bam", "BAM"),
            file("F2", "reads.bam.bai", "BAI"),
            file("F3", "A1.xml", "XML"),
        ];

        let documents = AnalysisCentricDocument::convert(&source, &repository("aws")).unwrap();

        assert_eq!(documents.len(), 1);
        let document = &documents[0];
        assert_eq!(document.analysis_id, "A1");
        assert_eq!(document.analysis_type, "sequencingRead");
        assert_eq!(document.files.len(), 3);
        assert_eq!(document.repositories[0].code, "aws");
    }

    #[test]
    fn test_donors_are_merged_across_samples() {
        let mut source = analysis("A1", "S1");
        source.samples = vec![
            sample("SA1", "SP1", "DO1"),
            sample("SA2", "SP1", "DO1"),
            sample("SA3", "SP2", "DO2"),
        ];

        let documents = AnalysisCentricDocument::convert(&source, &repository("aws")).unwrap();

        let donors = &documents[0].donors;
        assert_eq!(donors.len(), 2);
        assert_eq!(donors[0].specimens.len(), 1);
        assert_eq!(donors[0].specimens[0].samples.len(), 2);
        assert_eq!(donors[1].donor_id, "DO2");
    }

    #[test]
    fn test_experiment_is_copied_verbatim() {
        let mut source = analysis("A1", "S1");
        let mut experiment = Properties::new();
        experiment.insert("info".to_string(), json!({"lane": 3}));
        source.experiment = Some(experiment.clone());

        let documents = AnalysisCentricDocument::convert(&source, &repository("aws")).unwrap();

        assert_eq!(documents[0].experiment, Some(experiment));
    }
}
