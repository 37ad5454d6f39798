//! Analysis to file-centric documents.

use analysis_indexer_shared::{
    Analysis, File, FileCentricAnalysis, FileCentricDocument, FileInfo, IndexFile,
    NotificationName, Properties, RepositoryRef, StudyRepository,
};

use super::donors::merge_donors;
use super::DocumentConverter;
use crate::errors::IndexerError;

const COMPRESSION_SUFFIXES: [&str; 4] = ["", ".gz", ".zip", ".b2zip"];
const INDEX_EXTENSIONS: [&str; 4] = [".bai", ".tbi", ".idx", ".tcg"];
const EXPERIMENT_INFO_KEY: &str = "info";

impl DocumentConverter for FileCentricDocument {
    const CONVERSION_FAILED: NotificationName = NotificationName::ConvertAnalysisToFileDocsFailed;

    /// One document per data file. Index files and XML manifests never become
    /// documents of their own.
    fn convert(
        analysis: &Analysis,
        repository: &StudyRepository,
    ) -> Result<Vec<Self>, IndexerError> {
        if analysis.samples.is_empty() {
            return Err(IndexerError::bad_data(format!(
                "analysis {} has no samples",
                analysis.analysis_id
            )));
        }

        // A file belongs to a single donor: the one of the first sample.
        let donor = merge_donors(&analysis.samples)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                IndexerError::bad_data(format!(
                    "analysis {} has no donor",
                    analysis.analysis_id
                ))
            })?;
        let repository_ref = RepositoryRef::new(repository, metadata_path(analysis, repository));
        let summary = analysis_summary(analysis);

        Ok(analysis
            .files
            .iter()
            .filter(|file| !is_index_file(&file.file_name) && !is_xml_file(&file.file_name))
            .map(|file| FileCentricDocument {
                object_id: file.object_id.clone(),
                study_id: analysis.study_id.clone(),
                data_type: file.data_type.clone(),
                file_type: file.file_type.clone(),
                file_access: file.file_access.clone(),
                analysis: summary.clone(),
                file: FileInfo {
                    name: file.file_name.clone(),
                    md5sum: file.file_md5sum.clone(),
                    size: file.file_size,
                    data_type: file.data_type.clone(),
                    index_file: find_index_file(file, &analysis.files),
                    info: file.info.clone(),
                },
                repositories: vec![repository_ref.clone()],
                donors: vec![donor.clone()],
            })
            .collect())
    }
}

fn analysis_summary(analysis: &Analysis) -> FileCentricAnalysis {
    FileCentricAnalysis {
        analysis_id: analysis.analysis_id.clone(),
        analysis_type: analysis.analysis_type.name.clone(),
        analysis_version: analysis.analysis_type.version,
        analysis_state: analysis.analysis_state.clone(),
        study_id: analysis.study_id.clone(),
        published_at: analysis.published_at,
        updated_at: analysis.updated_at,
        first_published_at: analysis.first_published_at,
        experiment: analysis.experiment.as_ref().map(without_info),
        data: analysis.data.clone(),
    }
}

fn without_info(experiment: &Properties) -> Properties {
    experiment
        .iter()
        .filter(|(key, _)| key.as_str() != EXPERIMENT_INFO_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// `<repository metadata path>/<object id of the analysis XML>`.
fn metadata_path(analysis: &Analysis, repository: &StudyRepository) -> String {
    let xml_object_id = analysis
        .files
        .iter()
        .find(|file| is_xml_file(&file.file_name))
        .map(|file| file.object_id.as_str())
        .unwrap_or("");
    format!("{}/{}", repository.metadata_path, xml_object_id)
}

/// Case-insensitive extension match that tolerates a compression suffix on
/// either side of the extension (`x.vcf.gz`, `x.gz.vcf`).
pub(crate) fn has_extension(file_name: &str, extension: &str) -> bool {
    let name = file_name.to_lowercase();
    let extension = extension.to_lowercase();
    COMPRESSION_SUFFIXES.iter().any(|suffix| {
        name.ends_with(&format!("{}{}", extension, suffix))
            || name.ends_with(&format!("{}{}", suffix, extension))
    })
}

pub(crate) fn is_index_file(file_name: &str) -> bool {
    INDEX_EXTENSIONS
        .iter()
        .any(|extension| has_extension(file_name, extension))
}

pub(crate) fn is_xml_file(file_name: &str) -> bool {
    has_extension(file_name, ".xml")
}

/// Candidate companion names for a data file, in lookup order.
fn index_file_names(file: &File) -> Vec<String> {
    let name = &file.file_name;
    if has_extension(&file.file_type, "bam") || has_extension(name, ".bam") {
        vec![format!("{}.bai", name)]
    } else if has_extension(&file.file_type, "vcf") || has_extension(name, ".vcf") {
        vec![
            format!("{}.tbi", name),
            format!("{}.idx", name),
            format!("{}.tcg", name),
        ]
    } else {
        Vec::new()
    }
}

/// Index format from the companion file name, e.g. `BAI`.
fn index_file_format(file_name: &str) -> String {
    INDEX_EXTENSIONS
        .iter()
        .find(|extension| has_extension(file_name, extension))
        .map(|extension| extension.trim_start_matches('.').to_uppercase())
        .unwrap_or_default()
}

/// First file of the analysis whose name is one of the companion names of `file`.
fn find_index_file(file: &File, files: &[File]) -> Option<IndexFile> {
    index_file_names(file).iter().find_map(|candidate| {
        files
            .iter()
            .find(|f| f.file_name.eq_ignore_ascii_case(candidate))
            .map(|f| IndexFile {
                object_id: f.object_id.clone(),
                name: f.file_name.clone(),
                file_type: index_file_format(&f.file_name),
                md5sum: f.file_md5sum.clone(),
                size: f.file_size,
            })
    })
}
