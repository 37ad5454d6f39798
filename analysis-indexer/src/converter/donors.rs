//! Donor / specimen / sample merge.
//!
//! Source samples each carry their own copy of the specimen and donor they
//! belong to. Documents instead hold one donor per donor id, with every
//! specimen of that donor and every sample of each specimen nested below it.

use analysis_indexer_shared::{
    Donor, IndexedDonor, IndexedSample, IndexedSpecimen, Sample, Specimen,
};

use crate::errors::IndexerError;

/// Merge the samples of an analysis into donor trees.
///
/// Donors, specimens and samples appear in order of first occurrence. A sample
/// seen twice under the same specimen is kept once.
///
/// # Errors
///
/// `BadData` if a sample has no donor or no specimen.
pub fn merge_donors(samples: &[Sample]) -> Result<Vec<IndexedDonor>, IndexerError> {
    let mut donors: Vec<IndexedDonor> = Vec::new();

    for sample in samples {
        let donor = sample.donor.as_ref().ok_or_else(|| {
            IndexerError::bad_data(format!("sample {} has no donor", sample.sample_id))
        })?;
        let specimen = sample.specimen.as_ref().ok_or_else(|| {
            IndexerError::bad_data(format!("sample {} has no specimen", sample.sample_id))
        })?;

        let donor_index = match donors.iter().position(|d| d.donor_id == donor.donor_id) {
            Some(index) => index,
            None => {
                donors.push(indexed_donor(donor));
                donors.len() - 1
            }
        };

        let specimens = &mut donors[donor_index].specimens;
        let specimen_index = match specimens
            .iter()
            .position(|s| s.specimen_id == specimen.specimen_id)
        {
            Some(index) => index,
            None => {
                specimens.push(indexed_specimen(specimen));
                specimens.len() - 1
            }
        };

        let samples = &mut specimens[specimen_index].samples;
        if !samples.iter().any(|s| s.sample_id == sample.sample_id) {
            samples.push(indexed_sample(sample));
        }
    }

    Ok(donors)
}

fn indexed_donor(donor: &Donor) -> IndexedDonor {
    IndexedDonor {
        donor_id: donor.donor_id.clone(),
        submitter_donor_id: donor.submitter_donor_id.clone(),
        gender: donor.gender.clone(),
        specimens: Vec::new(),
        info: donor.info.clone(),
    }
}

fn indexed_specimen(specimen: &Specimen) -> IndexedSpecimen {
    IndexedSpecimen {
        specimen_id: specimen.specimen_id.clone(),
        submitter_specimen_id: specimen.submitter_specimen_id.clone(),
        specimen_type: specimen.specimen_type.clone(),
        specimen_tissue_source: specimen.specimen_tissue_source.clone(),
        tumour_normal_designation: specimen.tumour_normal_designation.clone(),
        samples: Vec::new(),
        info: specimen.info.clone(),
    }
}

fn indexed_sample(sample: &Sample) -> IndexedSample {
    IndexedSample {
        sample_id: sample.sample_id.clone(),
        submitter_sample_id: sample.submitter_sample_id.clone(),
        matched_normal_submitter_sample_id: sample.matched_normal_submitter_sample_id.clone(),
        sample_type: sample.sample_type.clone(),
        info: sample.info.clone(),
    }
}
