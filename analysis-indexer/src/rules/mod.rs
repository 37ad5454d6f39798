//! Exclusion rule engine.
//!
//! Rules are grouped by the kind of entity they target. An analysis is
//! excluded as soon as one of its entities matches a rule, checking kinds in
//! [`EntityKind::EVALUATION_ORDER`].

mod source;

pub use source::{parse_rules, JsonFileRuleSource, StaticRuleSource};

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use analysis_indexer_shared::Analysis;
use async_trait::async_trait;

use crate::errors::IndexerError;

/// Kind of entity an exclusion rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Study,
    Analysis,
    File,
    Sample,
    Specimen,
    Donor,
}

/// Returns the ids of every entity of one kind found in an analysis.
pub type IdExtractor = fn(&Analysis) -> Vec<&str>;

impl EntityKind {
    pub const EVALUATION_ORDER: [EntityKind; 6] = [
        EntityKind::Study,
        EntityKind::Analysis,
        EntityKind::File,
        EntityKind::Sample,
        EntityKind::Specimen,
        EntityKind::Donor,
    ];

    /// Accessor for the identifier field rules of this kind are matched against.
    pub fn id_extractor(self) -> IdExtractor {
        match self {
            EntityKind::Study => study_ids,
            EntityKind::Analysis => analysis_ids,
            EntityKind::File => file_ids,
            EntityKind::Sample => sample_ids,
            EntityKind::Specimen => specimen_ids,
            EntityKind::Donor => donor_ids,
        }
    }
}

fn study_ids(analysis: &Analysis) -> Vec<&str> {
    vec![analysis.study_id.as_str()]
}

fn analysis_ids(analysis: &Analysis) -> Vec<&str> {
    vec![analysis.analysis_id.as_str()]
}

fn file_ids(analysis: &Analysis) -> Vec<&str> {
    analysis.files.iter().map(|f| f.object_id.as_str()).collect()
}

fn sample_ids(analysis: &Analysis) -> Vec<&str> {
    analysis.samples.iter().map(|s| s.sample_id.as_str()).collect()
}

fn specimen_ids(analysis: &Analysis) -> Vec<&str> {
    analysis
        .samples
        .iter()
        .filter_map(|s| s.specimen.as_ref())
        .map(|s| s.specimen_id.as_str())
        .collect()
}

fn donor_ids(analysis: &Analysis) -> Vec<&str> {
    analysis
        .samples
        .iter()
        .filter_map(|s| s.donor.as_ref())
        .map(|d| d.donor_id.as_str())
        .collect()
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Study => "study",
            EntityKind::Analysis => "analysis",
            EntityKind::File => "file",
            EntityKind::Sample => "sample",
            EntityKind::Specimen => "specimen",
            EntityKind::Donor => "donor",
        };
        f.write_str(name)
    }
}

/// Excludes entities whose id is in a fixed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdExclusionRule {
    ids: HashSet<String>,
}

impl IdExclusionRule {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn applies(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionRule {
    ById(IdExclusionRule),
}

impl ExclusionRule {
    /// Whether the rule matches an entity with this id.
    pub fn applies(&self, id: &str) -> bool {
        match self {
            ExclusionRule::ById(rule) => rule.applies(id),
        }
    }
}

/// An immutable snapshot of every configured exclusion rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRules {
    rules: BTreeMap<EntityKind, Vec<ExclusionRule>>,
}

impl ExclusionRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for one entity kind.
    pub fn with_rule(mut self, kind: EntityKind, rule: ExclusionRule) -> Self {
        self.rules.entry(kind).or_default().push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }

    pub fn rules_for(&self, kind: EntityKind) -> &[ExclusionRule] {
        self.rules.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first entity of `analysis` matched by a rule, in evaluation order.
    pub fn first_match<'a>(&self, analysis: &'a Analysis) -> Option<(EntityKind, &'a str)> {
        if self.is_empty() {
            return None;
        }
        EntityKind::EVALUATION_ORDER.iter().find_map(|&kind| {
            let rules = self.rules_for(kind);
            if rules.is_empty() {
                return None;
            }
            kind.id_extractor()(analysis)
                .into_iter()
                .find(|id| rules.iter().any(|rule| rule.applies(id)))
                .map(|id| (kind, id))
        })
    }

    pub fn should_exclude(&self, analysis: &Analysis) -> bool {
        self.first_match(analysis).is_some()
    }
}

/// Where exclusion rules come from. Read once at startup.
#[async_trait]
pub trait ExclusionRuleSource: Send + Sync {
    async fn get_rules(&self) -> Result<ExclusionRules, IndexerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::test_fixtures::{analysis, file, sample};

    fn by_id(ids: &[&str]) -> ExclusionRule {
        ExclusionRule::ById(IdExclusionRule::new(ids.iter().copied()))
    }

    #[test]
    fn test_empty_rules_never_exclude() {
        let rules = ExclusionRules::new();

        assert!(!rules.should_exclude(&analysis("A1", "S1")));
    }

    #[test]
    fn test_each_kind_matches_its_own_ids() {
        let mut source = analysis("A1", "S1");
        source.files.push(file("F2", "calls.vcf", "VCF"));
        source.samples.push(sample("SA2", "SP2", "DO2"));

        let cases = [
            (EntityKind::Study, "S1"),
            (EntityKind::Analysis, "A1"),
            (EntityKind::File, "F2"),
            (EntityKind::Sample, "SA2"),
            (EntityKind::Specimen, "SP2"),
            (EntityKind::Donor, "DO2"),
        ];

        for (kind, id) in cases {
            let rules = ExclusionRules::new().with_rule(kind, by_id(&[id]));
            assert_eq!(rules.first_match(&source), Some((kind, id)), "{}", kind);
        }
    }

    #[test]
    fn test_ids_of_another_kind_do_not_match() {
        let source = analysis("A1", "S1");
        let rules = ExclusionRules::new()
            .with_rule(EntityKind::Donor, by_id(&["SA1", "A1", "S1"]))
            .with_rule(EntityKind::Study, by_id(&["DO1"]));

        assert!(!rules.should_exclude(&source));
    }

    #[test]
    fn test_study_is_checked_before_donor() {
        let source = analysis("A1", "S1");
        let rules = ExclusionRules::new()
            .with_rule(EntityKind::Donor, by_id(&["DO1"]))
            .with_rule(EntityKind::Study, by_id(&["S1"]));

        assert_eq!(rules.first_match(&source), Some((EntityKind::Study, "S1")));
    }

    #[test]
    fn test_kind_with_no_rules_is_empty() {
        let rules = ExclusionRules::new().with_rule(EntityKind::File, by_id(&["F9"]));

        assert!(rules.rules_for(EntityKind::Sample).is_empty());
        assert!(!rules.is_empty());
    }
}
