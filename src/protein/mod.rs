//! Protein-level report items and the settings of protein inference
use crate::error::Error;
use crate::fdr::{matches_decoy_pattern, DecoyStrategy, FdrItem};
use crate::filter::{AttributeValue, Filterable, ItemClass, Target};
use crate::model::{Accession, Modification};
use crate::peptide::ReportPeptide;
use crate::score::{ScoreKind, Scored};
use crate::util::finite;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod inference;
mod modeller;
mod scoring;

pub use inference::{infer, InferenceInput, InferenceOutput};
pub use modeller::ProteinModeller;
pub use scoring::{protein_score_values, score_protein};

/// How protein groups are chosen from the peptide evidence
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum InferenceMethod {
    /// Report the fewest proteins that explain every peptide
    OccamsRazor,
    /// Report every group that has peptides
    ReportAll,
}

impl InferenceMethod {
    pub fn short_name(&self) -> &'static str {
        match self {
            InferenceMethod::OccamsRazor => "inference_occams_razor",
            InferenceMethod::ReportAll => "inference_report_all",
        }
    }
}

impl FromStr for InferenceMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inference_occams_razor" | "occams_razor" => Ok(InferenceMethod::OccamsRazor),
            "inference_report_all" | "report_all" => Ok(InferenceMethod::ReportAll),
            _ => Err(Error::UnknownInference(s.into())),
        }
    }
}

/// How the base scores of a protein are combined into the protein score
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ScoringMethod {
    /// Product of higher-is-better scores, `-Σlog10` of lower-is-better ones
    Multiplicative,
    Additive,
    /// The multiplicative rule applied to the `1/n`-th powers
    GeometricMean,
}

impl ScoringMethod {
    pub fn short_name(&self) -> &'static str {
        match self {
            ScoringMethod::Multiplicative => "scoring_multiplicative",
            ScoringMethod::Additive => "scoring_additive",
            ScoringMethod::GeometricMean => "geometric_mean_scoring",
        }
    }
}

impl FromStr for ScoringMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scoring_multiplicative" | "multiplicative" => Ok(ScoringMethod::Multiplicative),
            "scoring_additive" | "additive" => Ok(ScoringMethod::Additive),
            "geometric_mean_scoring" | "geometric_mean" => Ok(ScoringMethod::GeometricMean),
            _ => Err(Error::UnknownScoring(s.into())),
        }
    }
}

/// Which PSM values feed the protein score
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PsmForScoring {
    /// The best value of each peptide
    Best,
    /// Every scoring PSM of each peptide
    All,
}

impl PsmForScoring {
    pub fn short_name(&self) -> &'static str {
        match self {
            PsmForScoring::Best => "best",
            PsmForScoring::All => "all",
        }
    }
}

impl FromStr for PsmForScoring {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" => Ok(PsmForScoring::Best),
            "all" => Ok(PsmForScoring::All),
            _ => Err(Error::UnknownScoring(s.into())),
        }
    }
}

/// Input the inference could not make sense of. The affected item is left
/// out of the report, which is different from being filtered out.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Inconsistency {
    /// A spectrum of a peptide is in no PSM set
    MissingPsmSet { spectrum_id: u64, peptide: String },
    /// A group references a peptide the graph does not have
    MissingPeptide { group_id: u64, sequence: String },
    /// A group references a child group the graph does not have
    MissingGroup { group_id: u64, parent: u64 },
    /// A group references an accession the graph does not have
    MissingAccession { group_id: u64, accession: String },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::MissingPsmSet { spectrum_id, peptide } => {
                write!(f, "spectrum {} of peptide {} is in no PSM set", spectrum_id, peptide)
            }
            Inconsistency::MissingPeptide { group_id, sequence } => {
                write!(f, "group {} references unknown peptide {}", group_id, sequence)
            }
            Inconsistency::MissingGroup { group_id, parent } => {
                write!(f, "group {} references unknown group {}", parent, group_id)
            }
            Inconsistency::MissingAccession { group_id, accession } => {
                write!(f, "group {} references unknown accession {}", group_id, accession)
            }
        }
    }
}

/// A reported protein: one or more accessions sharing the same peptide
/// evidence, with the proteins whose evidence is a strict subset of it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ReportProtein {
    /// Id of the group the protein was built from
    id: u64,
    accessions: BTreeMap<String, Arc<Accession>>,
    representative: Option<String>,
    peptides: BTreeMap<String, ReportPeptide>,
    subsets: Vec<ReportProtein>,
    score: f64,
    rank: Option<i64>,
    is_decoy: bool,
    accession_decoy_states: BTreeMap<String, Option<bool>>,
    fdr: f64,
    q_value: f64,
    fdr_score: f64,
    fdr_good: bool,
}

impl ReportProtein {
    pub(crate) fn new(id: u64) -> Self {
        ReportProtein {
            id,
            accessions: BTreeMap::new(),
            representative: None,
            peptides: BTreeMap::new(),
            subsets: Vec::new(),
            score: f64::NAN,
            rank: None,
            is_decoy: false,
            accession_decoy_states: BTreeMap::new(),
            fdr: f64::NAN,
            q_value: f64::NAN,
            fdr_score: f64::NAN,
            fdr_good: false,
        }
    }

    /// Add an accession, the first one added represents the protein
    pub(crate) fn add_accession(&mut self, accession: Arc<Accession>) {
        let name = accession.accession.clone();
        if self.accessions.contains_key(&name) {
            return;
        }
        if self.representative.is_none() {
            self.representative = Some(name.clone());
        }
        self.accession_decoy_states.insert(name.clone(), None);
        self.accessions.insert(name, accession);
    }

    /// Add a peptide unless one with the same string id is already there
    pub(crate) fn add_peptide(&mut self, peptide: ReportPeptide) -> bool {
        if self.peptides.contains_key(peptide.id()) {
            return false;
        }
        self.peptides.insert(peptide.id().to_string(), peptide);
        true
    }

    pub(crate) fn add_subset(&mut self, protein: ReportProtein) {
        if !self.subsets.iter().any(|s| s.id == protein.id) {
            self.subsets.push(protein);
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn representative(&self) -> Option<&Accession> {
        self.representative
            .as_ref()
            .and_then(|r| self.accessions.get(r))
            .map(|a| a.as_ref())
    }

    /// Accessions in sorted order
    pub fn accessions(&self) -> impl Iterator<Item = &Arc<Accession>> {
        self.accessions.values()
    }

    pub fn accession_names(&self) -> impl Iterator<Item = &str> {
        self.accessions.keys().map(String::as_str)
    }

    pub fn peptides(&self) -> impl Iterator<Item = &ReportPeptide> {
        self.peptides.values()
    }

    pub fn peptide_ids(&self) -> BTreeSet<&str> {
        self.peptides.keys().map(String::as_str).collect()
    }

    pub fn subsets(&self) -> &[ReportProtein] {
        &self.subsets
    }

    pub(crate) fn subsets_mut(&mut self) -> &mut [ReportProtein] {
        &mut self.subsets
    }

    pub fn nr_peptides(&self) -> usize {
        self.peptides.len()
    }

    pub fn nr_psms(&self) -> usize {
        self.peptides.values().map(ReportPeptide::nr_psms).sum()
    }

    /// Distinct spectrum identification keys over all peptides
    pub fn nr_spectra(&self) -> usize {
        self.peptides
            .values()
            .flat_map(|p| p.spectrum_keys())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Peptides with at least one PSM flagged unique by the search engine
    pub fn nr_unique_peptides(&self) -> usize {
        self.peptides
            .values()
            .filter(|p| p.psms().any(|psm| psm.spectrum().is_unique == Some(true)))
            .count()
    }

    /// Peptides whose accessions are exactly the protein's accessions
    pub fn nr_group_unique_peptides(&self) -> usize {
        let own = self.accessions.keys().map(String::as_str).collect::<BTreeSet<_>>();
        self.peptides
            .values()
            .filter(|p| {
                let accessions = p.accessions();
                accessions.iter().map(|a| a.accession.as_str()).collect::<BTreeSet<_>>() == own
            })
            .count()
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub(crate) fn set_score(&mut self, score: f64) {
        self.score = score;
    }

    pub fn rank(&self) -> Option<i64> {
        self.rank
    }

    pub fn is_decoy(&self) -> bool {
        self.is_decoy
    }

    /// Decoy state of one accession, `None` before the states were updated
    pub fn accession_decoy_state(&self, accession: &str) -> Option<bool> {
        self.accession_decoy_states.get(accession).copied().flatten()
    }

    pub fn fdr(&self) -> f64 {
        self.fdr
    }

    pub fn q_value(&self) -> f64 {
        self.q_value
    }

    pub fn fdr_score(&self) -> f64 {
        self.fdr_score
    }

    pub fn is_fdr_good(&self) -> bool {
        self.fdr_good
    }

    /// Label the protein. By accession pattern it is a decoy if any of its
    /// accessions is, as for PSMs. Otherwise it is a decoy unless one of its
    /// PSMs is a target, using the PSM-level decoy state where a PSM FDR
    /// exists.
    pub(crate) fn update_decoy_status(&mut self, strategy: DecoyStrategy, pattern: Option<&Regex>) {
        match (strategy, pattern) {
            (DecoyStrategy::AccessionPattern, Some(re)) => {
                for name in self.accessions.keys() {
                    let matched = matches_decoy_pattern(re, std::iter::once(name.as_str()));
                    self.accession_decoy_states.insert(name.clone(), Some(matched));
                }
                self.is_decoy = matches_decoy_pattern(re, self.accessions.keys().map(String::as_str));
            }
            (DecoyStrategy::AccessionPattern, None) => {
                self.is_decoy = false;
            }
            (DecoyStrategy::SearchEngine, _) | (DecoyStrategy::Inherit, _) => {
                let mut decoy = true;
                let mut targets = BTreeSet::new();
                for psm in self.peptides.values().flat_map(|p| p.psms()) {
                    let target = if finite(psm.fdr_score()).is_some() {
                        !psm.is_decoy()
                    } else {
                        psm.spectrum().is_decoy != Some(true)
                    };
                    if target {
                        decoy = false;
                        targets.extend(psm.accession_names().map(String::from));
                    }
                }
                for name in self.accessions.keys() {
                    self.accession_decoy_states
                        .insert(name.clone(), Some(!targets.contains(name)));
                }
                self.is_decoy = decoy;
            }
        }
    }

    fn descriptions(&self, file_id: u64) -> Vec<String> {
        self.accessions
            .values()
            .filter_map(|a| a.description(file_id).map(String::from))
            .collect()
    }

    fn file_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.peptides
            .values()
            .flat_map(|p| p.file_names())
            .filter(|n| seen.insert(n.clone()))
            .collect()
    }

    fn modifications(&self) -> Vec<Modification> {
        self.peptides.values().flat_map(|p| p.modifications()).collect()
    }
}

impl Scored for ReportProtein {
    fn score(&self, short_name: &str) -> Option<f64> {
        if short_name == ScoreKind::ProteinScore.short_name() {
            finite(self.score)
        } else {
            None
        }
    }
}

impl crate::rank::Rankable for ReportProtein {
    fn set_rank(&mut self, rank: Option<i64>) {
        self.rank = rank;
    }
}

impl FdrItem for ReportProtein {
    fn is_decoy(&self) -> bool {
        self.is_decoy
    }

    fn set_fdr(&mut self, fdr: f64) {
        self.fdr = fdr;
    }

    fn set_q_value(&mut self, q_value: f64) {
        self.q_value = q_value;
    }

    fn set_fdr_score(&mut self, fdr_score: f64) {
        self.fdr_score = fdr_score;
    }

    fn set_fdr_good(&mut self, fdr_good: bool) {
        self.fdr_good = fdr_good;
    }
}

impl Filterable for ReportProtein {
    fn item_class(&self) -> ItemClass {
        ItemClass::Protein
    }

    fn attribute(&self, target: &Target, file_id: u64) -> Option<AttributeValue> {
        let value = match target {
            Target::Accessions => AttributeValue::Texts(
                self.accessions
                    .values()
                    .filter(|a| a.found_in(file_id))
                    .map(|a| a.accession.clone())
                    .collect(),
            ),
            Target::Descriptions => AttributeValue::Texts(self.descriptions(file_id)),
            Target::FileNames => AttributeValue::Texts(self.file_names()),
            Target::Modifications => AttributeValue::Modifications(self.modifications()),
            Target::Sequences => AttributeValue::Texts(
                self.peptides.values().map(|p| p.sequence().to_string()).collect(),
            ),
            Target::Rank => AttributeValue::Number(self.rank? as f64),
            Target::NrAccessions => AttributeValue::Number(self.accessions.len() as f64),
            Target::NrPeptides => AttributeValue::Number(self.nr_peptides() as f64),
            Target::NrPsms => AttributeValue::Number(self.nr_psms() as f64),
            Target::NrSpectra => AttributeValue::Number(self.nr_spectra() as f64),
            Target::NrUniquePeptides => AttributeValue::Number(self.nr_unique_peptides() as f64),
            Target::NrGroupUniquePeptides => {
                AttributeValue::Number(self.nr_group_unique_peptides() as f64)
            }
            Target::Score(short) => AttributeValue::Number(Scored::score(self, short)?),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::new_filter;
    use crate::model::Spectrum;
    use crate::psm::{PsmItem, ReportPsm};

    fn peptide(seq: &str, spectra: &[(u64, &[&str], bool)]) -> ReportPeptide {
        let mut pep = ReportPeptide::new(seq.into(), seq);
        for (id, accs, unique) in spectra {
            let spectrum = Spectrum::new(*id, 1, seq, 2, 300.0 + *id as f64)
                .with_score("mascot_score", 20.0 + *id as f64)
                .with_unique(*unique);
            let accessions = accs
                .iter()
                .map(|a| Arc::new(Accession::new(a).with_description(1, &format!("protein {}", a))))
                .collect();
            pep.add_item(PsmItem::Psm(ReportPsm::new(
                Arc::new(spectrum),
                "search.dat",
                accessions,
                format!("key{}", id),
            )));
        }
        pep
    }

    fn protein() -> ReportProtein {
        let mut prot = ReportProtein::new(1);
        prot.add_accession(Arc::new(Accession::new("Y").with_description(1, "protein Y")));
        prot.add_accession(Arc::new(Accession::new("X").with_description(1, "protein X")));
        prot.add_peptide(peptide("AAA", &[(1, &["X", "Y"], false), (2, &["X", "Y"], false)]));
        prot.add_peptide(peptide("BBB", &[(3, &["X"], true)]));
        prot
    }

    #[test]
    fn method_names() {
        assert_eq!("occams_razor".parse::<InferenceMethod>(), Ok(InferenceMethod::OccamsRazor));
        assert_eq!(
            InferenceMethod::ReportAll.short_name().parse::<InferenceMethod>(),
            Ok(InferenceMethod::ReportAll)
        );
        assert_eq!("geometric_mean".parse::<ScoringMethod>(), Ok(ScoringMethod::GeometricMean));
        assert_eq!("all".parse::<PsmForScoring>(), Ok(PsmForScoring::All));
        assert!(matches!(
            "spectrum_extractor".parse::<InferenceMethod>(),
            Err(Error::UnknownInference(_))
        ));
        assert!("max".parse::<ScoringMethod>().is_err());
    }

    #[test]
    fn aggregates() {
        let mut prot = protein();
        assert_eq!(prot.representative().map(|a| a.accession.as_str()), Some("Y"));
        assert_eq!(prot.accession_names().collect::<Vec<_>>(), vec!["X", "Y"]);
        assert!(!prot.add_peptide(peptide("AAA", &[(9, &["X"], true)])));
        assert_eq!(prot.nr_peptides(), 2);
        assert_eq!(prot.nr_psms(), 3);
        assert_eq!(prot.nr_spectra(), 3);
        assert_eq!(prot.nr_unique_peptides(), 1);
        assert_eq!(prot.nr_group_unique_peptides(), 1);

        prot.set_score(12.5);
        assert_eq!(Scored::score(&prot, "protein_score"), Some(12.5));

        let f = new_filter("nr_peptides_per_protein_filter", "GEQ", "2", false).unwrap();
        assert!(f.satisfies(&prot, 0));
        let f = new_filter("protein_sequence_list_filter", "CON", "BBB", false).unwrap();
        assert!(f.satisfies(&prot, 0));
        let f = new_filter("protein_score_filter", "GT", "20", false).unwrap();
        assert!(!f.satisfies(&prot, 0));
        let f = new_filter("protein_description_filter", "REG", "protein .*", false).unwrap();
        assert!(f.satisfies(&prot, 1));
    }

    #[test]
    fn decoy_states() {
        let mut prot = ReportProtein::new(3);
        prot.add_accession(Arc::new(Accession::new("s_X")));
        prot.add_accession(Arc::new(Accession::new("Y")));
        assert_eq!(prot.accession_decoy_state("s_X"), None);

        let re = crate::util::anchored_regex("s_.*").unwrap();
        prot.update_decoy_status(DecoyStrategy::AccessionPattern, Some(&re));
        assert!(prot.is_decoy());
        assert_eq!(
            prot.is_decoy(),
            matches_decoy_pattern(&re, prot.accession_names()),
        );
        assert_eq!(prot.accession_decoy_state("s_X"), Some(true));
        assert_eq!(prot.accession_decoy_state("Y"), Some(false));

        // no spectrum carries a target flag from the search engine
        prot.add_peptide(peptide("AAA", &[(1, &["Y"], false)]));
        prot.update_decoy_status(DecoyStrategy::SearchEngine, None);
        assert!(!prot.is_decoy());
        assert_eq!(prot.accession_decoy_state("Y"), Some(false));
        assert_eq!(prot.accession_decoy_state("s_X"), Some(true));
    }
}
