//! Peptide-level report items: PSMs (or PSM sets) grouped by sequence and,
//! optionally, modifications
use crate::fdr::{matches_decoy_pattern, DecoyStrategy, FdrItem};
use crate::filter::{AttributeValue, Filterable, ItemClass, Target};
use crate::model::{Accession, Modification};
use crate::psm::{PsmItem, ReportPsm};
use crate::score::{ScoreKind, ScoreRegistry, Scored};
use crate::util::{finite, format_mass};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

mod modeller;

pub use modeller::PeptideModeller;

/// Identifier of the peptide a PSM belongs to: the sequence, followed by
/// `(position;mass)` for each modification when modifications count
pub fn peptide_string_id(item: &PsmItem, consider_modifications: bool) -> String {
    let mut id = item.sequence().to_string();
    if consider_modifications {
        if let Some(mods) = item.modifications() {
            for (pos, m) in mods {
                id.push_str(&format!("({};{})", pos, format_mass(m.mass)));
            }
        }
    }
    id
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ReportPeptide {
    id: String,
    sequence: String,
    items: Vec<PsmItem>,
    non_scoring_psms: BTreeSet<u64>,
    non_scoring_spectra: BTreeSet<String>,
    best_scores: BTreeMap<String, f64>,
    rank: Option<i64>,
    is_decoy: bool,
    fdr: f64,
    q_value: f64,
    fdr_score: f64,
    fdr_good: bool,
}

impl ReportPeptide {
    pub(crate) fn new(id: String, sequence: &str) -> Self {
        ReportPeptide {
            id,
            sequence: sequence.into(),
            items: Vec::new(),
            non_scoring_psms: BTreeSet::new(),
            non_scoring_spectra: BTreeSet::new(),
            best_scores: BTreeMap::new(),
            rank: None,
            is_decoy: false,
            fdr: f64::NAN,
            q_value: f64::NAN,
            fdr_score: f64::NAN,
            fdr_good: false,
        }
    }

    pub(crate) fn add_item(&mut self, item: PsmItem) {
        self.items.push(item);
    }

    /// The peptide's string id, see [`peptide_string_id`]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// PSMs of one file, or PSM sets for the overview
    pub fn items(&self) -> &[PsmItem] {
        &self.items
    }

    /// Every raw PSM behind the items
    pub fn psms(&self) -> impl Iterator<Item = &ReportPsm> {
        self.items.iter().flat_map(|i| i.psms().iter())
    }

    pub fn nr_psms(&self) -> usize {
        self.items.len()
    }

    /// Distinct spectrum identification keys
    pub fn spectrum_keys(&self) -> BTreeSet<&str> {
        self.psms().map(|p| p.spectrum_key()).collect()
    }

    pub fn nr_spectra(&self) -> usize {
        self.spectrum_keys().len()
    }

    /// Distinct accessions in order of appearance
    pub fn accessions(&self) -> Vec<Arc<Accession>> {
        let mut seen = BTreeSet::new();
        self.psms()
            .flat_map(|p| p.accessions().iter())
            .filter(|a| seen.insert(a.accession.clone()))
            .cloned()
            .collect()
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.psms()
            .map(|p| p.file_name().to_string())
            .filter(|n| seen.insert(n.clone()))
            .collect()
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.psms()
            .filter_map(|p| p.spectrum().source_id.clone())
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    /// Modifications of every PSM
    pub fn modifications(&self) -> Vec<Modification> {
        self.psms()
            .flat_map(|p| p.spectrum().modifications.values().cloned())
            .collect()
    }

    pub fn missed_cleavages(&self) -> Option<i32> {
        self.psms().next().map(|p| p.spectrum().missed_cleavages)
    }

    pub fn is_unique(&self) -> bool {
        let mut psms = self.psms().peekable();
        psms.peek().is_some() && psms.all(|p| p.is_unique())
    }

    pub fn rank(&self) -> Option<i64> {
        self.rank
    }

    pub fn is_decoy(&self) -> bool {
        self.is_decoy
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

    pub fn non_scoring_psms(&self) -> &BTreeSet<u64> {
        &self.non_scoring_psms
    }

    pub fn non_scoring_spectra(&self) -> &BTreeSet<String> {
        &self.non_scoring_spectra
    }

    /// Exclude a PSM from the peptide's best scores
    pub fn add_non_scoring_psm(&mut self, spectrum_id: u64, registry: &ScoreRegistry) {
        self.non_scoring_psms.insert(spectrum_id);
        self.refresh_best_scores(registry);
    }

    pub fn remove_non_scoring_psm(&mut self, spectrum_id: u64, registry: &ScoreRegistry) -> bool {
        let removed = self.non_scoring_psms.remove(&spectrum_id);
        self.refresh_best_scores(registry);
        removed
    }

    /// Exclude every PSM of a spectrum from the peptide's best scores
    pub fn add_non_scoring_spectrum(&mut self, spectrum_key: &str, registry: &ScoreRegistry) {
        self.non_scoring_spectra.insert(spectrum_key.into());
        self.refresh_best_scores(registry);
    }

    pub fn remove_non_scoring_spectrum(&mut self, spectrum_key: &str, registry: &ScoreRegistry) -> bool {
        let removed = self.non_scoring_spectra.remove(spectrum_key);
        self.refresh_best_scores(registry);
        removed
    }

    pub fn clear_non_scoring(&mut self, registry: &ScoreRegistry) {
        self.non_scoring_psms.clear();
        self.non_scoring_spectra.clear();
        self.refresh_best_scores(registry);
    }

    /// Items whose PSMs are not all excluded from scoring
    pub fn scoring_items(&self) -> impl Iterator<Item = &PsmItem> {
        self.items.iter().filter(move |item| {
            item.psms().iter().any(|p| {
                !self.non_scoring_psms.contains(&p.id())
                    && !self.non_scoring_spectra.contains(p.spectrum_key())
            })
        })
    }

    /// An item's value of a score, honouring the non-scoring PSMs and
    /// spectra
    pub fn item_score(&self, item: &PsmItem, short_name: &str, registry: &ScoreRegistry) -> Option<f64> {
        item.scoring_value(
            short_name,
            registry.comparator(short_name).as_ref(),
            &self.non_scoring_psms,
            &self.non_scoring_spectra,
        )
    }

    pub(crate) fn refresh_best_scores(&mut self, registry: &ScoreRegistry) {
        let names = self
            .items
            .iter()
            .flat_map(|i| i.score_short_names())
            .collect::<BTreeSet<_>>();

        let mut best = BTreeMap::new();
        for short in names {
            let comparator = registry.comparator(&short);
            let value = self
                .items
                .iter()
                .map(|i| self.item_score(i, &short, registry))
                .fold(None, |acc, v| match &comparator {
                    Some(cmp) => cmp.best(acc, v),
                    None => acc.or(v),
                });
            if let Some(v) = value {
                best.insert(short, v);
            }
        }
        self.best_scores = best;
    }

    /// Label the peptide. With an accession pattern, a peptide is a decoy
    /// if any of its accessions is, as for PSMs.
    pub(crate) fn update_decoy_status(&mut self, strategy: DecoyStrategy, pattern: Option<&Regex>) {
        self.is_decoy = match (strategy, pattern) {
            (DecoyStrategy::AccessionPattern, Some(re)) => {
                let accessions = self.accessions();
                matches_decoy_pattern(re, accessions.iter().map(|a| a.accession.as_str()))
            }
            (DecoyStrategy::AccessionPattern, None) => false,
            (DecoyStrategy::SearchEngine, _) => {
                let mut psms = self.psms().peekable();
                psms.peek().is_some() && psms.all(|p| p.spectrum().is_decoy == Some(true))
            }
            (DecoyStrategy::Inherit, _) => {
                !self.items.is_empty() && self.items.iter().all(PsmItem::is_decoy)
            }
        };
    }

    fn descriptions(&self, file_id: u64) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.psms()
            .flat_map(|p| {
                let file = if file_id == 0 { p.file_id() } else { file_id };
                p.accessions()
                    .iter()
                    .filter_map(move |a| a.description(file).map(String::from))
            })
            .filter(|d| seen.insert(d.clone()))
            .collect()
    }
}

impl Scored for ReportPeptide {
    fn score(&self, short_name: &str) -> Option<f64> {
        if short_name == ScoreKind::PeptideQValue.short_name() {
            finite(self.q_value)
        } else if short_name == ScoreKind::PeptideFdrScore.short_name() {
            finite(self.fdr_score)
        } else {
            self.best_scores.get(short_name).copied()
        }
    }
}

impl crate::rank::Rankable for ReportPeptide {
    fn set_rank(&mut self, rank: Option<i64>) {
        self.rank = rank;
    }
}

impl FdrItem for ReportPeptide {
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

impl Filterable for ReportPeptide {
    fn item_class(&self) -> ItemClass {
        ItemClass::Peptide
    }

    fn attribute(&self, target: &Target, file_id: u64) -> Option<AttributeValue> {
        let value = match target {
            Target::Accessions => AttributeValue::Texts(
                self.accessions()
                    .iter()
                    .filter(|a| a.found_in(file_id))
                    .map(|a| a.accession.clone())
                    .collect(),
            ),
            Target::Descriptions => AttributeValue::Texts(self.descriptions(file_id)),
            Target::FileNames => AttributeValue::Texts(self.file_names()),
            Target::MissedCleavages => AttributeValue::Number(self.missed_cleavages()? as f64),
            Target::Modifications => AttributeValue::Modifications(self.modifications()),
            Target::Sequence => AttributeValue::Text(self.sequence.clone()),
            Target::SourceIds => AttributeValue::Texts(self.source_ids()),
            Target::Unique => AttributeValue::Bool(self.is_unique()),
            Target::Rank => AttributeValue::Number(self.rank? as f64),
            Target::NrAccessions => AttributeValue::Number(self.accessions().len() as f64),
            Target::NrPsms => AttributeValue::Number(self.nr_psms() as f64),
            Target::NrSpectra => AttributeValue::Number(self.nr_spectra() as f64),
            Target::Score(short) => AttributeValue::Number(self.score(short)?),
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

    fn item(id: u64, file: u64, seq: &str, score: f64, acc: &str) -> PsmItem {
        let spectrum = Spectrum::new(id, file, seq, 2, 400.0 + id as f64)
            .with_score("mascot_score", score)
            .with_source_id(&format!("index={}", id))
            .with_unique(true)
            .with_modification(2, Modification::new('P', 15.994915).with_description("Oxidation"));
        PsmItem::Psm(ReportPsm::new(
            Arc::new(spectrum),
            &format!("file{}.dat", file),
            vec![Arc::new(Accession::new(acc).with_file(file))],
            format!("spectrum{}", id),
        ))
    }

    fn registry() -> ScoreRegistry {
        let mut r = ScoreRegistry::new();
        r.register_kind(ScoreKind::MascotScore);
        r
    }

    #[test]
    fn string_ids() {
        let i = item(1, 1, "PEPTIDE", 10.0, "P1");
        assert_eq!(peptide_string_id(&i, false), "PEPTIDE");
        assert_eq!(peptide_string_id(&i, true), "PEPTIDE(2;15.9949)");
    }

    #[test]
    fn aggregates_and_scores() {
        let registry = registry();
        let mut pep = ReportPeptide::new("PEPTIDE".into(), "PEPTIDE");
        pep.add_item(item(1, 1, "PEPTIDE", 10.0, "P1"));
        pep.add_item(item(2, 1, "PEPTIDE", 30.0, "s_P2"));
        pep.refresh_best_scores(&registry);

        assert_eq!(pep.score("mascot_score"), Some(30.0));
        assert_eq!(pep.nr_psms(), 2);
        assert_eq!(pep.nr_spectra(), 2);
        assert_eq!(pep.accessions().len(), 2);
        assert_eq!(pep.source_ids(), vec!["index=1".to_string(), "index=2".to_string()]);
        assert_eq!(pep.modifications().len(), 2);
        assert!(pep.is_unique());

        pep.add_non_scoring_psm(2, &registry);
        assert_eq!(pep.score("mascot_score"), Some(10.0));
        assert_eq!(pep.scoring_items().count(), 1);
        pep.add_non_scoring_spectrum("spectrum1", &registry);
        assert_eq!(pep.score("mascot_score"), None);
        pep.clear_non_scoring(&registry);
        assert_eq!(pep.score("mascot_score"), Some(30.0));

        let f = new_filter("nr_spectra_per_peptide_filter", "GEQ", "2", false).unwrap();
        assert!(f.satisfies(&pep, 0));
        let f = new_filter("peptide_source_id_list_filter", "EQ", "index=1", false).unwrap();
        assert!(!f.satisfies(&pep, 0));
        let f = new_filter("peptide_modifications_filter", "HAS_DESC", "Oxidation", false).unwrap();
        assert!(f.satisfies(&pep, 0));
    }

    #[test]
    fn decoy_status() {
        let re = crate::util::anchored_regex("s_.*").unwrap();
        let mut pep = ReportPeptide::new("PEPTIDE".into(), "PEPTIDE");
        pep.add_item(item(1, 1, "PEPTIDE", 10.0, "s_P1"));
        pep.update_decoy_status(DecoyStrategy::AccessionPattern, Some(&re));
        assert!(pep.is_decoy());

        pep.update_decoy_status(DecoyStrategy::SearchEngine, None);
        assert!(!pep.is_decoy());

        let mut target = ReportPeptide::new("PEPTIDE".into(), "PEPTIDE");
        target.add_item(item(2, 1, "PEPTIDE", 10.0, "P2"));
        target.update_decoy_status(DecoyStrategy::AccessionPattern, Some(&re));
        assert!(!target.is_decoy());
    }

    #[test]
    fn mixed_accessions_follow_the_psm_rule() {
        let re = crate::util::anchored_regex("s_.*").unwrap();
        let mut pep = ReportPeptide::new("PEPTIDE".into(), "PEPTIDE");
        pep.add_item(item(1, 1, "PEPTIDE", 10.0, "P1"));
        pep.add_item(item(2, 1, "PEPTIDE", 12.0, "s_P2"));
        pep.update_decoy_status(DecoyStrategy::AccessionPattern, Some(&re));

        let psm_decoy = matches_decoy_pattern(&re, ["P1", "s_P2"].into_iter());
        assert!(psm_decoy);
        assert_eq!(pep.is_decoy(), psm_decoy);
    }
}
