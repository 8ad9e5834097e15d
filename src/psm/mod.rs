//! PSM-level report items: single PSMs of one file, and PSM sets that
//! merge the PSMs of all files sharing an identification key
use crate::fdr::FdrItem;
use crate::filter::{AttributeValue, Filterable, ItemClass, Target};
use crate::model::{Accession, Modification, Spectrum};
use crate::score::{ScoreComparator, ScoreKind, ScoreRegistry, Scored};
use crate::util::finite;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

mod modeller;

pub use modeller::PsmModeller;

/// One PSM of one input file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ReportPsm {
    spectrum: Arc<Spectrum>,
    file_name: String,
    accessions: Vec<Arc<Accession>>,
    spectrum_key: String,
    rank: Option<i64>,
    identification_ranks: BTreeMap<String, i64>,
    is_decoy: bool,
    fdr: f64,
    q_value: f64,
    fdr_score: f64,
    fdr_good: bool,
}

impl ReportPsm {
    pub(crate) fn new(
        spectrum: Arc<Spectrum>,
        file_name: &str,
        accessions: Vec<Arc<Accession>>,
        spectrum_key: String,
    ) -> Self {
        ReportPsm {
            spectrum,
            file_name: file_name.into(),
            accessions,
            spectrum_key,
            rank: None,
            identification_ranks: BTreeMap::new(),
            is_decoy: false,
            fdr: f64::NAN,
            q_value: f64::NAN,
            fdr_score: f64::NAN,
            fdr_good: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.spectrum.id
    }

    pub fn file_id(&self) -> u64 {
        self.spectrum.file_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    pub fn sequence(&self) -> &str {
        &self.spectrum.sequence
    }

    pub fn accessions(&self) -> &[Arc<Accession>] {
        &self.accessions
    }

    pub fn accession_names(&self) -> impl Iterator<Item = &str> {
        self.accessions.iter().map(|a| a.accession.as_str())
    }

    /// Key of the identified spectrum, without peptide information
    pub fn spectrum_key(&self) -> &str {
        &self.spectrum_key
    }

    pub fn rank(&self) -> Option<i64> {
        self.rank
    }

    /// Rank among the PSMs of the same spectrum in this file
    pub fn identification_rank(&self, short_name: &str) -> Option<i64> {
        self.identification_ranks.get(short_name).copied()
    }

    pub(crate) fn set_identification_rank(&mut self, short_name: &str, rank: Option<i64>) {
        match rank {
            Some(r) => self.identification_ranks.insert(short_name.into(), r),
            None => self.identification_ranks.remove(short_name),
        };
    }

    pub fn is_decoy(&self) -> bool {
        self.is_decoy
    }

    pub(crate) fn set_decoy(&mut self, decoy: bool) {
        self.is_decoy = decoy;
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

    pub fn is_unique(&self) -> bool {
        self.spectrum.is_unique.unwrap_or(false)
    }

    /// Copy the labelling and FDR results of another instance of the same
    /// PSM
    pub(crate) fn copy_fdr_from(&mut self, other: &ReportPsm) {
        self.is_decoy = other.is_decoy;
        self.fdr = other.fdr;
        self.q_value = other.q_value;
        self.fdr_score = other.fdr_score;
        self.fdr_good = other.fdr_good;
        self.identification_ranks = other.identification_ranks.clone();
    }

    /// Short names of every score the PSM carries, computed ones included
    pub fn score_short_names(&self) -> impl Iterator<Item = &str> {
        let computed = [
            (ScoreKind::PsmFdrScore, self.fdr_score),
            (ScoreKind::PsmQValue, self.q_value),
        ];
        self.spectrum
            .scores
            .iter()
            .map(|s| s.short_name.as_str())
            .chain(
                computed
                    .into_iter()
                    .filter(|(_, v)| !v.is_nan())
                    .map(|(k, _)| k.short_name()),
            )
    }

    fn descriptions(&self, file_id: u64) -> Vec<String> {
        let file = if file_id == 0 { self.file_id() } else { file_id };
        self.accessions
            .iter()
            .filter_map(|a| a.description(file))
            .map(String::from)
            .collect()
    }
}

impl Scored for ReportPsm {
    fn score(&self, short_name: &str) -> Option<f64> {
        if short_name == ScoreKind::PsmFdrScore.short_name() {
            finite(self.fdr_score)
        } else if short_name == ScoreKind::PsmQValue.short_name() {
            finite(self.q_value)
        } else {
            self.spectrum.score(short_name).and_then(finite)
        }
    }
}

impl crate::rank::Rankable for ReportPsm {
    fn set_rank(&mut self, rank: Option<i64>) {
        self.rank = rank;
    }
}

impl FdrItem for ReportPsm {
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

fn spectrum_attribute(s: &Spectrum, target: &Target) -> Option<AttributeValue> {
    match target {
        Target::Charge => Some(AttributeValue::Number(s.charge as f64)),
        Target::DeltaMass => Some(AttributeValue::Number(s.delta_mass)),
        Target::DeltaPpm => Some(AttributeValue::Number(s.delta_ppm())),
        Target::MassToCharge => Some(AttributeValue::Number(s.mass_to_charge)),
        Target::MissedCleavages => Some(AttributeValue::Number(s.missed_cleavages as f64)),
        Target::Modifications => Some(AttributeValue::Modifications(
            s.modifications.values().cloned().collect(),
        )),
        Target::Sequence => Some(AttributeValue::Text(s.sequence.clone())),
        Target::SourceId => s.source_id.clone().map(AttributeValue::Text),
        _ => None,
    }
}

impl Filterable for ReportPsm {
    fn item_class(&self) -> ItemClass {
        ItemClass::Psm
    }

    fn attribute(&self, target: &Target, file_id: u64) -> Option<AttributeValue> {
        match target {
            Target::Accessions => Some(AttributeValue::Texts(
                self.accessions
                    .iter()
                    .filter(|a| a.found_in(file_id))
                    .map(|a| a.accession.clone())
                    .collect(),
            )),
            Target::Descriptions => Some(AttributeValue::Texts(self.descriptions(file_id))),
            Target::FileNames => Some(AttributeValue::Texts(vec![self.file_name.clone()])),
            Target::Rank => self.rank.map(|r| AttributeValue::Number(r as f64)),
            Target::Unique => Some(AttributeValue::Bool(self.is_unique())),
            Target::NrAccessions => Some(AttributeValue::Number(self.accessions.len() as f64)),
            Target::Score(short) => self.score(short).map(AttributeValue::Number),
            Target::IdentificationRank(short) => self
                .identification_rank(short)
                .map(|r| AttributeValue::Number(r as f64)),
            _ => spectrum_attribute(&self.spectrum, target),
        }
    }
}

/// PSMs of any number of files sharing one identification key
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ReportPsmSet {
    key: String,
    psms: Vec<ReportPsm>,
    best_scores: BTreeMap<String, f64>,
    rank: Option<i64>,
    is_decoy: bool,
    fdr: f64,
    q_value: f64,
    fdr_score: f64,
    fdr_good: bool,
    average_fdr_score: f64,
}

impl ReportPsmSet {
    pub(crate) fn new(key: String, psms: Vec<ReportPsm>, registry: &ScoreRegistry) -> Self {
        let mut set = ReportPsmSet {
            key,
            psms,
            best_scores: BTreeMap::new(),
            rank: None,
            is_decoy: false,
            fdr: f64::NAN,
            q_value: f64::NAN,
            fdr_score: f64::NAN,
            fdr_good: false,
            average_fdr_score: f64::NAN,
        };
        set.refresh_best_scores(registry);
        set.update_decoy_status();
        set
    }

    /// The set with only the given members, keeping the set-level values
    pub(crate) fn with_members(&self, psms: Vec<ReportPsm>, registry: &ScoreRegistry) -> Self {
        let mut set = ReportPsmSet {
            psms,
            ..self.clone()
        };
        set.refresh_best_scores(registry);
        set
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn psms(&self) -> &[ReportPsm] {
        &self.psms
    }

    pub(crate) fn psms_mut(&mut self) -> &mut [ReportPsm] {
        &mut self.psms
    }

    pub fn sequence(&self) -> &str {
        self.psms.first().map(|p| p.sequence()).unwrap_or("")
    }

    /// Distinct accessions of all members, in order of appearance
    pub fn accessions(&self) -> Vec<Arc<Accession>> {
        let mut seen = BTreeSet::new();
        self.psms
            .iter()
            .flat_map(|p| p.accessions.iter())
            .filter(|a| seen.insert(a.accession.clone()))
            .cloned()
            .collect()
    }

    pub fn file_ids(&self) -> BTreeSet<u64> {
        self.psms.iter().map(|p| p.file_id()).collect()
    }

    pub fn rank(&self) -> Option<i64> {
        self.rank
    }

    pub fn is_decoy(&self) -> bool {
        self.is_decoy
    }

    /// A set is a decoy if all of its PSMs are
    pub(crate) fn update_decoy_status(&mut self) {
        self.is_decoy = !self.psms.is_empty() && self.psms.iter().all(|p| p.is_decoy);
    }

    pub fn fdr(&self) -> f64 {
        self.fdr
    }

    pub fn q_value(&self) -> f64 {
        self.q_value
    }

    /// The combined FDR score
    pub fn fdr_score(&self) -> f64 {
        self.fdr_score
    }

    pub fn is_fdr_good(&self) -> bool {
        self.fdr_good
    }

    pub fn average_fdr_score(&self) -> f64 {
        self.average_fdr_score
    }

    pub(crate) fn calculate_average_fdr_score(&mut self) -> f64 {
        let scores = self.psms.iter().map(|p| p.fdr_score).collect::<Vec<_>>();
        self.average_fdr_score = crate::fdr::score::average_fdr_score(&scores);
        self.average_fdr_score
    }

    /// Recompute the best value of every score over the members
    pub(crate) fn refresh_best_scores(&mut self, registry: &ScoreRegistry) {
        let mut best: BTreeMap<String, f64> = BTreeMap::new();
        for psm in &self.psms {
            for short in psm.score_short_names() {
                let value = psm.score(short);
                let current = best.get(short).copied();
                let chosen = match registry.comparator(short) {
                    Some(cmp) => cmp.best(current, value),
                    None => current.or(value),
                };
                if let Some(v) = chosen {
                    best.insert(short.to_string(), v);
                }
            }
        }
        self.best_scores = best;
    }

    pub fn best_score(&self, short_name: &str) -> Option<f64> {
        self.best_scores.get(short_name).copied()
    }

    /// Short names of every score the set carries
    pub fn score_short_names(&self) -> impl Iterator<Item = &str> {
        let computed = [
            (ScoreKind::AverageFdrScore, self.average_fdr_score),
            (ScoreKind::PsmCombinedFdrScore, self.fdr_score),
        ];
        self.best_scores.keys().map(String::as_str).chain(
            computed
                .into_iter()
                .filter(|(_, v)| !v.is_nan())
                .map(|(k, _)| k.short_name()),
        )
    }

    /// Whether the score is computed for the set as a whole rather than
    /// taken from its members
    pub fn is_set_score(short_name: &str) -> bool {
        short_name == ScoreKind::AverageFdrScore.short_name()
            || short_name == ScoreKind::PsmCombinedFdrScore.short_name()
    }
}

impl Scored for ReportPsmSet {
    fn score(&self, short_name: &str) -> Option<f64> {
        if short_name == ScoreKind::AverageFdrScore.short_name() {
            finite(self.average_fdr_score)
        } else if short_name == ScoreKind::PsmCombinedFdrScore.short_name() {
            finite(self.fdr_score)
        } else {
            self.best_score(short_name)
        }
    }
}

impl crate::rank::Rankable for ReportPsmSet {
    fn set_rank(&mut self, rank: Option<i64>) {
        self.rank = rank;
    }
}

impl FdrItem for ReportPsmSet {
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

impl Filterable for ReportPsmSet {
    fn item_class(&self) -> ItemClass {
        ItemClass::PsmSet
    }

    fn attribute(&self, target: &Target, file_id: u64) -> Option<AttributeValue> {
        match target {
            Target::Accessions => Some(AttributeValue::Texts(
                self.accessions()
                    .iter()
                    .filter(|a| a.found_in(file_id))
                    .map(|a| a.accession.clone())
                    .collect(),
            )),
            Target::Descriptions => {
                let mut seen = BTreeSet::new();
                Some(AttributeValue::Texts(
                    self.psms
                        .iter()
                        .flat_map(|p| p.descriptions(file_id))
                        .filter(|d| seen.insert(d.clone()))
                        .collect(),
                ))
            }
            Target::FileNames => {
                let mut seen = BTreeSet::new();
                Some(AttributeValue::Texts(
                    self.psms
                        .iter()
                        .map(|p| p.file_name.clone())
                        .filter(|n| seen.insert(n.clone()))
                        .collect(),
                ))
            }
            Target::Rank => self.rank.map(|r| AttributeValue::Number(r as f64)),
            Target::Unique => Some(AttributeValue::Bool(
                !self.psms.is_empty() && self.psms.iter().all(|p| p.is_unique()),
            )),
            Target::NrAccessions => Some(AttributeValue::Number(self.accessions().len() as f64)),
            Target::NrPsms => Some(AttributeValue::Number(self.psms.len() as f64)),
            Target::Score(short) => self.score(short).map(AttributeValue::Number),
            _ => self
                .psms
                .first()
                .and_then(|p| spectrum_attribute(&p.spectrum, target)),
        }
    }
}

/// Either a single PSM of one file or a set of PSMs of the overview
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PsmItem {
    Psm(ReportPsm),
    Set(ReportPsmSet),
}

impl PsmItem {
    /// The raw PSMs behind the item
    pub fn psms(&self) -> &[ReportPsm] {
        match self {
            PsmItem::Psm(p) => std::slice::from_ref(p),
            PsmItem::Set(s) => s.psms(),
        }
    }

    pub fn sequence(&self) -> &str {
        match self {
            PsmItem::Psm(p) => p.sequence(),
            PsmItem::Set(s) => s.sequence(),
        }
    }

    pub fn modifications(&self) -> Option<&BTreeMap<usize, Modification>> {
        self.psms().first().map(|p| &p.spectrum.modifications)
    }

    pub fn is_decoy(&self) -> bool {
        match self {
            PsmItem::Psm(p) => p.is_decoy,
            PsmItem::Set(s) => s.is_decoy,
        }
    }

    pub fn spectrum_key(&self) -> &str {
        self.psms().first().map(|p| p.spectrum_key()).unwrap_or("")
    }

    pub fn score_short_names(&self) -> Vec<String> {
        match self {
            PsmItem::Psm(p) => p.score_short_names().map(String::from).collect(),
            PsmItem::Set(s) => s.score_short_names().map(String::from).collect(),
        }
    }

    /// The item's value of a score, ignoring the given PSMs and spectra.
    /// Set-wide scores are only dropped when no member is left.
    pub fn scoring_value(
        &self,
        short_name: &str,
        comparator: Option<&ScoreComparator>,
        non_scoring_psms: &BTreeSet<u64>,
        non_scoring_spectra: &BTreeSet<String>,
    ) -> Option<f64> {
        let scoring = |p: &&ReportPsm| {
            !non_scoring_psms.contains(&p.id()) && !non_scoring_spectra.contains(p.spectrum_key())
        };
        match self {
            PsmItem::Psm(p) => Some(p).filter(scoring).and_then(|p| p.score(short_name)),
            PsmItem::Set(s) if ReportPsmSet::is_set_score(short_name) => {
                s.psms.iter().find(scoring).and_then(|_| s.score(short_name))
            }
            PsmItem::Set(s) => s
                .psms
                .iter()
                .filter(scoring)
                .map(|p| p.score(short_name))
                .fold(None, |best, value| match comparator {
                    Some(cmp) => cmp.best(best, value),
                    None => best.or(value),
                }),
        }
    }
}

impl Scored for PsmItem {
    fn score(&self, short_name: &str) -> Option<f64> {
        match self {
            PsmItem::Psm(p) => p.score(short_name),
            PsmItem::Set(s) => s.score(short_name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::new_filter;

    fn psm(id: u64, file: u64, score: (&str, f64), decoy: bool) -> ReportPsm {
        let spectrum = Spectrum::new(id, file, "PEPTIDE", 2, 400.0)
            .with_score(score.0, score.1)
            .with_unique(true);
        let acc = Arc::new(Accession::new(if decoy { "s_P1" } else { "P1" }).with_description(file, "desc"));
        let mut p = ReportPsm::new(Arc::new(spectrum), &format!("file{}", file), vec![acc], "k".into());
        p.set_decoy(decoy);
        p
    }

    #[test]
    fn computed_scores() {
        let mut p = psm(1, 1, ("mascot_score", 30.0), false);
        assert_eq!(p.score("mascot_score"), Some(30.0));
        assert_eq!(p.score("psm_fdr_score"), None);
        p.set_fdr_score(0.01);
        assert_eq!(p.score("psm_fdr_score"), Some(0.01));
        assert_eq!(p.score_short_names().collect::<Vec<_>>(), vec!["mascot_score", "psm_fdr_score"]);
        p.dump_fdr();
        assert_eq!(p.score("psm_fdr_score"), None);
    }

    #[test]
    fn set_aggregates() {
        let mut registry = ScoreRegistry::new();
        registry.register_kind(ScoreKind::MascotScore);
        let set = ReportPsmSet::new(
            "k".into(),
            vec![
                psm(1, 1, ("mascot_score", 30.0), true),
                psm(2, 2, ("mascot_score", 45.0), false),
            ],
            &registry,
        );
        assert_eq!(set.score("mascot_score"), Some(45.0));
        assert!(!set.is_decoy());
        assert_eq!(set.accessions().len(), 2);
        assert_eq!(set.file_ids().into_iter().collect::<Vec<_>>(), vec![1, 2]);

        let f = new_filter("nr_psms_per_psm_set_filter", "EQ", "2", false).unwrap();
        assert!(f.satisfies(&set, 0));
        let f = new_filter("psm_file_list_filter", "CON", "file2", false).unwrap();
        assert!(f.satisfies(&set, 0));
        let f = new_filter("psm_accessions_filter", "CON_ONLY", "P1", false).unwrap();
        assert!(!f.satisfies(&set, 0));
        // file 2 only knows P1
        assert!(f.satisfies(&set, 2));

        let decoys = ReportPsmSet::new(
            "k".into(),
            vec![psm(1, 1, ("mascot_score", 30.0), true), psm(3, 2, ("mascot_score", 3.0), true)],
            &registry,
        );
        assert!(decoys.is_decoy());
    }

    #[test]
    fn average_fdr() {
        let registry = ScoreRegistry::new();
        let mut a = psm(1, 1, ("mascot_score", 30.0), false);
        let mut b = psm(2, 2, ("xtandem_expect", 0.1), false);
        a.set_fdr_score(0.01);
        b.set_fdr_score(0.04);
        let mut set = ReportPsmSet::new("k".into(), vec![a, b], &registry);
        assert!((set.calculate_average_fdr_score() - 0.02).abs() < 1e-12);
        assert_eq!(set.score("average_fdr_score"), Some(set.average_fdr_score()));
        assert_eq!(set.score("psm_combined_fdr_score"), None);
    }
}
