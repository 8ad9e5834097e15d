//! Score values, the table of well-known scores, and the registry that
//! resolves whether a higher value of a score is better
//!
//! Direction is resolved once per score short name, in this order:
//!
//! 1. the built-in [`ScoreKind`] table (locked)
//! 2. an injected [`OntologyLookup`] keyed on the score's CV accession (locked)
//! 3. higher is better, changeable by the user
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Anything that can report a value for a score short name
pub trait Scored {
    fn score(&self, short_name: &str) -> Option<f64>;
}

/// A single score value as reported by a search engine or computed here
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ScoreModel {
    pub short_name: String,
    pub name: String,
    pub accession: Option<String>,
    pub value: f64,
}

impl ScoreModel {
    /// Create a score value, filling in the display name and accession of
    /// known scores
    pub fn new(short_name: &str, value: f64) -> Self {
        match ScoreKind::lookup(short_name) {
            Some(kind) => ScoreModel {
                short_name: kind.short_name().into(),
                name: kind.name().into(),
                accession: kind.accession().map(String::from),
                value,
            },
            None => ScoreModel {
                short_name: short_name.into(),
                name: short_name.into(),
                accession: None,
                value,
            },
        }
    }

    /// A score that is only known by its CV accession and name
    pub fn with_accession(short_name: &str, name: &str, accession: &str, value: f64) -> Self {
        ScoreModel {
            short_name: short_name.into(),
            name: name.into(),
            accession: Some(accession.into()),
            value,
        }
    }
}

/// Scores with a fixed, well-known direction
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ScoreKind {
    AverageFdrScore,
    PsmCombinedFdrScore,
    PsmFdrScore,
    PsmQValue,
    PeptideFdrScore,
    PeptideQValue,
    ProteinScore,
    MascotScore,
    MascotExpect,
    SequestXcorr,
    SequestSpscore,
    SequestProbability,
    XtandemHyperscore,
    XtandemExpect,
    MsgfRawscore,
    MsgfDenovoscore,
    MsgfSpecEvalue,
    MsgfEvalue,
    AmandaScore,
    MyrimatchMvh,
    OpenmsPosteriorErrorProbability,
    OpenmsPosteriorProbability,
    FastaSequenceCount,
    FastaAccessionCount,
}

impl ScoreKind {
    pub const ALL: [ScoreKind; 24] = [
        ScoreKind::AverageFdrScore,
        ScoreKind::PsmCombinedFdrScore,
        ScoreKind::PsmFdrScore,
        ScoreKind::PsmQValue,
        ScoreKind::PeptideFdrScore,
        ScoreKind::PeptideQValue,
        ScoreKind::ProteinScore,
        ScoreKind::MascotScore,
        ScoreKind::MascotExpect,
        ScoreKind::SequestXcorr,
        ScoreKind::SequestSpscore,
        ScoreKind::SequestProbability,
        ScoreKind::XtandemHyperscore,
        ScoreKind::XtandemExpect,
        ScoreKind::MsgfRawscore,
        ScoreKind::MsgfDenovoscore,
        ScoreKind::MsgfSpecEvalue,
        ScoreKind::MsgfEvalue,
        ScoreKind::AmandaScore,
        ScoreKind::MyrimatchMvh,
        ScoreKind::OpenmsPosteriorErrorProbability,
        ScoreKind::OpenmsPosteriorProbability,
        ScoreKind::FastaSequenceCount,
        ScoreKind::FastaAccessionCount,
    ];

    pub fn short_name(&self) -> &'static str {
        use ScoreKind::*;
        match self {
            AverageFdrScore => "average_fdr_score",
            PsmCombinedFdrScore => "psm_combined_fdr_score",
            PsmFdrScore => "psm_fdr_score",
            PsmQValue => "psm_q_value",
            PeptideFdrScore => "peptide_fdr_score",
            PeptideQValue => "peptide_q_value",
            ProteinScore => "protein_score",
            MascotScore => "mascot_score",
            MascotExpect => "mascot_expect",
            SequestXcorr => "sequest_xcorr",
            SequestSpscore => "sequest_spscore",
            SequestProbability => "sequest_probability",
            XtandemHyperscore => "xtandem_hyperscore",
            XtandemExpect => "xtandem_expect",
            MsgfRawscore => "msgf_rawscore",
            MsgfDenovoscore => "msgf_denovoscore",
            MsgfSpecEvalue => "msgf_specevalue",
            MsgfEvalue => "msgf_evalue",
            AmandaScore => "amanda_score",
            MyrimatchMvh => "myrimatch_mvh",
            OpenmsPosteriorErrorProbability => "openms_posterior_error_probability",
            OpenmsPosteriorProbability => "openms_posterior_probability",
            FastaSequenceCount => "fasta_sequence_count",
            FastaAccessionCount => "fasta_accession_count",
        }
    }

    pub fn name(&self) -> &'static str {
        use ScoreKind::*;
        match self {
            AverageFdrScore => "Average FDR Score",
            PsmCombinedFdrScore => "PSM Combined FDR Score",
            PsmFdrScore => "PSM FDRScore",
            PsmQValue => "PSM q-value",
            PeptideFdrScore => "Peptide FDRScore",
            PeptideQValue => "PEPTIDE q-value",
            ProteinScore => "Protein score",
            MascotScore => "Mascot Ion Score",
            MascotExpect => "Mascot Expect",
            SequestXcorr => "XCorr",
            SequestSpscore => "SpScore",
            SequestProbability => "Sequest Probability",
            XtandemHyperscore => "X!Tandem Hyperscore",
            XtandemExpect => "X!Tandem Expect",
            MsgfRawscore => "MS-GF:RawScore",
            MsgfDenovoscore => "MS-GF:DeNovoScore",
            MsgfSpecEvalue => "MS-GF:SpecEValue",
            MsgfEvalue => "MS-GF:EValue",
            AmandaScore => "Amanda Score",
            MyrimatchMvh => "MyriMatch:MVH",
            OpenmsPosteriorErrorProbability => "OpenMS Posterior Error Probability",
            OpenmsPosteriorProbability => "OpenMS Posterior Probability",
            FastaSequenceCount => "FASTA Sequence Count",
            FastaAccessionCount => "FASTA Accession Count",
        }
    }

    /// PSI-MS controlled vocabulary accession, if the score has one
    pub fn accession(&self) -> Option<&'static str> {
        use ScoreKind::*;
        match self {
            PsmCombinedFdrScore => Some("MS:1002356"),
            PsmFdrScore => Some("MS:1002355"),
            PsmQValue => Some("MS:1002354"),
            PeptideFdrScore => Some("MS:1002360"),
            PeptideQValue => Some("MS:1001868"),
            ProteinScore => Some("MS:1002394"),
            MascotScore => Some("MS:1001171"),
            MascotExpect => Some("MS:1001172"),
            SequestXcorr => Some("MS:1001155"),
            SequestSpscore => Some("MS:1001157"),
            SequestProbability => Some("MS:1001154"),
            XtandemHyperscore => Some("MS:1001331"),
            XtandemExpect => Some("MS:1001330"),
            MsgfRawscore => Some("MS:1002049"),
            MsgfDenovoscore => Some("MS:1002050"),
            MsgfSpecEvalue => Some("MS:1002052"),
            MsgfEvalue => Some("MS:1002053"),
            AmandaScore => Some("MS:1002319"),
            MyrimatchMvh => Some("MS:1001589"),
            AverageFdrScore
            | OpenmsPosteriorErrorProbability
            | OpenmsPosteriorProbability
            | FastaSequenceCount
            | FastaAccessionCount => None,
        }
    }

    pub fn higher_score_better(&self) -> bool {
        use ScoreKind::*;
        match self {
            AverageFdrScore | PsmCombinedFdrScore | PsmFdrScore | PsmQValue | PeptideFdrScore
            | PeptideQValue | MascotExpect | SequestProbability | XtandemExpect
            | MsgfSpecEvalue | MsgfEvalue | OpenmsPosteriorErrorProbability => false,
            ProteinScore | MascotScore | SequestXcorr | SequestSpscore | XtandemHyperscore
            | MsgfRawscore | MsgfDenovoscore | AmandaScore | MyrimatchMvh
            | OpenmsPosteriorProbability | FastaSequenceCount | FastaAccessionCount => true,
        }
    }

    /// Is this the score a search engine ranks its own results by?
    pub fn is_main_score(&self) -> bool {
        use ScoreKind::*;
        matches!(
            self,
            MascotScore | SequestXcorr | XtandemExpect | MsgfSpecEvalue | AmandaScore | MyrimatchMvh
        )
    }

    /// Look up a score by short name, display name or CV accession
    pub fn lookup(name: &str) -> Option<ScoreKind> {
        ScoreKind::ALL.iter().copied().find(|kind| {
            kind.short_name() == name || kind.name() == name || kind.accession() == Some(name)
        })
    }
}

/// Read-only access to an ontology that may fix the direction of a score
pub trait OntologyLookup {
    /// `Some(true)` if higher values are better for the term, `Some(false)`
    /// if lower values are better, `None` if the ontology does not say
    fn higher_score_better(&self, accession: &str) -> Option<bool>;
}

const HIGHER_BETTER_ORDER: &str = "MS:1002108";
const LOWER_BETTER_ORDER: &str = "MS:1002109";
const LOWER_BETTER_PARENTS: [&str; 3] = ["MS:1001868", "MS:1001870", "MS:1001872"];

/// `is_a` and `relationship` triples of an OBO file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OboRelations {
    is_a: BTreeMap<String, BTreeSet<String>>,
    has_order: BTreeMap<String, String>,
}

impl OboRelations {
    pub fn add_is_a(mut self, term: &str, parent: &str) -> Self {
        self.is_a
            .entry(term.into())
            .or_default()
            .insert(parent.into());
        self
    }

    /// Only `has_order` relationships are relevant, others are ignored
    pub fn add_relationship(mut self, term: &str, relation: &str, target: &str) -> Self {
        if relation == "has_order" {
            self.has_order.insert(term.into(), target.into());
        }
        self
    }

    fn ancestors(&self, accession: &str) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![accession];
        while let Some(term) = stack.pop() {
            if let Some(parents) = self.is_a.get(term) {
                for parent in parents {
                    if seen.insert(parent.as_str()) {
                        stack.push(parent.as_str());
                    }
                }
            }
        }
        seen
    }
}

impl OntologyLookup for OboRelations {
    fn higher_score_better(&self, accession: &str) -> Option<bool> {
        match self.has_order.get(accession).map(String::as_str) {
            Some(HIGHER_BETTER_ORDER) => return Some(true),
            Some(LOWER_BETTER_ORDER) => return Some(false),
            _ => {}
        }
        let ancestors = self.ancestors(accession);
        if LOWER_BETTER_PARENTS.iter().any(|p| ancestors.contains(p)) {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct Direction {
    higher_score_better: bool,
    locked: bool,
}

/// The single source of truth for score directions, consulted by ranking
/// and FDR estimation
#[derive(Default)]
pub struct ScoreRegistry {
    ontology: Option<Box<dyn OntologyLookup + Send + Sync>>,
    directions: BTreeMap<String, Direction>,
    names: BTreeMap<String, String>,
}

impl std::fmt::Debug for ScoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreRegistry")
            .field("ontology", &self.ontology.is_some())
            .field("directions", &self.directions)
            .finish()
    }
}

impl ScoreRegistry {
    pub fn new() -> Self {
        ScoreRegistry::default()
    }

    pub fn with_ontology(mut self, ontology: Box<dyn OntologyLookup + Send + Sync>) -> Self {
        self.ontology = Some(ontology);
        self
    }

    /// Resolve the direction of a score, if it has not been seen before
    pub fn register(&mut self, score: &ScoreModel) {
        if self.directions.contains_key(&score.short_name) {
            return;
        }

        let kind = ScoreKind::lookup(&score.short_name)
            .or_else(|| score.accession.as_deref().and_then(ScoreKind::lookup));

        let direction = if let Some(kind) = kind {
            Direction {
                higher_score_better: kind.higher_score_better(),
                locked: true,
            }
        } else if let Some(hsb) = score
            .accession
            .as_deref()
            .and_then(|acc| self.ontology.as_ref()?.higher_score_better(acc))
        {
            Direction {
                higher_score_better: hsb,
                locked: true,
            }
        } else {
            Direction {
                higher_score_better: true,
                locked: false,
            }
        };

        debug!(
            "score {} resolved: higher_score_better={}, locked={}",
            score.short_name, direction.higher_score_better, direction.locked
        );
        self.directions.insert(score.short_name.clone(), direction);
        self.names
            .insert(score.short_name.clone(), score.name.clone());
    }

    /// Register a computed score of the built-in table
    pub fn register_kind(&mut self, kind: ScoreKind) {
        self.register(&ScoreModel::new(kind.short_name(), f64::NAN));
    }

    pub fn is_registered(&self, short_name: &str) -> bool {
        self.directions.contains_key(short_name)
    }

    pub fn higher_score_better(&self, short_name: &str) -> Option<bool> {
        self.directions
            .get(short_name)
            .map(|d| d.higher_score_better)
    }

    pub fn is_changeable(&self, short_name: &str) -> bool {
        self.directions
            .get(short_name)
            .map(|d| !d.locked)
            .unwrap_or(false)
    }

    /// Display name of a registered score
    pub fn name(&self, short_name: &str) -> Option<&str> {
        self.names.get(short_name).map(String::as_str)
    }

    /// Change the direction of a user-changeable score. Locked scores are
    /// left untouched and a warning is logged.
    pub fn set_higher_score_better(&mut self, short_name: &str, higher_score_better: bool) {
        match self.directions.get_mut(short_name) {
            Some(d) if !d.locked => d.higher_score_better = higher_score_better,
            Some(_) => warn!(
                "the direction of score {} is fixed and cannot be changed",
                short_name
            ),
            None => warn!("cannot set the direction of unknown score {}", short_name),
        }
    }

    pub fn comparator(&self, short_name: &str) -> Option<ScoreComparator> {
        self.higher_score_better(short_name)
            .map(|hsb| ScoreComparator::new(short_name, hsb))
    }
}

/// Orders score values best first
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreComparator {
    short_name: String,
    higher_score_better: bool,
}

impl ScoreComparator {
    pub fn new(short_name: &str, higher_score_better: bool) -> Self {
        ScoreComparator {
            short_name: short_name.into(),
            higher_score_better,
        }
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn higher_score_better(&self) -> bool {
        self.higher_score_better
    }

    /// `Less` means `a` is the better value. Absent and NaN values sort after
    /// every real value.
    pub fn compare_values(&self, a: Option<f64>, b: Option<f64>) -> Ordering {
        let a = a.filter(|v| !v.is_nan());
        let b = b.filter(|v| !v.is_nan());
        match (a, b) {
            (Some(a), Some(b)) => {
                let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
                if self.higher_score_better {
                    ord.reverse()
                } else {
                    ord
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    pub fn compare<T: Scored>(&self, a: &T, b: &T) -> Ordering {
        self.compare_values(a.score(&self.short_name), b.score(&self.short_name))
    }

    /// The better of two values, ignoring absent ones
    pub fn best(&self, a: Option<f64>, b: Option<f64>) -> Option<f64> {
        match self.compare_values(a, b) {
            Ordering::Greater => b.filter(|v| !v.is_nan()),
            _ => a.filter(|v| !v.is_nan()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_lookup() {
        assert_eq!(ScoreKind::lookup("mascot_score"), Some(ScoreKind::MascotScore));
        assert_eq!(ScoreKind::lookup("Mascot Ion Score"), Some(ScoreKind::MascotScore));
        assert_eq!(ScoreKind::lookup("MS:1001330"), Some(ScoreKind::XtandemExpect));
        assert_eq!(ScoreKind::lookup("my_engine_score"), None);

        let s = ScoreModel::new("psm_fdr_score", 0.1);
        assert_eq!(s.name, "PSM FDRScore");
        assert_eq!(s.accession.as_deref(), Some("MS:1002355"));
    }

    #[test]
    fn three_tier_resolution() {
        let obo = OboRelations::default()
            .add_is_a("MS:9999001", "MS:1001872")
            .add_is_a("MS:9999002", "MS:9999001")
            .add_relationship("MS:9999003", "has_order", "MS:1002108");
        let mut reg = ScoreRegistry::new().with_ontology(Box::new(obo));

        reg.register(&ScoreModel::new("mascot_expect", 0.5));
        reg.register(&ScoreModel::with_accession("pval", "some p-value", "MS:9999002", 0.1));
        reg.register(&ScoreModel::with_accession("good", "ordered", "MS:9999003", 0.1));
        reg.register(&ScoreModel::new("custom", 1.0));

        assert_eq!(reg.higher_score_better("mascot_expect"), Some(false));
        assert!(!reg.is_changeable("mascot_expect"));
        assert_eq!(reg.higher_score_better("pval"), Some(false));
        assert!(!reg.is_changeable("pval"));
        assert_eq!(reg.higher_score_better("good"), Some(true));
        assert!(!reg.is_changeable("good"));
        assert_eq!(reg.higher_score_better("custom"), Some(true));
        assert!(reg.is_changeable("custom"));
        assert_eq!(reg.higher_score_better("never_seen"), None);
    }

    #[test]
    fn locked_direction_is_kept() {
        let mut reg = ScoreRegistry::new();
        reg.register(&ScoreModel::new("mascot_score", 10.0));
        reg.register(&ScoreModel::new("custom", 1.0));

        reg.set_higher_score_better("mascot_score", false);
        reg.set_higher_score_better("custom", false);

        assert_eq!(reg.higher_score_better("mascot_score"), Some(true));
        assert_eq!(reg.higher_score_better("custom"), Some(false));
    }

    #[test]
    fn comparator_orders_absent_last() {
        let hi = ScoreComparator::new("x", true);
        let lo = ScoreComparator::new("x", false);
        assert_eq!(hi.compare_values(Some(2.0), Some(1.0)), Ordering::Less);
        assert_eq!(lo.compare_values(Some(2.0), Some(1.0)), Ordering::Greater);
        assert_eq!(hi.compare_values(None, Some(1.0)), Ordering::Greater);
        assert_eq!(lo.compare_values(Some(f64::NAN), Some(1.0)), Ordering::Greater);
        assert_eq!(lo.compare_values(None, None), Ordering::Equal);

        let mut v = vec![Some(1.0), None, Some(3.0), Some(f64::NAN), Some(2.0)];
        v.sort_by(|a, b| lo.compare_values(*a, *b));
        assert_eq!(&v[..3], &[Some(1.0), Some(2.0), Some(3.0)]);

        assert_eq!(hi.best(Some(1.0), Some(4.0)), Some(4.0));
        assert_eq!(lo.best(None, Some(4.0)), Some(4.0));
    }
}
