//! Decoy labelling and target-decoy FDR estimation
//!
//! The same walk is used for PSMs, PSM sets, peptides and proteins: sort by
//! the chosen score, count targets and decoys, derive local FDR, q-value and
//! FDR score for every item.
use crate::config::Settings;
use crate::error::Error;
use crate::score::{ScoreComparator, Scored};
use crate::util::{anchored_regex, finite};
use regex::Regex;
use tracing::debug;

pub mod score;

pub use score::{fdr_scores, SMALL_FDRSCORE_SUBSTITUTE};

pub const DEFAULT_DECOY_PATTERN: &str = "s.*";
pub const DEFAULT_FDR_THRESHOLD: f64 = 0.01;

/// How decoys are recognised
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum DecoyStrategy {
    /// Any accession fully matching the decoy pattern marks a decoy
    AccessionPattern,
    /// Trust the decoy flag reported by the search engine
    SearchEngine,
    /// Take over the labels of the level below
    Inherit,
}

/// Local FDR at a position of the sorted list
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum FdrEstimator {
    /// decoys / targets, infinite while only decoys were seen
    DecoysOverTargets,
    /// decoys / (targets + decoys)
    DecoysOverAll,
}

impl FdrEstimator {
    pub fn estimate(&self, decoys: usize, targets: usize) -> f64 {
        match self {
            FdrEstimator::DecoysOverTargets => {
                if decoys == 0 {
                    0.0
                } else if targets == 0 {
                    f64::INFINITY
                } else {
                    decoys as f64 / targets as f64
                }
            }
            FdrEstimator::DecoysOverAll => {
                if decoys == 0 {
                    0.0
                } else {
                    decoys as f64 / (decoys + targets) as f64
                }
            }
        }
    }
}

/// Report items that take part in FDR estimation
pub trait FdrItem: Scored {
    fn is_decoy(&self) -> bool;
    fn set_fdr(&mut self, fdr: f64);
    fn set_q_value(&mut self, q_value: f64);
    fn set_fdr_score(&mut self, fdr_score: f64);
    fn set_fdr_good(&mut self, fdr_good: bool);

    /// Forget every FDR-derived value
    fn dump_fdr(&mut self) {
        self.set_fdr(f64::NAN);
        self.set_q_value(f64::NAN);
        self.set_fdr_score(f64::NAN);
        self.set_fdr_good(false);
    }
}

/// FDR configuration of one analysed list, and the results of the last
/// estimation
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FdrData {
    decoy_strategy: DecoyStrategy,
    decoy_pattern: String,
    threshold: f64,
    score_short_name: Option<String>,
    top_identifications: usize,
    estimator: FdrEstimator,

    calculated: bool,
    nr_items: usize,
    nr_targets: usize,
    nr_decoys: usize,
    nr_fdr_good_targets: usize,
    nr_fdr_good_decoys: usize,
    score_at_threshold: Option<f64>,
    artificial_decoy_fdr: Option<f64>,
}

impl Default for FdrData {
    fn default() -> Self {
        FdrData {
            decoy_strategy: DecoyStrategy::AccessionPattern,
            decoy_pattern: DEFAULT_DECOY_PATTERN.into(),
            threshold: DEFAULT_FDR_THRESHOLD,
            score_short_name: None,
            top_identifications: 0,
            estimator: FdrEstimator::DecoysOverTargets,
            calculated: false,
            nr_items: 0,
            nr_targets: 0,
            nr_decoys: 0,
            nr_fdr_good_targets: 0,
            nr_fdr_good_decoys: 0,
            score_at_threshold: None,
            artificial_decoy_fdr: None,
        }
    }
}

impl From<&Settings> for FdrData {
    fn from(settings: &Settings) -> Self {
        FdrData {
            decoy_strategy: settings.decoy_strategy,
            decoy_pattern: settings.decoy_pattern.clone(),
            threshold: settings.fdr_threshold,
            top_identifications: settings.top_identifications,
            estimator: settings.estimator,
            ..FdrData::default()
        }
    }
}

impl FdrData {
    pub fn new(strategy: DecoyStrategy, pattern: &str, threshold: f64) -> Self {
        FdrData {
            decoy_strategy: strategy,
            decoy_pattern: pattern.into(),
            threshold,
            ..FdrData::default()
        }
    }

    pub(crate) fn clear_results(&mut self) {
        self.calculated = false;
        self.nr_items = 0;
        self.nr_targets = 0;
        self.nr_decoys = 0;
        self.nr_fdr_good_targets = 0;
        self.nr_fdr_good_decoys = 0;
        self.score_at_threshold = None;
        self.artificial_decoy_fdr = None;
    }

    pub fn decoy_strategy(&self) -> DecoyStrategy {
        self.decoy_strategy
    }

    pub fn set_decoy_strategy(&mut self, strategy: DecoyStrategy) {
        self.clear_results();
        self.decoy_strategy = strategy;
    }

    pub fn decoy_pattern(&self) -> &str {
        &self.decoy_pattern
    }

    /// Set the accession pattern. Invalid regular expressions are rejected.
    pub fn set_decoy_pattern(&mut self, pattern: &str) -> Result<(), Error> {
        anchored_regex(pattern)?;
        self.clear_results();
        self.decoy_pattern = pattern.into();
        Ok(())
    }

    /// The decoy pattern, anchored at both ends
    pub fn decoy_regex(&self) -> Result<Regex, Error> {
        anchored_regex(&self.decoy_pattern)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.clear_results();
        self.threshold = threshold;
    }

    pub fn score_short_name(&self) -> Option<&str> {
        self.score_short_name.as_deref()
    }

    pub fn set_score_short_name(&mut self, short_name: Option<&str>) {
        if self.score_short_name.as_deref() != short_name {
            self.clear_results();
        }
        self.score_short_name = short_name.map(String::from);
    }

    pub fn top_identifications(&self) -> usize {
        self.top_identifications
    }

    pub fn set_top_identifications(&mut self, top: usize) {
        self.clear_results();
        self.top_identifications = top;
    }

    pub fn estimator(&self) -> FdrEstimator {
        self.estimator
    }

    pub fn set_estimator(&mut self, estimator: FdrEstimator) {
        self.clear_results();
        self.estimator = estimator;
    }

    pub fn is_calculated(&self) -> bool {
        self.calculated
    }

    pub fn nr_items(&self) -> usize {
        self.nr_items
    }

    pub fn nr_targets(&self) -> usize {
        self.nr_targets
    }

    pub fn nr_decoys(&self) -> usize {
        self.nr_decoys
    }

    pub fn nr_fdr_good_targets(&self) -> usize {
        self.nr_fdr_good_targets
    }

    pub fn nr_fdr_good_decoys(&self) -> usize {
        self.nr_fdr_good_decoys
    }

    pub fn score_at_threshold(&self) -> Option<f64> {
        self.score_at_threshold
    }

    /// FDR of one more decoy appended after the last item
    pub fn artificial_decoy_fdr(&self) -> Option<f64> {
        self.artificial_decoy_fdr
    }

    /// Overwrite the counts, used when a combined score replaces the walk
    /// results
    pub(crate) fn correct_numbers(
        &mut self,
        nr_items: usize,
        nr_targets: usize,
        nr_decoys: usize,
        nr_fdr_good_targets: usize,
        nr_fdr_good_decoys: usize,
    ) {
        self.nr_items = nr_items;
        self.nr_targets = nr_targets;
        self.nr_decoys = nr_decoys;
        self.nr_fdr_good_targets = nr_fdr_good_targets;
        self.nr_fdr_good_decoys = nr_fdr_good_decoys;
    }

    /// Run the target-decoy walk over `items`, ordered by `comparator`.
    ///
    /// Every item is dumped first. Items without a usable score take no
    /// part in the walk. Equal scores share the FDR reached after the last
    /// of them.
    pub fn calculate_fdr<T: FdrItem>(&mut self, comparator: &ScoreComparator, items: Vec<&mut T>) {
        self.clear_results();
        let short = comparator.short_name();

        let mut walk = Vec::with_capacity(items.len());
        for item in items {
            item.dump_fdr();
            if let Some(score) = item.score(short).and_then(finite) {
                walk.push((score, item));
            }
        }
        walk.sort_by(|a, b| comparator.compare_values(Some(a.0), Some(b.0)));

        let n = walk.len();
        let mut fdr = vec![0.0; n];
        let (mut targets, mut decoys) = (0, 0);
        let mut start = 0;
        while start < n {
            let mut end = start;
            while end < n && walk[end].0 == walk[start].0 {
                if walk[end].1.is_decoy() {
                    decoys += 1;
                } else {
                    targets += 1;
                }
                end += 1;
            }
            let value = self.estimator.estimate(decoys, targets);
            fdr[start..end].iter_mut().for_each(|f| *f = value);
            start = end;
        }

        let mut q_values = fdr.clone();
        for idx in (0..n.saturating_sub(1)).rev() {
            q_values[idx] = q_values[idx].min(q_values[idx + 1]);
        }

        // every member of a tie group shares its FDR, so the last index at
        // or below the threshold always closes a group
        let cut = fdr.iter().rposition(|f| *f <= self.threshold);
        let artificial = self.estimator.estimate(decoys + 1, targets);

        let scores = walk.iter().map(|w| w.0).collect::<Vec<_>>();
        let fdr_scores = fdr_scores(
            &scores,
            &q_values,
            decoys > 0,
            comparator.higher_score_better(),
            artificial,
        );

        let (mut good_targets, mut good_decoys) = (0, 0);
        for (idx, (_, item)) in walk.iter_mut().enumerate() {
            let good = cut.map_or(false, |c| idx <= c);
            item.set_fdr(fdr[idx]);
            item.set_q_value(q_values[idx]);
            item.set_fdr_good(good);
            if let Some(fs) = &fdr_scores {
                item.set_fdr_score(fs[idx]);
            }
            if good {
                if item.is_decoy() {
                    good_decoys += 1;
                } else {
                    good_targets += 1;
                }
            }
        }

        self.calculated = true;
        self.nr_items = n;
        self.nr_targets = targets;
        self.nr_decoys = decoys;
        self.nr_fdr_good_targets = good_targets;
        self.nr_fdr_good_decoys = good_decoys;
        self.score_at_threshold = cut.map(|c| scores[c]);
        self.artificial_decoy_fdr = Some(artificial);

        debug!(
            "FDR on {}: {} items, {} targets, {} decoys, {} FDR-good targets",
            short, n, targets, decoys, good_targets
        );
    }
}

/// Whether any of the accessions fully matches the decoy pattern
pub fn matches_decoy_pattern<'a, I>(regex: &Regex, accessions: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    accessions.into_iter().any(|acc| regex.is_match(acc))
}
