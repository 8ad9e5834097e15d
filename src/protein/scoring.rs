//! Protein scoring strategies
use super::{PsmForScoring, ReportProtein, ScoringMethod};
use crate::psm::{PsmItem, ReportPsmSet};
use crate::score::{ScoreRegistry, Scored};

fn multiplicative(values: impl Iterator<Item = f64>, higher_score_better: bool) -> f64 {
    if higher_score_better {
        values.product()
    } else {
        values.map(|v| -v.log10()).sum()
    }
}

impl ScoringMethod {
    /// Combine the base values of one protein. NaN values are skipped, no
    /// usable value yields NaN.
    pub fn combine(&self, values: &[f64], higher_score_better: bool) -> f64 {
        let values = values.iter().copied().filter(|v| !v.is_nan()).collect::<Vec<_>>();
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            ScoringMethod::Additive => values.iter().sum(),
            ScoringMethod::Multiplicative => multiplicative(values.into_iter(), higher_score_better),
            ScoringMethod::GeometricMean => {
                let exp = 1.0 / values.len() as f64;
                multiplicative(values.into_iter().map(|v| v.powf(exp)), higher_score_better)
            }
        }
    }
}

/// The values of `base` a protein's score is computed from
pub fn protein_score_values(protein: &ReportProtein, psms: PsmForScoring, base: &str) -> Vec<f64> {
    let mut values = Vec::new();
    for peptide in protein.peptides() {
        match psms {
            PsmForScoring::Best => values.extend(peptide.score(base)),
            PsmForScoring::All => {
                let scoring = |id: u64, key: &str| {
                    !peptide.non_scoring_psms().contains(&id)
                        && !peptide.non_scoring_spectra().contains(key)
                };
                for item in peptide.items() {
                    match item {
                        // set-wide values are only found on the set
                        PsmItem::Set(set) if ReportPsmSet::is_set_score(base) => {
                            if set.psms().iter().any(|p| scoring(p.id(), p.spectrum_key())) {
                                values.extend(set.score(base));
                            }
                        }
                        _ => values.extend(
                            item.psms()
                                .iter()
                                .filter(|p| scoring(p.id(), p.spectrum_key()))
                                .filter_map(|p| p.score(base)),
                        ),
                    }
                }
            }
        }
    }
    values
}

/// Score one protein. Unknown score directions count as higher is better.
pub fn score_protein(
    protein: &ReportProtein,
    method: ScoringMethod,
    psms: PsmForScoring,
    base: &str,
    registry: &ScoreRegistry,
) -> f64 {
    let values = protein_score_values(protein, psms, base);
    let higher_score_better = registry.higher_score_better(base).unwrap_or(true);
    method.combine(&values, higher_score_better)
}

/// Score the proteins and every subset attached to them
pub(crate) fn score_proteins(
    proteins: &mut [ReportProtein],
    method: ScoringMethod,
    psms: PsmForScoring,
    base: &str,
    registry: &ScoreRegistry,
) {
    for protein in proteins.iter_mut() {
        let score = score_protein(protein, method, psms, base, registry);
        protein.set_score(score);
        score_proteins(protein.subsets_mut(), method, psms, base, registry);
    }
}
