//! Catalogue of the filters that can be created by short name
use super::*;
use crate::error::Error;
use crate::score::ScoreKind;
use crate::util::anchored_regex;

const PSM_LIKE: &[ItemClass] = &[ItemClass::Psm, ItemClass::PsmSet];
const PSM_SET: &[ItemClass] = &[ItemClass::PsmSet];
const PSM: &[ItemClass] = &[ItemClass::Psm];
const PEPTIDE: &[ItemClass] = &[ItemClass::Peptide];
const PROTEIN: &[ItemClass] = &[ItemClass::Protein];

pub const PSM_SCORE_FILTER_PREFIX: &str = "psm_score_filter_";
pub const PEPTIDE_SCORE_FILTER_PREFIX: &str = "peptide_score_filter_";
pub const PSM_TOP_IDENTIFICATION_FILTER_PREFIX: &str = "psm_top_identification_filter_";

struct Descriptor {
    filter_type: FilterType,
    target: Target,
    classes: &'static [ItemClass],
}

fn desc(filter_type: FilterType, target: Target, classes: &'static [ItemClass]) -> Descriptor {
    Descriptor {
        filter_type,
        target,
        classes,
    }
}

const STATIC_FILTERS: [&str; 37] = [
    "charge_filter",
    "delta_mass_filter",
    "delta_ppm_filter",
    "mz_filter",
    "psm_accessions_filter",
    "psm_description_filter",
    "psm_file_list_filter",
    "psm_missed_cleavages_filter",
    "psm_modifications_filter",
    "psm_rank_filter",
    "psm_sequence_filter",
    "psm_unique_filter",
    "psm_source_id_filter",
    "nr_accessions_per_psm_filter",
    "nr_psms_per_psm_set_filter",
    "peptide_accessions_filter",
    "peptide_description_filter",
    "peptide_file_list_filter",
    "peptide_missed_cleavages_filter",
    "peptide_modifications_filter",
    "peptide_sequence_filter",
    "peptide_source_id_list_filter",
    "peptide_unique_filter",
    "nr_psms_per_peptide_filter",
    "nr_spectra_per_peptide_filter",
    "protein_score_filter",
    "protein_rank_filter",
    "nr_unique_peptides_per_protein_filter",
    "nr_group_unique_peptides_per_protein_filter",
    "protein_accessions_filter",
    "protein_description_filter",
    "protein_file_list_filter",
    "protein_modifications_filter",
    "protein_sequence_list_filter",
    "nr_peptides_per_protein_filter",
    "nr_psms_per_protein_filter",
    "nr_spectra_per_protein_filter",
];

fn static_descriptor(short_name: &str) -> Option<Descriptor> {
    use FilterType::*;
    let d = match short_name {
        "charge_filter" => desc(Numerical, Target::Charge, PSM_LIKE),
        "delta_mass_filter" => desc(Numerical, Target::DeltaMass, PSM_LIKE),
        "delta_ppm_filter" => desc(Numerical, Target::DeltaPpm, PSM_LIKE),
        "mz_filter" => desc(Numerical, Target::MassToCharge, PSM_LIKE),
        "psm_accessions_filter" => desc(LiteralList, Target::Accessions, PSM_LIKE),
        "psm_description_filter" => desc(LiteralList, Target::Descriptions, PSM_LIKE),
        "psm_file_list_filter" => desc(LiteralList, Target::FileNames, PSM_LIKE),
        "psm_missed_cleavages_filter" => desc(Numerical, Target::MissedCleavages, PSM_LIKE),
        "psm_modifications_filter" => desc(FilterType::Modification, Target::Modifications, PSM_LIKE),
        "psm_rank_filter" => desc(Numerical, Target::Rank, PSM_LIKE),
        "psm_sequence_filter" => desc(Literal, Target::Sequence, PSM_LIKE),
        "psm_unique_filter" => desc(Bool, Target::Unique, PSM_LIKE),
        "psm_source_id_filter" => desc(Literal, Target::SourceId, PSM_LIKE),
        "nr_accessions_per_psm_filter" => desc(Numerical, Target::NrAccessions, PSM_LIKE),
        "nr_psms_per_psm_set_filter" => desc(Numerical, Target::NrPsms, PSM_SET),

        "peptide_accessions_filter" => desc(LiteralList, Target::Accessions, PEPTIDE),
        "peptide_description_filter" => desc(LiteralList, Target::Descriptions, PEPTIDE),
        "peptide_file_list_filter" => desc(LiteralList, Target::FileNames, PEPTIDE),
        "peptide_missed_cleavages_filter" => desc(Numerical, Target::MissedCleavages, PEPTIDE),
        "peptide_modifications_filter" => desc(FilterType::Modification, Target::Modifications, PEPTIDE),
        "peptide_sequence_filter" => desc(Literal, Target::Sequence, PEPTIDE),
        "peptide_source_id_list_filter" => desc(Literal, Target::SourceIds, PEPTIDE),
        "peptide_unique_filter" => desc(Bool, Target::Unique, PEPTIDE),
        "nr_psms_per_peptide_filter" => desc(Numerical, Target::NrPsms, PEPTIDE),
        "nr_spectra_per_peptide_filter" => desc(Numerical, Target::NrSpectra, PEPTIDE),

        "protein_score_filter" => desc(
            Numerical,
            Target::Score(ScoreKind::ProteinScore.short_name().into()),
            PROTEIN,
        ),
        "protein_rank_filter" => desc(Numerical, Target::Rank, PROTEIN),
        "nr_unique_peptides_per_protein_filter" => {
            desc(Numerical, Target::NrUniquePeptides, PROTEIN)
        }
        "nr_group_unique_peptides_per_protein_filter" => {
            desc(Numerical, Target::NrGroupUniquePeptides, PROTEIN)
        }
        "protein_accessions_filter" => desc(LiteralList, Target::Accessions, PROTEIN),
        "protein_description_filter" => desc(LiteralList, Target::Descriptions, PROTEIN),
        "protein_file_list_filter" => desc(LiteralList, Target::FileNames, PROTEIN),
        "protein_modifications_filter" => desc(FilterType::Modification, Target::Modifications, PROTEIN),
        "protein_sequence_list_filter" => desc(LiteralList, Target::Sequences, PROTEIN),
        "nr_peptides_per_protein_filter" => desc(Numerical, Target::NrPeptides, PROTEIN),
        "nr_psms_per_protein_filter" => desc(Numerical, Target::NrPsms, PROTEIN),
        "nr_spectra_per_protein_filter" => desc(Numerical, Target::NrSpectra, PROTEIN),
        _ => return None,
    };
    Some(d)
}

/// Scores that only PSM sets carry
fn is_set_score(short_name: &str) -> bool {
    short_name == ScoreKind::AverageFdrScore.short_name()
        || short_name == ScoreKind::PsmCombinedFdrScore.short_name()
}

fn descriptor(short_name: &str) -> Option<Descriptor> {
    if let Some(score) = short_name.strip_prefix(PSM_SCORE_FILTER_PREFIX) {
        let classes = if is_set_score(score) { PSM_SET } else { PSM };
        return Some(desc(FilterType::Numerical, Target::Score(score.into()), classes));
    }
    if let Some(score) = short_name.strip_prefix(PEPTIDE_SCORE_FILTER_PREFIX) {
        return Some(desc(FilterType::Numerical, Target::Score(score.into()), PEPTIDE));
    }
    if let Some(score) = short_name.strip_prefix(PSM_TOP_IDENTIFICATION_FILTER_PREFIX) {
        return Some(desc(
            FilterType::Numerical,
            Target::IdentificationRank(score.into()),
            PSM,
        ));
    }
    static_descriptor(short_name)
}

/// Short names of the filters that exist independent of any score, plus
/// the score filters for the given PSM-level scores
pub fn registered_filters(psm_scores: &[String]) -> Vec<String> {
    let mut names = STATIC_FILTERS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    for score in psm_scores {
        names.push(format!("{}{}", PSM_SCORE_FILTER_PREFIX, score));
        names.push(format!("{}{}", PSM_TOP_IDENTIFICATION_FILTER_PREFIX, score));
    }
    for score in [
        ScoreKind::PeptideQValue.short_name(),
        ScoreKind::PeptideFdrScore.short_name(),
    ] {
        names.push(format!("{}{}", PEPTIDE_SCORE_FILTER_PREFIX, score));
    }
    names
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// Create a filter by short name, validating the comparator against the
/// filter's type and the operand against the comparator
pub fn new_filter(short_name: &str, comparator: &str, input: &str, negate: bool) -> Result<Filter, Error> {
    let short_name = short_name.trim();
    let comparator = comparator.trim();
    if short_name.is_empty() {
        return Err(Error::MissingFilter);
    }
    if comparator.is_empty() {
        return Err(Error::MissingComparator);
    }

    let d = descriptor(short_name).ok_or_else(|| Error::UnknownFilter(short_name.into()))?;
    let cmp =
        Comparator::parse(comparator).ok_or_else(|| Error::UnknownComparator(comparator.into()))?;
    if !d.filter_type.supports(cmp) {
        return Err(Error::UnsupportedComparator {
            filter: short_name.into(),
            comparator: comparator.into(),
        });
    }

    let value = match d.filter_type {
        FilterType::Bool => FilterValue::Bool(
            parse_bool(input).ok_or_else(|| Error::NotBoolean(input.into()))?,
        ),
        FilterType::Numerical => FilterValue::Number(
            input
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::NotNumeric(input.into()))?,
        ),
        FilterType::Literal | FilterType::LiteralList
            if matches!(cmp, Comparator::Regex | Comparator::RegexOnly) =>
        {
            FilterValue::Pattern(anchored_regex(input)?)
        }
        FilterType::Literal | FilterType::LiteralList | FilterType::Modification => {
            FilterValue::Text(input.into())
        }
    };

    Ok(Filter::new(
        short_name,
        d.filter_type,
        d.target,
        d.classes.to_vec(),
        cmp,
        value,
        negate,
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validation() {
        assert_eq!(new_filter("", "EQ", "2", false), Err(Error::MissingFilter));
        assert_eq!(new_filter("charge_filter", " ", "2", false), Err(Error::MissingComparator));
        assert_eq!(
            new_filter("charges_filter", "EQ", "2", false),
            Err(Error::UnknownFilter("charges_filter".into()))
        );
        assert_eq!(
            new_filter("charge_filter", "CON", "2", false),
            Err(Error::UnsupportedComparator {
                filter: "charge_filter".into(),
                comparator: "CON".into()
            })
        );
        assert_eq!(
            new_filter("charge_filter", "EQ", "two", false),
            Err(Error::NotNumeric("two".into()))
        );
        assert_eq!(
            new_filter("psm_unique_filter", "EQ", "maybe", false),
            Err(Error::NotBoolean("maybe".into()))
        );
        assert!(matches!(
            new_filter("psm_sequence_filter", "REG", "PEP(", false),
            Err(Error::InvalidRegex { .. })
        ));
        assert!(matches!(
            new_filter("charge_filter", "~", "2", false),
            Err(Error::UnknownComparator(_))
        ));
    }

    #[test]
    fn score_filters() {
        let f = new_filter("psm_score_filter_mascot_score", "GEQ", "20", false).unwrap();
        assert_eq!(f.target(), &Target::Score("mascot_score".into()));
        assert!(f.supports(ItemClass::Psm) && !f.supports(ItemClass::PsmSet));

        let f = new_filter("psm_score_filter_psm_combined_fdr_score", "LEQ", "0.01", false).unwrap();
        assert!(f.supports(ItemClass::PsmSet) && !f.supports(ItemClass::Psm));

        let f = new_filter("peptide_score_filter_peptide_q_value", "LEQ", "0.01", false).unwrap();
        assert!(f.supports(ItemClass::Peptide));

        let f = new_filter("psm_top_identification_filter_mascot_score", "EQ", "1", true).unwrap();
        assert_eq!(f.target(), &Target::IdentificationRank("mascot_score".into()));
        assert!(f.is_negated());
    }

    #[test]
    fn every_registered_filter_can_be_created() {
        for name in registered_filters(&["mascot_score".to_string()]) {
            let d = descriptor(&name).unwrap();
            let cmp = d.filter_type.comparators()[0];
            let input = match d.filter_type {
                FilterType::Bool => "true",
                FilterType::Numerical => "1",
                _ => "X",
            };
            assert!(new_filter(&name, cmp.short_name(), input, false).is_ok(), "{}", name);
        }
    }
}
