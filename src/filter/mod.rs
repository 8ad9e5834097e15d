//! Composable filters over PSMs, PSM sets, peptides and proteins
//!
//! A filter reads one attribute from an item and compares it with an
//! operand. Filters are usually created by name through [`new_filter`] or
//! read from rule text with [`parse_rules`]:
//!
//! ```ignore
//! psm:
//!     charge_filter EQ 2
//!     psm_score_filter_mascot_score GEQ 20
//! peptide:
//!     peptide_sequence_filter not CON C
//! protein:
//!     nr_peptides_per_protein_filter GEQ 2
//! ```
//!
use crate::model::Modification;
use regex::Regex;
use std::fmt;
use tracing::warn;

mod parse;
mod registered;

pub use parse::{parse_rules, FilterRules};
pub use registered::{new_filter, registered_filters};

/// Tolerance of the modification mass comparison
pub const MODIFICATION_MASS_TOLERANCE: f64 = 0.001;

/// Kinds of report items a filter can be applied to
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ItemClass {
    Psm,
    PsmSet,
    Peptide,
    Protein,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Comparator {
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    Contains,
    ContainsOnly,
    Regex,
    RegexOnly,
    HasAnyModification,
    HasDescription,
    HasMass,
    HasResidue,
}

impl Comparator {
    pub const ALL: [Comparator; 13] = [
        Comparator::Less,
        Comparator::LessEqual,
        Comparator::Equal,
        Comparator::GreaterEqual,
        Comparator::Greater,
        Comparator::Contains,
        Comparator::ContainsOnly,
        Comparator::Regex,
        Comparator::RegexOnly,
        Comparator::HasAnyModification,
        Comparator::HasDescription,
        Comparator::HasMass,
        Comparator::HasResidue,
    ];

    /// Short name used in rule text, e.g. `LEQ`
    pub fn short_name(&self) -> &'static str {
        match self {
            Comparator::Less => "LT",
            Comparator::LessEqual => "LEQ",
            Comparator::Equal => "EQ",
            Comparator::GreaterEqual => "GEQ",
            Comparator::Greater => "GT",
            Comparator::Contains => "CON",
            Comparator::ContainsOnly => "CON_ONLY",
            Comparator::Regex => "REG",
            Comparator::RegexOnly => "REG_ONLY",
            Comparator::HasAnyModification => "HAS_ANY_MOD",
            Comparator::HasDescription => "HAS_DESC",
            Comparator::HasMass => "HAS_MASS",
            Comparator::HasResidue => "HAS_RES",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Comparator::Less => "less",
            Comparator::LessEqual => "less_equal",
            Comparator::Equal => "equal",
            Comparator::GreaterEqual => "greater_equal",
            Comparator::Greater => "greater",
            Comparator::Contains => "contains",
            Comparator::ContainsOnly => "contains_only",
            Comparator::Regex => "regex",
            Comparator::RegexOnly => "regex_only",
            Comparator::HasAnyModification => "has_any_modification",
            Comparator::HasDescription => "has_description",
            Comparator::HasMass => "has_mass",
            Comparator::HasResidue => "has_residue",
        }
    }

    /// Accepts short names and long names
    pub fn parse(name: &str) -> Option<Comparator> {
        Comparator::ALL
            .iter()
            .copied()
            .find(|c| c.short_name().eq_ignore_ascii_case(name) || c.name() == name)
    }
}

/// The type of value a filter compares, which fixes its comparators
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum FilterType {
    Bool,
    Numerical,
    Literal,
    LiteralList,
    Modification,
}

impl FilterType {
    pub fn comparators(&self) -> &'static [Comparator] {
        use Comparator::*;
        match self {
            FilterType::Bool => &[Equal],
            FilterType::Numerical => &[Less, LessEqual, Equal, GreaterEqual, Greater],
            FilterType::Literal => &[Equal, Contains, Regex],
            FilterType::LiteralList => &[Contains, ContainsOnly, Regex, RegexOnly],
            FilterType::Modification => &[HasAnyModification, HasDescription, HasMass, HasResidue],
        }
    }

    pub fn supports(&self, comparator: Comparator) -> bool {
        self.comparators().contains(&comparator)
    }
}

/// The attribute of an item a filter reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Charge,
    DeltaMass,
    DeltaPpm,
    MassToCharge,
    /// Accessions, refined to a file
    Accessions,
    /// Accession descriptions, refined to a file
    Descriptions,
    FileNames,
    MissedCleavages,
    Modifications,
    Rank,
    Sequence,
    /// The protein's peptide sequences
    Sequences,
    Unique,
    SourceId,
    SourceIds,
    NrAccessions,
    NrPsms,
    NrSpectra,
    NrPeptides,
    NrUniquePeptides,
    NrGroupUniquePeptides,
    Score(String),
    IdentificationRank(String),
}

/// A value read from an item
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Bools(Vec<bool>),
    Numbers(Vec<f64>),
    Texts(Vec<String>),
    Modifications(Vec<Modification>),
}

/// Report items that can be filtered
pub trait Filterable {
    fn item_class(&self) -> ItemClass;

    /// The attribute's value, refined to `file_id` where that makes sense.
    /// `None` if the item does not carry it.
    fn attribute(&self, target: &Target, file_id: u64) -> Option<AttributeValue>;
}

/// A filter operand
#[derive(Debug, Clone)]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Anchored regular expression, matching whole strings only
    Pattern(Regex),
}

impl PartialEq for FilterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FilterValue::Bool(a), FilterValue::Bool(b)) => a == b,
            (FilterValue::Number(a), FilterValue::Number(b)) => a == b,
            (FilterValue::Text(a), FilterValue::Text(b)) => a == b,
            (FilterValue::Pattern(a), FilterValue::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Text(s) => write!(f, "{}", s),
            // strip the anchors added on construction
            FilterValue::Pattern(re) => {
                let s = re.as_str();
                let inner = s
                    .strip_prefix("^(?:")
                    .and_then(|s| s.strip_suffix(")$"))
                    .unwrap_or(s);
                write!(f, "{}", inner)
            }
        }
    }
}

/// One configured filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    short_name: String,
    filter_type: FilterType,
    target: Target,
    classes: Vec<ItemClass>,
    comparator: Comparator,
    value: FilterValue,
    negate: bool,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name)?;
        if self.negate {
            write!(f, " not")?;
        }
        write!(f, " {} {}", self.comparator.short_name(), self.value)
    }
}

/// Element of a collection value, compared on its own
enum Scalar<'a> {
    Bool(bool),
    Number(f64),
    Text(&'a str),
}

impl Filter {
    pub(crate) fn new(
        short_name: &str,
        filter_type: FilterType,
        target: Target,
        classes: Vec<ItemClass>,
        comparator: Comparator,
        value: FilterValue,
        negate: bool,
    ) -> Self {
        Filter {
            short_name: short_name.into(),
            filter_type,
            target,
            classes,
            comparator,
            value,
            negate,
        }
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    /// The same filter with its outcome inverted
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn supports(&self, class: ItemClass) -> bool {
        self.classes.contains(&class)
    }

    /// Does the item pass? Missing attributes never satisfy the un-negated
    /// filter.
    pub fn satisfies<T: Filterable + ?Sized>(&self, item: &T, file_id: u64) -> bool {
        let base = item
            .attribute(&self.target, file_id)
            .map_or(false, |value| self.evaluate(&value));
        base ^ self.negate
    }

    fn evaluate(&self, value: &AttributeValue) -> bool {
        match self.filter_type {
            FilterType::Bool | FilterType::Numerical | FilterType::Literal => match value {
                AttributeValue::Bool(b) => self.compare_scalar(Scalar::Bool(*b)),
                AttributeValue::Number(n) => self.compare_scalar(Scalar::Number(*n)),
                AttributeValue::Text(s) => self.compare_scalar(Scalar::Text(s)),
                AttributeValue::Bools(v) => {
                    !v.is_empty() && v.iter().all(|b| self.compare_scalar(Scalar::Bool(*b)))
                }
                AttributeValue::Numbers(v) => {
                    !v.is_empty() && v.iter().all(|n| self.compare_scalar(Scalar::Number(*n)))
                }
                AttributeValue::Texts(v) => {
                    !v.is_empty() && v.iter().all(|s| self.compare_scalar(Scalar::Text(s)))
                }
                AttributeValue::Modifications(_) => false,
            },
            FilterType::LiteralList => match value {
                AttributeValue::Texts(list) => self.compare_list(list),
                AttributeValue::Text(s) => self.compare_list(std::slice::from_ref(s)),
                _ => false,
            },
            FilterType::Modification => match value {
                AttributeValue::Modifications(mods) => self.compare_modifications(mods),
                _ => false,
            },
        }
    }

    fn compare_scalar(&self, scalar: Scalar<'_>) -> bool {
        match (scalar, &self.value) {
            (Scalar::Bool(v), FilterValue::Bool(op)) => self.comparator == Comparator::Equal && v == *op,
            (Scalar::Number(v), FilterValue::Number(op)) => {
                if v.is_nan() {
                    return false;
                }
                match self.comparator {
                    Comparator::Less => v < *op,
                    Comparator::LessEqual => v <= *op,
                    Comparator::Equal => v == *op,
                    Comparator::GreaterEqual => v >= *op,
                    Comparator::Greater => v > *op,
                    _ => false,
                }
            }
            (Scalar::Text(v), FilterValue::Text(op)) => match self.comparator {
                Comparator::Equal => v == op.as_str(),
                Comparator::Contains => v.contains(op.as_str()),
                _ => false,
            },
            (Scalar::Text(v), FilterValue::Pattern(re)) => {
                self.comparator == Comparator::Regex && re.is_match(v)
            }
            _ => false,
        }
    }

    fn compare_list(&self, list: &[String]) -> bool {
        match (&self.value, self.comparator) {
            (FilterValue::Text(op), Comparator::Contains) => list.iter().any(|s| s == op),
            (FilterValue::Text(op), Comparator::ContainsOnly) => {
                !list.is_empty() && list.iter().all(|s| s == op)
            }
            (FilterValue::Pattern(re), Comparator::Regex) => list.iter().any(|s| re.is_match(s)),
            (FilterValue::Pattern(re), Comparator::RegexOnly) => {
                !list.is_empty() && list.iter().all(|s| re.is_match(s))
            }
            _ => false,
        }
    }

    fn compare_modifications(&self, mods: &[Modification]) -> bool {
        let op = match &self.value {
            FilterValue::Text(op) => op.as_str(),
            _ => return false,
        };
        match self.comparator {
            Comparator::HasAnyModification => !mods.is_empty(),
            Comparator::HasDescription => mods
                .iter()
                .any(|m| m.description.as_deref() == Some(op)),
            Comparator::HasMass => match op.trim().parse::<f64>() {
                Ok(mass) => mods
                    .iter()
                    .any(|m| (m.mass - mass).abs() <= MODIFICATION_MASS_TOLERANCE),
                Err(_) => {
                    warn!("{}: '{}' is not a modification mass", self.short_name, op);
                    false
                }
            },
            Comparator::HasResidue => {
                let mut chars = op.trim().chars();
                match (chars.next(), chars.next()) {
                    (Some(residue), None) => mods.iter().any(|m| m.residue == residue),
                    _ => {
                        warn!("{}: '{}' is not a residue", self.short_name, op);
                        false
                    }
                }
            }
            _ => false,
        }
    }
}

/// Does the item pass every filter that applies to its class? Filters for
/// other classes are skipped.
pub fn satisfies_filter_list<T: Filterable + ?Sized>(item: &T, file_id: u64, filters: &[Filter]) -> bool {
    let class = item.item_class();
    filters
        .iter()
        .filter(|f| f.supports(class))
        .all(|f| f.satisfies(item, file_id))
}

/// Copies of the items passing every applicable filter
pub fn apply_filters<T: Filterable + Clone>(items: &[T], filters: &[Filter], file_id: u64) -> Vec<T> {
    items
        .iter()
        .filter(|item| satisfies_filter_list(*item, file_id, filters))
        .cloned()
        .collect()
}

/// Whether any of the filters applies to the class
pub fn supports_class(filters: &[Filter], class: ItemClass) -> bool {
    filters.iter().any(|f| f.supports(class))
}
