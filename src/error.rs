//! Errors reported to callers for configuration problems
//!
//! Missing data (an unknown file id when asking for a report, peptides
//! requested before inference) is not an error: it is logged and answered
//! with an empty result.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Please select a filter!")]
    MissingFilter,

    #[error("Please select a comparator!")]
    MissingComparator,

    #[error("Unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("Unknown comparator '{0}'")]
    UnknownComparator(String),

    #[error("The comparator {comparator} is not supported by {filter}")]
    UnsupportedComparator { filter: String, comparator: String },

    #[error("please enter a numerical value (got '{0}')")]
    NotNumeric(String),

    #[error("please enter true or false (got '{0}')")]
    NotBoolean(String),

    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Unknown score '{0}'")]
    UnknownScore(String),

    #[error("No FDR score could be selected for file {0}")]
    NoFdrScore(u64),

    #[error("Unknown file id {0}")]
    UnknownFile(u64),

    #[error("Unknown protein inference method '{0}'")]
    UnknownInference(String),

    #[error("Unknown protein scoring method '{0}'")]
    UnknownScoring(String),

    #[error("Inconsistent input: {0}")]
    InconsistentInput(String),

    #[error("Error parsing filter rules at line {line}: {kind}")]
    Parse { line: usize, kind: String },
}
