//! Filter rule parser. Reads sectioned rule text line by line, one filter
//! per line: `short_name [not] COMPARATOR operand`
use super::*;
use crate::error::Error;

#[derive(PartialEq, Debug)]
enum ErrorKind<'s> {
    Section(&'s str),
    Expected(&'static str),
    Rule(Error),
}

impl<'s> fmt::Display for ErrorKind<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Section(s) => write!(f, "rule '{}' outside of a psm, peptide or protein section", s),
            ErrorKind::Expected(s) => write!(f, "expected {}", s),
            ErrorKind::Rule(e) => write!(f, "{}", e),
        }
    }
}

fn take_while<'s, F: Fn(char) -> bool>(input: &'s str, pred: F) -> (&'s str, &'s str) {
    let mut iter = input.chars();
    loop {
        let rest = iter.as_str();
        match iter.next() {
            Some(c) if pred(c) => {}
            _ => {
                if rest.len() != input.len() {
                    let ret = &input[..input.len() - rest.len()];
                    return (ret, rest);
                } else {
                    return ("", rest);
                }
            }
        }
    }
}

#[inline]
fn take_whitespace(input: &str) -> &str {
    input.trim_start_matches(char::is_whitespace)
}

#[inline]
fn take_word(input: &str) -> (&str, &str) {
    take_while(input, |ch| !ch.is_whitespace())
}

fn expect<'s>(input: &'s str, m: &'static str) -> Option<&'s str> {
    input.strip_prefix(m)
}

/// Filters grouped by the level they were configured for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRules {
    psm: Vec<Filter>,
    peptide: Vec<Filter>,
    protein: Vec<Filter>,
}

impl FilterRules {
    pub fn add_psm_filter(mut self, filter: Filter) -> Self {
        self.psm.push(filter);
        self
    }

    pub fn add_peptide_filter(mut self, filter: Filter) -> Self {
        self.peptide.push(filter);
        self
    }

    pub fn add_protein_filter(mut self, filter: Filter) -> Self {
        self.protein.push(filter);
        self
    }

    pub fn psm_filters(&self) -> &[Filter] {
        &self.psm
    }

    pub fn peptide_filters(&self) -> &[Filter] {
        &self.peptide
    }

    pub fn protein_filters(&self) -> &[Filter] {
        &self.protein
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum Section {
    Psm,
    Peptide,
    Protein,
}

fn parse_section(line: &str) -> Option<Section> {
    let (word, rest) = take_while(line, char::is_alphabetic);
    let section = match word {
        "psm" => Section::Psm,
        "peptide" => Section::Peptide,
        "protein" => Section::Protein,
        _ => return None,
    };
    let rest = expect(take_whitespace(rest), ":")?;
    if take_whitespace(rest).is_empty() {
        Some(section)
    } else {
        None
    }
}

fn parse_rule(line: &str) -> Result<Filter, ErrorKind<'_>> {
    let (short, rest) = take_word(take_whitespace(line));
    let (word, after) = take_word(take_whitespace(rest));
    let (negate, rest) = if word == "not" {
        (true, after)
    } else {
        (false, rest)
    };
    let (comparator, rest) = take_word(take_whitespace(rest));
    if comparator.is_empty() {
        return Err(ErrorKind::Expected("a comparator"));
    }
    let operand = rest.trim();
    new_filter(short, comparator, operand, negate).map_err(ErrorKind::Rule)
}

/// Parse rule text into filters per level. Empty lines and lines starting
/// with `#` are skipped.
pub fn parse_rules(input: &str) -> Result<FilterRules, Error> {
    let mut rules = FilterRules::default();
    let mut section = None;

    for (idx, line) in input.lines().enumerate() {
        let line = take_whitespace(line);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(s) = parse_section(line) {
            section = Some(s);
            continue;
        }

        let parsed = match section {
            None => Err(ErrorKind::Section(line)),
            Some(s) => parse_rule(line).map(|f| (s, f)),
        };
        match parsed {
            Ok((Section::Psm, filter)) => rules = rules.add_psm_filter(filter),
            Ok((Section::Peptide, filter)) => rules = rules.add_peptide_filter(filter),
            Ok((Section::Protein, filter)) => rules = rules.add_protein_filter(filter),
            Err(e) => {
                return Err(Error::Parse {
                    line: idx + 1,
                    kind: e.to_string(),
                })
            }
        }
    }
    Ok(rules)
}
