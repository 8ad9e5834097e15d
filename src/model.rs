//! The read-only input graph: files, raw PSMs, accessions, peptides and the
//! peptide-protein groups they form
//!
//! The graph is produced by an external reader and handed over as a
//! snapshot. Nothing in this crate mutates it after construction.
use crate::error::Error;
use crate::ident_key::KeySetting;
use crate::score::{ScoreModel, Scored};
use crate::util::H_MASS;
use std::collections::{BTreeMap, BTreeSet};

/// A modification at one position of a peptide sequence
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Modification {
    pub accession: Option<String>,
    pub description: Option<String>,
    /// Monoisotopic mass delta
    pub mass: f64,
    /// Modified residue, `.` for a terminus
    pub residue: char,
}

impl Modification {
    pub fn new(residue: char, mass: f64) -> Self {
        Modification {
            accession: None,
            description: None,
            mass,
            residue,
        }
    }

    pub fn with_accession(mut self, accession: &str) -> Self {
        self.accession = Some(accession.into());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One raw peptide-spectrum match, as reported by a search engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Spectrum {
    pub id: u64,
    pub file_id: u64,
    pub sequence: String,
    pub charge: i32,
    pub mass_to_charge: f64,
    /// Difference between theoretical and measured mass, NaN if unknown
    pub delta_mass: f64,
    pub retention_time: Option<f64>,
    pub source_id: Option<String>,
    pub spectrum_title: Option<String>,
    /// -1 if unknown
    pub missed_cleavages: i32,
    pub modifications: BTreeMap<usize, Modification>,
    pub scores: Vec<ScoreModel>,
    pub is_decoy: Option<bool>,
    pub is_unique: Option<bool>,
    pub accessions: Vec<String>,
}

impl Spectrum {
    pub fn new(id: u64, file_id: u64, sequence: &str, charge: i32, mass_to_charge: f64) -> Self {
        Spectrum {
            id,
            file_id,
            sequence: sequence.into(),
            charge,
            mass_to_charge,
            delta_mass: f64::NAN,
            retention_time: None,
            source_id: None,
            spectrum_title: None,
            missed_cleavages: -1,
            modifications: BTreeMap::new(),
            scores: Vec::new(),
            is_decoy: None,
            is_unique: None,
            accessions: Vec::new(),
        }
    }

    pub fn with_retention_time(mut self, rt: f64) -> Self {
        self.retention_time = Some(rt);
        self
    }

    pub fn with_source_id(mut self, source_id: &str) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.spectrum_title = Some(title.into());
        self
    }

    pub fn with_delta_mass(mut self, delta_mass: f64) -> Self {
        self.delta_mass = delta_mass;
        self
    }

    pub fn with_missed_cleavages(mut self, missed: i32) -> Self {
        self.missed_cleavages = missed;
        self
    }

    pub fn with_modification(mut self, position: usize, modification: Modification) -> Self {
        self.modifications.insert(position, modification);
        self
    }

    pub fn with_score(mut self, short_name: &str, value: f64) -> Self {
        self.scores.push(ScoreModel::new(short_name, value));
        self
    }

    pub fn with_decoy(mut self, is_decoy: bool) -> Self {
        self.is_decoy = Some(is_decoy);
        self
    }

    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = Some(is_unique);
        self
    }

    pub fn with_accession(mut self, accession: &str) -> Self {
        self.accessions.push(accession.into());
        self
    }

    /// Mass deviation in parts per million, NaN if any input is missing
    pub fn delta_ppm(&self) -> f64 {
        self.delta_mass / (self.charge as f64 * (self.mass_to_charge - H_MASS)) * 1e6
    }
}

impl Scored for Spectrum {
    fn score(&self, short_name: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.short_name == short_name)
            .map(|s| s.value)
    }
}

/// A protein accession with its per-file metadata
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Accession {
    pub accession: String,
    pub descriptions: BTreeMap<u64, String>,
    /// Files the accession was reported in
    pub files: BTreeSet<u64>,
    pub db_sequence: Option<String>,
    pub search_databases: BTreeSet<String>,
}

impl Accession {
    pub fn new(accession: &str) -> Self {
        Accession {
            accession: accession.into(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file_id: u64) -> Self {
        self.files.insert(file_id);
        self
    }

    pub fn with_description(mut self, file_id: u64, description: &str) -> Self {
        self.files.insert(file_id);
        self.descriptions.insert(file_id, description.into());
        self
    }

    pub fn found_in(&self, file_id: u64) -> bool {
        file_id == 0 || self.files.contains(&file_id)
    }

    /// Description reported by the file, or any description for file 0
    pub fn description(&self, file_id: u64) -> Option<&str> {
        if file_id == 0 {
            self.descriptions.values().next().map(String::as_str)
        } else {
            self.descriptions.get(&file_id).map(String::as_str)
        }
    }
}

/// A peptide sequence and the raw PSMs identifying it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct InputPeptide {
    pub sequence: String,
    pub spectra: Vec<u64>,
}

/// Node of the peptide-protein graph
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Group {
    pub id: u64,
    pub tree_id: u64,
    /// Accessions attached directly to this group
    pub accessions: Vec<String>,
    /// Peptide sequences attached directly to this group
    pub peptides: Vec<String>,
    /// Groups below this one, whose peptides this group's accessions
    /// also explain
    pub children: Vec<u64>,
}

impl Group {
    pub fn new(id: u64, tree_id: u64) -> Self {
        Group {
            id,
            tree_id,
            accessions: Vec::new(),
            peptides: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_accession(mut self, accession: &str) -> Self {
        self.accessions.push(accession.into());
        self
    }

    pub fn with_peptide(mut self, sequence: &str) -> Self {
        self.peptides.push(sequence.into());
        self
    }

    pub fn with_child(mut self, group: u64) -> Self {
        self.children.push(group);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct InputFile {
    pub id: u64,
    pub name: String,
    pub short_name: String,
}

impl InputFile {
    pub fn new(id: u64, name: &str) -> Self {
        InputFile {
            id,
            name: name.into(),
            short_name: name.into(),
        }
    }
}

/// Snapshot of everything the reader produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputGraph {
    files: BTreeMap<u64, InputFile>,
    spectra: BTreeMap<u64, Spectrum>,
    accessions: BTreeMap<String, Accession>,
    peptides: BTreeMap<String, InputPeptide>,
    groups: BTreeMap<u64, Group>,
    key_warnings: BTreeMap<KeySetting, BTreeSet<u64>>,
}

impl InputGraph {
    pub fn new() -> Self {
        InputGraph::default()
    }

    pub fn add_file(&mut self, file: InputFile) -> Result<(), Error> {
        if file.id == 0 || self.files.contains_key(&file.id) {
            return Err(Error::InconsistentInput(format!(
                "duplicate or reserved file id {}",
                file.id
            )));
        }
        self.files.insert(file.id, file);
        Ok(())
    }

    /// Add a raw PSM. It is also attached to the input peptide of its
    /// sequence, which is created if needed.
    pub fn add_spectrum(&mut self, spectrum: Spectrum) -> Result<(), Error> {
        if !self.files.contains_key(&spectrum.file_id) {
            return Err(Error::UnknownFile(spectrum.file_id));
        }
        if self.spectra.contains_key(&spectrum.id) {
            return Err(Error::InconsistentInput(format!(
                "duplicate spectrum id {}",
                spectrum.id
            )));
        }
        self.peptides
            .entry(spectrum.sequence.clone())
            .or_insert_with(|| InputPeptide {
                sequence: spectrum.sequence.clone(),
                spectra: Vec::new(),
            })
            .spectra
            .push(spectrum.id);
        self.spectra.insert(spectrum.id, spectrum);
        Ok(())
    }

    pub fn add_accession(&mut self, accession: Accession) -> Result<(), Error> {
        if self.accessions.contains_key(&accession.accession) {
            return Err(Error::InconsistentInput(format!(
                "duplicate accession {}",
                accession.accession
            )));
        }
        self.accessions.insert(accession.accession.clone(), accession);
        Ok(())
    }

    pub fn add_group(&mut self, group: Group) -> Result<(), Error> {
        if self.groups.contains_key(&group.id) {
            return Err(Error::InconsistentInput(format!(
                "duplicate group id {}",
                group.id
            )));
        }
        self.groups.insert(group.id, group);
        Ok(())
    }

    /// Record that a key component is unreliable for a file
    pub fn add_key_warning(&mut self, setting: KeySetting, file_id: u64) {
        self.key_warnings.entry(setting).or_default().insert(file_id);
    }

    pub fn files(&self) -> &BTreeMap<u64, InputFile> {
        &self.files
    }

    pub fn spectra(&self) -> impl Iterator<Item = &Spectrum> {
        self.spectra.values()
    }

    pub fn spectrum(&self, id: u64) -> Option<&Spectrum> {
        self.spectra.get(&id)
    }

    pub fn accession(&self, accession: &str) -> Option<&Accession> {
        self.accessions.get(accession)
    }

    pub fn accessions(&self) -> &BTreeMap<String, Accession> {
        &self.accessions
    }

    pub fn peptide(&self, sequence: &str) -> Option<&InputPeptide> {
        self.peptides.get(sequence)
    }

    pub fn groups(&self) -> &BTreeMap<u64, Group> {
        &self.groups
    }

    pub fn key_warnings(&self) -> &BTreeMap<KeySetting, BTreeSet<u64>> {
        &self.key_warnings
    }

    /// Ids of the group and every group below it. Ids that are missing from
    /// the graph are returned in the second set.
    pub fn descendants(&self, group_id: u64) -> (BTreeSet<u64>, BTreeSet<u64>) {
        let mut seen = BTreeSet::new();
        let mut missing = BTreeSet::new();
        let mut stack = vec![group_id];
        while let Some(id) = stack.pop() {
            match self.groups.get(&id) {
                Some(group) => {
                    if seen.insert(id) {
                        stack.extend(group.children.iter().copied());
                    }
                }
                None => {
                    missing.insert(id);
                }
            }
        }
        (seen, missing)
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duplicates_are_rejected() {
        let mut g = test_graph::merge_graph();
        assert!(g.add_file(InputFile::new(1, "again")).is_err());
        assert!(g.add_file(InputFile::new(0, "overview")).is_err());
        assert_eq!(
            g.add_spectrum(Spectrum::new(9, 7, "AAA", 1, 100.0)),
            Err(Error::UnknownFile(7))
        );
        assert!(g.add_spectrum(Spectrum::new(1, 1, "AAA", 1, 100.0)).is_err());
        assert!(g.add_accession(Accession::new("P12345")).is_err());
        assert_eq!(g.peptide("PEPTIDE").map(|p| p.spectra.len()), Some(2));
    }

    #[test]
    fn descendants_and_descriptions() {
        let mut g = test_graph::subset_graph();
        let (ids, missing) = g.descendants(1);
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(missing.is_empty());

        g.add_group(Group::new(3, 2).with_child(42)).unwrap();
        let (_, missing) = g.descendants(3);
        assert!(missing.contains(&42));

        let x = g.accession("X").unwrap();
        assert_eq!(x.description(0), Some("protein X"));
        assert_eq!(x.description(2), None);
        assert!(x.found_in(1) && !x.found_in(2));
    }

    #[test]
    fn ppm() {
        let s = Spectrum::new(1, 1, "A", 2, 501.007276).with_delta_mass(0.001);
        assert!((s.delta_ppm() - 1.0).abs() < 1e-9);
        assert_eq!(s.score("mascot_score"), None);
    }
}
