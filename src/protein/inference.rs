//! Protein inference over the group graph
//!
//! Every tree of the graph is processed on its own. A group explains its own
//! peptides and those of every group below it; the peptides are rebuilt from
//! the PSM sets under the inference filters first.
use super::scoring::score_protein;
use super::{Inconsistency, InferenceMethod, PsmForScoring, ReportProtein, ScoringMethod};
use crate::filter::{satisfies_filter_list, Filter, ItemClass};
use crate::model::{Group, InputGraph};
use crate::peptide::{peptide_string_id, ReportPeptide};
use crate::psm::{PsmItem, PsmModeller, ReportPsm, ReportPsmSet};
use crate::score::ScoreRegistry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything one inference run reads
pub struct InferenceInput<'a> {
    pub graph: &'a InputGraph,
    pub psm: &'a PsmModeller,
    /// Peptides of the overview, reused when a rebuilt peptide has the same
    /// PSM sets
    pub overview_peptides: &'a [ReportPeptide],
    pub filters: &'a [Filter],
    pub consider_modifications: bool,
    pub method: InferenceMethod,
    pub scoring: ScoringMethod,
    pub psms_for_scoring: PsmForScoring,
    /// Proteins stay unscored without a base score
    pub base_score: Option<&'a str>,
    pub registry: &'a ScoreRegistry,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceOutput {
    pub proteins: Vec<ReportProtein>,
    pub inconsistencies: Vec<Inconsistency>,
}

struct Candidate {
    protein: ReportProtein,
    keys: BTreeSet<String>,
}

impl Candidate {
    fn smallest_accession(&self) -> Option<&str> {
        self.protein.accession_names().next()
    }
}

/// Which PSM sets, and which of their members, make up the items
fn item_signature(items: &[PsmItem]) -> BTreeSet<(String, Vec<u64>)> {
    items
        .iter()
        .map(|item| {
            let mut ids = item.psms().iter().map(ReportPsm::id).collect::<Vec<_>>();
            ids.sort_unstable();
            let key = match item {
                PsmItem::Set(set) => set.key(),
                PsmItem::Psm(psm) => psm.spectrum_key(),
            };
            (key.to_string(), ids)
        })
        .collect()
}

struct Run<'a, 'i> {
    input: &'i InferenceInput<'a>,
    member_filters: Vec<Filter>,
    overview: BTreeMap<&'a str, &'a ReportPeptide>,
    inconsistencies: BTreeSet<Inconsistency>,
}

impl<'a, 'i> Run<'a, 'i> {
    fn report(&mut self, inconsistency: Inconsistency) {
        if !self.inconsistencies.contains(&inconsistency) {
            warn!("inconsistent input: {}", inconsistency);
            self.inconsistencies.insert(inconsistency);
        }
    }

    /// The peptides of the group's own sequences that pass the filters
    fn group_peptides(&mut self, group: &Group) -> Vec<ReportPeptide> {
        let input = self.input;
        let mut partial: BTreeMap<&str, (&ReportPsmSet, Vec<ReportPsm>)> = BTreeMap::new();

        for sequence in &group.peptides {
            let peptide = match input.graph.peptide(sequence) {
                Some(p) => p,
                None => {
                    self.report(Inconsistency::MissingPeptide {
                        group_id: group.id,
                        sequence: sequence.clone(),
                    });
                    continue;
                }
            };
            for &spectrum_id in &peptide.spectra {
                let found = input.psm.psm_set_of_spectrum(spectrum_id).and_then(|set| {
                    set.psms()
                        .iter()
                        .find(|p| p.id() == spectrum_id)
                        .map(|p| (set, p))
                });
                let (set, member) = match found {
                    Some(found) => found,
                    None => {
                        self.report(Inconsistency::MissingPsmSet {
                            spectrum_id,
                            peptide: sequence.clone(),
                        });
                        continue;
                    }
                };
                if !satisfies_filter_list(member, member.file_id(), &self.member_filters) {
                    continue;
                }
                partial
                    .entry(set.key())
                    .or_insert_with(|| (set, Vec::new()))
                    .1
                    .push(member.clone());
            }
        }

        let mut peptides: BTreeMap<String, ReportPeptide> = BTreeMap::new();
        for (key, (set, members)) in partial {
            let complete = members.len() == set.psms().len()
                && set.psms().iter().all(|p| members.iter().any(|m| m.id() == p.id()));
            let set = if complete {
                set.clone()
            } else {
                ReportPsmSet::new(key.to_string(), members, input.registry)
            };
            if !satisfies_filter_list(&set, 0, input.filters) {
                continue;
            }
            let item = PsmItem::Set(set);
            let id = peptide_string_id(&item, input.consider_modifications);
            peptides
                .entry(id.clone())
                .or_insert_with(|| ReportPeptide::new(id, item.sequence()))
                .add_item(item);
        }

        let mut out = Vec::with_capacity(peptides.len());
        for (id, mut peptide) in peptides {
            let peptide = match self.overview.get(id.as_str()) {
                Some(known) if item_signature(known.items()) == item_signature(peptide.items()) => {
                    (*known).clone()
                }
                _ => {
                    peptide.refresh_best_scores(input.registry);
                    peptide
                }
            };
            if satisfies_filter_list(&peptide, 0, input.filters) {
                out.push(peptide);
            }
        }
        out
    }

    /// One candidate per group with accessions and reachable peptides, in
    /// group id order
    fn candidates(&mut self, groups: &[&Group]) -> Vec<Candidate> {
        let graph = self.input.graph;
        let mut peptides = BTreeMap::new();
        for group in groups {
            let list = self.group_peptides(group);
            if !list.is_empty() {
                peptides.insert(group.id, list);
            }
        }

        let mut candidates = Vec::new();
        for group in groups.iter().filter(|g| !g.accessions.is_empty()) {
            let (ids, missing) = graph.descendants(group.id);
            for id in missing {
                self.report(Inconsistency::MissingGroup {
                    group_id: id,
                    parent: group.id,
                });
            }

            let mut protein = ReportProtein::new(group.id);
            for id in ids {
                for peptide in peptides.get(&id).into_iter().flatten() {
                    if !protein.add_peptide(peptide.clone()) {
                        debug!("peptide {} already in group {}", peptide.id(), group.id);
                    }
                }
            }
            if protein.nr_peptides() == 0 {
                continue;
            }

            for name in &group.accessions {
                match graph.accession(name) {
                    Some(acc) => protein.add_accession(Arc::new(acc.clone())),
                    None => self.report(Inconsistency::MissingAccession {
                        group_id: group.id,
                        accession: name.clone(),
                    }),
                }
            }
            if protein.accession_names().next().is_none() {
                continue;
            }

            let keys = protein.peptide_ids().into_iter().map(String::from).collect();
            candidates.push(Candidate { protein, keys });
        }
        candidates
    }

    /// Score the candidates and keep the ones passing the protein filters
    fn score_and_filter(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let input = self.input;
        candidates
            .into_iter()
            .filter_map(|mut c| {
                if let Some(base) = input.base_score {
                    let score =
                        score_protein(&c.protein, input.scoring, input.psms_for_scoring, base, input.registry);
                    c.protein.set_score(score);
                }
                satisfies_filter_list(&c.protein, 0, input.filters).then(|| c)
            })
            .collect()
    }
}

/// Fold candidates with identical evidence into the first one of them
fn merge_same_sets(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match merged.iter_mut().find(|m| m.keys == candidate.keys) {
            Some(same) => {
                for acc in candidate.protein.accessions() {
                    same.protein.add_accession(Arc::clone(acc));
                }
            }
            None => merged.push(candidate),
        }
    }
    merged
}

/// Report the fewest candidates that explain all peptides of one tree
fn occams_razor(candidates: &[Candidate]) -> Vec<ReportProtein> {
    let n = candidates.len();
    let mut subsets = vec![Vec::new(); n];
    let mut intersecting = vec![false; n];
    let mut is_subset = vec![false; n];

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let shared = candidates[i].keys.intersection(&candidates[j].keys).count();
            if shared == 0 {
                continue;
            }
            if shared == candidates[j].keys.len() {
                subsets[i].push(j);
            } else if shared == candidates[i].keys.len() {
                is_subset[i] = true;
            } else {
                intersecting[i] = true;
            }
        }
    }

    let mut reported = Vec::new();
    let mut reported_keys: BTreeSet<&str> = BTreeSet::new();
    let mut unreported = (0..n).collect::<BTreeSet<_>>();

    for i in 0..n {
        if !intersecting[i] && !is_subset[i] {
            reported.push(i);
            reported_keys.extend(candidates[i].keys.iter().map(String::as_str));
            unreported.remove(&i);
            for s in &subsets[i] {
                unreported.remove(s);
            }
        }
    }

    let mut order = (0..n).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        candidates[a]
            .smallest_accession()
            .cmp(&candidates[b].smallest_accession())
            .then(candidates[a].protein.id().cmp(&candidates[b].protein.id()))
    });

    while !unreported.is_empty() {
        let mut best: Vec<usize> = Vec::new();
        let mut best_new: Option<BTreeSet<&str>> = None;
        for &i in order.iter().filter(|&&i| unreported.contains(&i) && !is_subset[i]) {
            let new = candidates[i]
                .keys
                .iter()
                .map(String::as_str)
                .filter(|k| !reported_keys.contains(k))
                .collect::<BTreeSet<_>>();
            match &best_new {
                Some(b) if new.len() < b.len() => {}
                Some(b) if new.len() == b.len() => {
                    if &new == b {
                        best.push(i);
                    }
                }
                _ => {
                    best = vec![i];
                    best_new = Some(new);
                }
            }
        }

        // only subsets are left
        let best_new = match best_new {
            Some(b) => b,
            None => break,
        };
        for i in best {
            if !best_new.is_empty() {
                reported.push(i);
                reported_keys.extend(candidates[i].keys.iter().map(String::as_str));
            }
            unreported.remove(&i);
            for s in &subsets[i] {
                unreported.remove(s);
            }
        }
    }

    reported
        .into_iter()
        .map(|i| {
            let mut protein = candidates[i].protein.clone();
            for &s in &subsets[i] {
                protein.add_subset(candidates[s].protein.clone());
            }
            protein
        })
        .collect()
}

/// Infer the proteins of every tree in the graph
#[tracing::instrument(skip_all, level = "debug")]
pub fn infer(input: &InferenceInput<'_>) -> InferenceOutput {
    info!(
        "protein inference: {}, {} on {} ({})",
        input.method.short_name(),
        input.scoring.short_name(),
        input.base_score.unwrap_or("no score"),
        input.psms_for_scoring.short_name()
    );

    let member_filters = input
        .filters
        .iter()
        .filter(|f| f.supports(ItemClass::Psm) && !f.supports(ItemClass::PsmSet))
        .cloned()
        .collect();
    let mut run = Run {
        input,
        member_filters,
        overview: input.overview_peptides.iter().map(|p| (p.id(), p)).collect(),
        inconsistencies: BTreeSet::new(),
    };

    let mut trees: BTreeMap<u64, Vec<&Group>> = BTreeMap::new();
    for group in input.graph.groups().values() {
        trees.entry(group.tree_id).or_default().push(group);
    }

    let mut proteins = Vec::new();
    for groups in trees.values() {
        let candidates = run.candidates(groups);
        if candidates.is_empty() {
            continue;
        }
        match input.method {
            InferenceMethod::OccamsRazor => {
                let candidates = run.score_and_filter(merge_same_sets(candidates));
                proteins.extend(occams_razor(&candidates));
            }
            InferenceMethod::ReportAll => {
                let candidates = if input.filters.is_empty() {
                    candidates
                } else {
                    merge_same_sets(candidates)
                };
                proteins.extend(run.score_and_filter(candidates).into_iter().map(|c| c.protein));
            }
        }
    }

    info!("inferred {} proteins in {} trees", proteins.len(), trees.len());
    InferenceOutput {
        proteins,
        inconsistencies: run.inconsistencies.into_iter().collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Settings;
    use crate::filter::new_filter;
    use crate::model::test_graph::subset_graph;
    use crate::model::{Accession, InputFile, Spectrum};
    use crate::peptide::PeptideModeller;

    /// A {p1, p2} and B {p2, p3} intersect, C and D both only explain p3
    fn intersecting_graph() -> InputGraph {
        let mut g = InputGraph::new();
        g.add_file(InputFile::new(1, "search.dat")).unwrap();
        for acc in ["A", "B", "C", "D"] {
            g.add_accession(Accession::new(acc).with_file(1)).unwrap();
        }
        let peptides: [(&str, &[&str]); 3] = [("PPPK", &["A"]), ("QQQK", &["A", "B"]), ("RRRK", &["B", "C", "D"])];
        for (idx, (seq, accs)) in peptides.iter().enumerate() {
            let mut s = Spectrum::new(idx as u64 + 1, 1, seq, 2, 400.0 + idx as f64)
                .with_retention_time(60.0 * idx as f64)
                .with_score("mascot_score", 30.0 + idx as f64);
            for acc in accs.iter() {
                s = s.with_accession(acc);
            }
            g.add_spectrum(s).unwrap();
        }
        g.add_group(Group::new(1, 1).with_peptide("QQQK")).unwrap();
        g.add_group(Group::new(2, 1).with_accession("C").with_peptide("RRRK")).unwrap();
        g.add_group(Group::new(3, 1).with_accession("A").with_peptide("PPPK").with_child(1))
            .unwrap();
        g.add_group(Group::new(4, 1).with_accession("B").with_child(1).with_child(2))
            .unwrap();
        g.add_group(Group::new(5, 1).with_accession("D").with_child(2)).unwrap();
        g
    }

    /// A and A2 share the evidence {KKK, LLL}, as do E and E2 for {OOO}.
    /// B {LLL, MMM} overlaps A and C {MMM, NNN}.
    fn duplicate_evidence_graph() -> InputGraph {
        let mut g = InputGraph::new();
        g.add_file(InputFile::new(1, "search.dat")).unwrap();
        for acc in ["A", "A2", "B", "C", "E", "E2"] {
            g.add_accession(Accession::new(acc).with_file(1)).unwrap();
        }
        let peptides: [(&str, &[&str]); 5] = [
            ("KKK", &["A", "A2"]),
            ("LLL", &["A", "A2", "B"]),
            ("MMM", &["B", "C"]),
            ("NNN", &["C"]),
            ("OOO", &["E", "E2"]),
        ];
        for (idx, (seq, accs)) in peptides.iter().enumerate() {
            let mut s = Spectrum::new(idx as u64 + 1, 1, seq, 2, 500.0 + idx as f64)
                .with_retention_time(30.0 * idx as f64)
                .with_score("mascot_score", 20.0 + idx as f64);
            for acc in accs.iter() {
                s = s.with_accession(acc);
            }
            g.add_spectrum(s).unwrap();
        }
        let groups: [(u64, &str, &[&str]); 6] = [
            (1, "A", &["KKK", "LLL"]),
            (2, "A2", &["KKK", "LLL"]),
            (3, "B", &["LLL", "MMM"]),
            (4, "C", &["MMM", "NNN"]),
            (5, "E", &["OOO"]),
            (6, "E2", &["OOO"]),
        ];
        for (id, acc, seqs) in groups.iter() {
            let mut group = Group::new(*id, 1).with_accession(acc);
            for seq in seqs.iter() {
                group = group.with_peptide(seq);
            }
            g.add_group(group).unwrap();
        }
        g
    }

    fn run(graph: &InputGraph, method: InferenceMethod, filters: &[Filter]) -> InferenceOutput {
        let settings = Settings::default();
        let mut registry = ScoreRegistry::new();
        let psm = PsmModeller::new(graph, &settings, &mut registry);
        let peptides = PeptideModeller::new(&psm, &settings, &registry);
        let input = InferenceInput {
            graph,
            psm: &psm,
            overview_peptides: peptides.report_peptides(0),
            filters,
            consider_modifications: false,
            method,
            scoring: ScoringMethod::Additive,
            psms_for_scoring: PsmForScoring::Best,
            base_score: Some("mascot_score"),
            registry: &registry,
        };
        infer(&input)
    }

    fn accessions(protein: &ReportProtein) -> Vec<&str> {
        protein.accession_names().collect()
    }

    #[test]
    fn subset_is_attached() {
        let out = run(&subset_graph(), InferenceMethod::OccamsRazor, &[]);
        assert!(out.inconsistencies.is_empty());
        assert_eq!(out.proteins.len(), 1);
        let x = &out.proteins[0];
        assert_eq!(accessions(x), vec!["X"]);
        assert_eq!(x.nr_peptides(), 2);
        assert_eq!(x.subsets().len(), 1);
        assert_eq!(accessions(&x.subsets()[0]), vec!["Y"]);
        assert_eq!(x.score(), 90.0);
    }

    #[test]
    fn every_peptide_is_explained_once() {
        let out = run(&intersecting_graph(), InferenceMethod::OccamsRazor, &[]);
        let reported = out.proteins.iter().map(accessions).collect::<Vec<_>>();
        // A and B both explain two new peptides, A wins by accession
        assert_eq!(reported, vec![vec!["A"], vec!["B"]]);

        let b = &out.proteins[1];
        assert_eq!(b.subsets().len(), 1);
        assert_eq!(accessions(&b.subsets()[0]), vec!["C", "D"]);

        let mut covered = BTreeSet::new();
        for protein in &out.proteins {
            for id in protein.peptide_ids() {
                covered.insert(id.to_string());
            }
        }
        assert_eq!(covered.len(), 3);
        assert_ne!(out.proteins[0].peptide_ids(), out.proteins[1].peptide_ids());
    }

    #[test]
    fn duplicate_evidence_is_reported_once() {
        let out = run(&duplicate_evidence_graph(), InferenceMethod::OccamsRazor, &[]);
        assert!(out.inconsistencies.is_empty());

        let mut reported = out.proteins.iter().map(accessions).collect::<Vec<_>>();
        reported.sort();
        assert_eq!(reported, vec![vec!["A", "A2"], vec!["C"], vec!["E", "E2"]]);

        for (i, a) in out.proteins.iter().enumerate() {
            for b in &out.proteins[i + 1..] {
                assert_ne!(a.peptide_ids(), b.peptide_ids());
            }
        }

        let covered = out
            .proteins
            .iter()
            .flat_map(|p| p.peptide_ids())
            .collect::<BTreeSet<_>>();
        let expected = ["KKK", "LLL", "MMM", "NNN", "OOO"].into_iter().collect::<BTreeSet<_>>();
        assert_eq!(covered, expected);
    }

    #[test]
    fn report_all() {
        let out = run(&intersecting_graph(), InferenceMethod::ReportAll, &[]);
        assert_eq!(out.proteins.len(), 4);
        assert!(out.proteins.iter().all(|p| p.subsets().is_empty()));

        // with filters, identical evidence is merged
        let filter = new_filter("nr_peptides_per_protein_filter", "GEQ", "1", false).unwrap();
        let out = run(&intersecting_graph(), InferenceMethod::ReportAll, &[filter]);
        assert_eq!(out.proteins.len(), 3);
    }

    #[test]
    fn filters_shape_the_evidence() {
        // without PPPK, A is a subset of B
        let filter = new_filter("psm_sequence_filter", "EQ", "PPPK", true).unwrap();
        let out = run(&intersecting_graph(), InferenceMethod::OccamsRazor, &[filter]);
        assert_eq!(out.proteins.len(), 1);
        assert_eq!(accessions(&out.proteins[0]), vec!["B"]);
        assert_eq!(out.proteins[0].subsets().len(), 2);

        let filter = new_filter("nr_peptides_per_protein_filter", "GEQ", "2", false).unwrap();
        let out = run(&intersecting_graph(), InferenceMethod::OccamsRazor, &[filter]);
        let reported = out.proteins.iter().map(accessions).collect::<Vec<_>>();
        assert_eq!(reported, vec![vec!["A"], vec!["B"]]);
        assert!(out.proteins[1].subsets().is_empty());
    }

    #[test]
    fn inconsistencies_are_collected() {
        let mut g = subset_graph();
        g.add_group(Group::new(7, 2).with_accession("X").with_peptide("ZZZ").with_child(42))
            .unwrap();
        let out = run(&g, InferenceMethod::OccamsRazor, &[]);
        assert_eq!(out.proteins.len(), 1);
        assert!(out.inconsistencies.contains(&Inconsistency::MissingPeptide {
            group_id: 7,
            sequence: "ZZZ".into()
        }));
        assert!(out
            .inconsistencies
            .contains(&Inconsistency::MissingGroup { group_id: 42, parent: 7 }));
    }
}
