use super::inference::{infer, InferenceInput};
use super::scoring::score_proteins;
use super::{Inconsistency, InferenceMethod, PsmForScoring, ReportProtein, ScoringMethod};
use crate::config::Settings;
use crate::error::Error;
use crate::fdr::{DecoyStrategy, FdrData, FdrItem};
use crate::filter::{apply_filters, Filter};
use crate::model::InputGraph;
use crate::peptide::ReportPeptide;
use crate::psm::PsmModeller;
use crate::rank;
use crate::score::{ScoreComparator, ScoreKind, ScoreRegistry};
use regex::Regex;
use tracing::{error, info, warn};

/// Infers, scores and ranks the proteins and keeps their FDR state
#[derive(Debug, Clone)]
pub struct ProteinModeller {
    proteins: Vec<ReportProtein>,
    inferred: bool,
    inference: InferenceMethod,
    scoring: ScoringMethod,
    psms_for_scoring: PsmForScoring,
    /// Requested base score, `None` picks one from the PSM level
    base_score: Option<String>,
    /// Base score the current proteins were scored with
    applied_base_score: Option<String>,
    inference_filters: Vec<Filter>,
    report_filters: Vec<Filter>,
    fdr_data: FdrData,
    inconsistencies: Vec<Inconsistency>,
}

impl ProteinModeller {
    pub fn new(settings: &Settings) -> Self {
        ProteinModeller {
            proteins: Vec::new(),
            inferred: false,
            inference: settings.inference,
            scoring: settings.scoring,
            psms_for_scoring: settings.psms_for_scoring,
            base_score: settings.scoring_base_score.clone(),
            applied_base_score: None,
            inference_filters: Vec::new(),
            report_filters: Vec::new(),
            fdr_data: Self::fresh_fdr_data(&FdrData::from(settings)),
            inconsistencies: Vec::new(),
        }
    }

    /// Empty FDR state on the protein score, keeping the decoy settings
    fn fresh_fdr_data(template: &FdrData) -> FdrData {
        let mut data = template.clone();
        data.clear_results();
        data.set_score_short_name(Some(ScoreKind::ProteinScore.short_name()));
        data
    }

    /// The requested base score, else the combined FDR score if calculated,
    /// else the PSM FDR score of a single file with a calculated FDR, else
    /// the preferred score of the overview
    pub fn default_base_score(psm: &PsmModeller) -> Option<String> {
        if psm.is_combined_fdr_score_calculated() {
            return Some(ScoreKind::PsmCombinedFdrScore.short_name().into());
        }
        let files = psm.files();
        if files.len() == 1 && files.keys().all(|&id| psm.is_fdr_calculated(id)) {
            return Some(ScoreKind::PsmFdrScore.short_name().into());
        }
        psm.preferred_fdr_score(0)
    }

    fn resolve_base_score(&self, psm: &PsmModeller, registry: &ScoreRegistry) -> Result<Option<String>, Error> {
        match &self.base_score {
            Some(base) if !registry.is_registered(base) => Err(Error::UnknownScore(base.clone())),
            Some(base) => Ok(Some(base.clone())),
            None => Ok(Self::default_base_score(psm)),
        }
    }

    /// Run the configured inference on the current PSM level. The proteins,
    /// their FDR state and the collected inconsistencies are replaced.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn infer(
        &mut self,
        graph: &InputGraph,
        psm: &PsmModeller,
        overview_peptides: &[ReportPeptide],
        consider_modifications: bool,
        registry: &ScoreRegistry,
    ) -> Result<(), Error> {
        let base = self.resolve_base_score(psm, registry)?;
        if base.is_none() {
            warn!("no base score available, proteins stay unscored");
        }

        let output = infer(&InferenceInput {
            graph,
            psm,
            overview_peptides,
            filters: &self.inference_filters,
            consider_modifications,
            method: self.inference,
            scoring: self.scoring,
            psms_for_scoring: self.psms_for_scoring,
            base_score: base.as_deref(),
            registry,
        });

        info!("{} proteins inferred", output.proteins.len());
        self.proteins = output.proteins;
        self.inconsistencies = output.inconsistencies;
        self.applied_base_score = base;
        self.inferred = true;
        self.fdr_data = Self::fresh_fdr_data(&self.fdr_data);
        Ok(())
    }

    pub fn is_inferred(&self) -> bool {
        self.inferred
    }

    pub fn inference_method(&self) -> InferenceMethod {
        self.inference
    }

    pub fn set_inference_method(&mut self, method: InferenceMethod) {
        self.inference = method;
    }

    pub fn scoring_method(&self) -> ScoringMethod {
        self.scoring
    }

    pub fn set_scoring_method(&mut self, method: ScoringMethod) {
        self.scoring = method;
    }

    pub fn psms_for_scoring(&self) -> PsmForScoring {
        self.psms_for_scoring
    }

    pub fn set_psms_for_scoring(&mut self, psms: PsmForScoring) {
        self.psms_for_scoring = psms;
    }

    pub fn base_score(&self) -> Option<&str> {
        self.base_score.as_deref()
    }

    pub fn set_base_score(&mut self, short_name: Option<&str>) {
        self.base_score = short_name.map(String::from);
    }

    /// Base score of the current protein scores
    pub fn applied_base_score(&self) -> Option<&str> {
        self.applied_base_score.as_deref()
    }

    /// Score the inferred proteins again. The reported proteins stay the
    /// same, their FDR state is reset.
    pub fn apply_scoring(
        &mut self,
        method: ScoringMethod,
        psms: PsmForScoring,
        base: &str,
        registry: &ScoreRegistry,
    ) -> Result<(), Error> {
        if !registry.is_registered(base) {
            return Err(Error::UnknownScore(base.into()));
        }
        self.scoring = method;
        self.psms_for_scoring = psms;
        self.base_score = Some(base.into());
        self.applied_base_score = Some(base.into());

        info!("scoring proteins: {} on {}", method.short_name(), base);
        score_proteins(&mut self.proteins, method, psms, base, registry);
        for protein in self.proteins.iter_mut() {
            protein.dump_fdr();
        }
        self.fdr_data = Self::fresh_fdr_data(&self.fdr_data);
        Ok(())
    }

    /// The reported proteins, their subsets are attached to them
    pub fn report_proteins(&self) -> &[ReportProtein] {
        &self.proteins
    }

    /// A reported protein or subset by id
    pub fn protein(&self, id: u64) -> Option<&ReportProtein> {
        fn find(proteins: &[ReportProtein], id: u64) -> Option<&ReportProtein> {
            proteins
                .iter()
                .find_map(|p| if p.id() == id { Some(p) } else { find(p.subsets(), id) })
        }
        find(&self.proteins, id)
    }

    pub fn filtered_report_proteins(&self, filters: &[Filter]) -> Vec<ReportProtein> {
        if !self.inferred {
            error!("proteins are not inferred yet");
            return Vec::new();
        }
        apply_filters(&self.proteins, filters, 0)
    }

    /// Rank the proteins passing `filters` by their score, the others lose
    /// their rank
    pub fn calculate_ranking(&mut self, filters: &[Filter], registry: &ScoreRegistry) {
        let comparator = Self::comparator(registry);
        rank::rank_filtered(&comparator, &mut self.proteins, filters, 0);
    }

    fn comparator(registry: &ScoreRegistry) -> ScoreComparator {
        let short = ScoreKind::ProteinScore.short_name();
        registry
            .comparator(short)
            .unwrap_or_else(|| ScoreComparator::new(short, true))
    }

    pub fn inference_filters(&self) -> &[Filter] {
        &self.inference_filters
    }

    pub fn add_inference_filter(&mut self, filter: Filter) {
        self.inference_filters.push(filter);
    }

    pub fn remove_inference_filter(&mut self, index: usize) -> Option<Filter> {
        if index < self.inference_filters.len() {
            Some(self.inference_filters.remove(index))
        } else {
            None
        }
    }

    pub fn clear_inference_filters(&mut self) {
        self.inference_filters.clear();
    }

    pub fn report_filters(&self) -> &[Filter] {
        &self.report_filters
    }

    pub fn add_report_filter(&mut self, filter: Filter) {
        self.report_filters.push(filter);
    }

    pub fn remove_report_filter(&mut self, index: usize) -> Option<Filter> {
        if index < self.report_filters.len() {
            Some(self.report_filters.remove(index))
        } else {
            None
        }
    }

    pub fn clear_report_filters(&mut self) {
        self.report_filters.clear();
    }

    pub fn fdr_data(&self) -> &FdrData {
        &self.fdr_data
    }

    /// Change the decoy settings and the threshold. Former results are
    /// dropped.
    pub fn update_fdr_data(
        &mut self,
        strategy: DecoyStrategy,
        pattern: &str,
        threshold: f64,
    ) -> Result<(), Error> {
        let mut data = Self::fresh_fdr_data(&self.fdr_data);
        data.set_decoy_strategy(strategy);
        data.set_decoy_pattern(pattern)?;
        data.set_threshold(threshold);
        self.fdr_data = data;
        Ok(())
    }

    /// Whether some file carries decoys in its search results
    pub fn has_internal_decoys(&self, psm: &PsmModeller) -> bool {
        psm.files().keys().any(|&id| psm.has_internal_decoys(id))
    }

    /// Label the proteins and their subsets as target or decoy and forget
    /// their FDR values
    pub fn update_decoy_states(&mut self) -> Result<(), Error> {
        let strategy = self.fdr_data.decoy_strategy();
        let regex = match strategy {
            DecoyStrategy::AccessionPattern => Some(self.fdr_data.decoy_regex()?),
            DecoyStrategy::SearchEngine | DecoyStrategy::Inherit => None,
        };

        fn update(proteins: &mut [ReportProtein], strategy: DecoyStrategy, regex: Option<&Regex>) {
            for protein in proteins.iter_mut() {
                protein.dump_fdr();
                protein.update_decoy_status(strategy, regex);
                update(protein.subsets_mut(), strategy, regex);
            }
        }
        update(&mut self.proteins, strategy, regex.as_ref());
        Ok(())
    }

    /// Target-decoy estimation on the reported proteins by their score
    pub fn calculate_fdr(&mut self, registry: &ScoreRegistry) -> Result<(), Error> {
        if !self.inferred {
            error!("proteins are not inferred yet, no FDR estimated");
            return Ok(());
        }
        self.update_decoy_states()?;
        let comparator = Self::comparator(registry);
        self.fdr_data
            .calculate_fdr(&comparator, self.proteins.iter_mut().collect());
        info!(
            "{} of {} proteins FDR-good at {}",
            self.fdr_data.nr_fdr_good_targets(),
            self.fdr_data.nr_items(),
            self.fdr_data.threshold()
        );
        Ok(())
    }

    /// Graph inconsistencies met during the last inference
    pub fn inconsistencies(&self) -> &[Inconsistency] {
        &self.inconsistencies
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::new_filter;
    use crate::model::test_graph::fdr_graph;
    use crate::model::Group;
    use crate::peptide::PeptideModeller;

    /// Eight target proteins scored 100..93 and two decoys scored 92 and 91,
    /// each alone in its tree
    fn protein_graph() -> InputGraph {
        let mut g = fdr_graph();
        let spectra = g
            .spectra()
            .map(|s| (s.id, s.sequence.clone(), s.accessions.clone()))
            .collect::<Vec<_>>();
        for (id, sequence, accessions) in spectra {
            let mut group = Group::new(id, id).with_peptide(&sequence);
            for acc in &accessions {
                group = group.with_accession(acc);
            }
            g.add_group(group).unwrap();
        }
        g
    }

    fn setup(settings: &Settings) -> (InputGraph, PsmModeller, PeptideModeller, ScoreRegistry) {
        let graph = protein_graph();
        let mut registry = ScoreRegistry::new();
        let psm = PsmModeller::new(&graph, settings, &mut registry);
        let peptides = PeptideModeller::new(&psm, settings, &registry);
        (graph, psm, peptides, registry)
    }

    fn inferred(settings: &Settings) -> (ProteinModeller, PsmModeller, ScoreRegistry) {
        let (graph, psm, peptides, registry) = setup(settings);
        let mut proteins = ProteinModeller::new(settings);
        proteins
            .infer(&graph, &psm, peptides.report_peptides(0), false, &registry)
            .unwrap();
        (proteins, psm, registry)
    }

    fn additive() -> Settings {
        let mut settings = Settings::default();
        settings.scoring = ScoringMethod::Additive;
        settings.scoring_base_score = Some("mascot_score".into());
        settings
    }

    #[test]
    fn not_inferred() {
        let proteins = ProteinModeller::new(&Settings::default());
        assert!(!proteins.is_inferred());
        assert!(proteins.filtered_report_proteins(&[]).is_empty());
        assert_eq!(proteins.fdr_data().score_short_name(), Some("protein_score"));
    }

    #[test]
    fn inference_and_fdr() {
        let (mut proteins, psm, registry) = inferred(&additive());
        assert_eq!(proteins.report_proteins().len(), 10);
        assert!(proteins.inconsistencies().is_empty());
        assert_eq!(proteins.applied_base_score(), Some("mascot_score"));
        assert_eq!(proteins.protein(1).map(|p| p.score()), Some(100.0));
        assert!(proteins.has_internal_decoys(&psm));

        proteins.calculate_fdr(&registry).unwrap();
        let data = proteins.fdr_data();
        assert!(data.is_calculated());
        assert_eq!(data.nr_targets(), 8);
        assert_eq!(data.nr_decoys(), 2);
        assert_eq!(data.nr_fdr_good_targets(), 8);
        let decoys = proteins
            .report_proteins()
            .iter()
            .filter(|p| p.is_decoy())
            .map(|p| p.accession_names().collect::<Vec<_>>())
            .collect::<Vec<_>>();
        assert_eq!(decoys, vec![vec!["s_DECOY8"], vec!["s_DECOY9"]]);
        assert_eq!(proteins.protein(9).map(|p| p.accession_decoy_state("s_DECOY8")), Some(Some(true)));

        // a new scoring run drops the FDR state
        proteins
            .apply_scoring(ScoringMethod::Multiplicative, PsmForScoring::All, "mascot_score", &registry)
            .unwrap();
        assert!(!proteins.fdr_data().is_calculated());
        assert_eq!(proteins.protein(2).map(|p| p.score()), Some(99.0));
        assert!(proteins
            .apply_scoring(ScoringMethod::Additive, PsmForScoring::Best, "unknown", &registry)
            .is_err());
    }

    #[test]
    fn ranking() {
        let (mut proteins, _, registry) = inferred(&additive());
        let filter = new_filter("protein_score_filter", "GEQ", "95", false).unwrap();
        proteins.calculate_ranking(&[filter], &registry);
        let ranks = proteins
            .report_proteins()
            .iter()
            .map(|p| p.rank())
            .collect::<Vec<_>>();
        assert_eq!(ranks.iter().filter(|r| r.is_some()).count(), 6);
        assert_eq!(proteins.protein(1).and_then(|p| p.rank()), Some(1));
        assert_eq!(proteins.protein(6).and_then(|p| p.rank()), Some(6));
        assert_eq!(proteins.protein(7).and_then(|p| p.rank()), None);
    }

    #[test]
    fn filters() {
        let settings = additive();
        let (graph, psm, peptides, registry) = setup(&settings);
        let mut proteins = ProteinModeller::new(&settings);

        let filter = new_filter("protein_accessions_filter", "REG", "s_.*", true).unwrap();
        proteins.add_inference_filter(filter.clone());
        proteins
            .infer(&graph, &psm, peptides.report_peptides(0), false, &registry)
            .unwrap();
        assert_eq!(proteins.report_proteins().len(), 8);
        assert_eq!(proteins.remove_inference_filter(0), Some(filter));
        assert_eq!(proteins.remove_inference_filter(0), None);

        proteins
            .infer(&graph, &psm, peptides.report_peptides(0), false, &registry)
            .unwrap();
        proteins.add_report_filter(new_filter("protein_score_filter", "LT", "95", false).unwrap());
        let report = proteins.filtered_report_proteins(proteins.report_filters());
        assert_eq!(report.len(), 4);
        proteins.clear_report_filters();
        assert!(proteins.report_filters().is_empty());
    }

    #[test]
    fn base_score_choice() {
        let settings = Settings::default();
        let (graph, psm, peptides, registry) = setup(&settings);
        assert_eq!(ProteinModeller::default_base_score(&psm).as_deref(), Some("mascot_score"));

        let mut proteins = ProteinModeller::new(&settings);
        proteins.set_base_score(Some("xtandem_expect"));
        assert!(proteins
            .infer(&graph, &psm, peptides.report_peptides(0), false, &registry)
            .is_err());
        proteins.set_base_score(None);
        proteins
            .infer(&graph, &psm, peptides.report_peptides(0), false, &registry)
            .unwrap();
        assert_eq!(proteins.applied_base_score(), Some("mascot_score"));
    }

    #[test]
    fn fdr_settings() {
        let (mut proteins, _, registry) = inferred(&additive());
        assert!(proteins
            .update_fdr_data(DecoyStrategy::AccessionPattern, "(", 0.05)
            .is_err());
        proteins
            .update_fdr_data(DecoyStrategy::AccessionPattern, "P0000[01]", 0.05)
            .unwrap();
        proteins.calculate_fdr(&registry).unwrap();
        assert_eq!(proteins.fdr_data().nr_decoys(), 2);
        assert_eq!(proteins.fdr_data().threshold(), 0.05);
        // the two best proteins are decoys now
        assert!(proteins.report_proteins().iter().all(|p| !p.is_fdr_good()));
    }
}
