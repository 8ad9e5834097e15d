use super::{peptide_string_id, ReportPeptide};
use crate::config::Settings;
use crate::error::Error;
use crate::fdr::{DecoyStrategy, FdrData, FdrItem};
use crate::filter::{apply_filters, Filter, ItemClass};
use crate::psm::{PsmItem, PsmModeller};
use crate::rank;
use crate::score::{ScoreKind, ScoreRegistry};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

/// Builds peptides per file from the PSM level and keeps their FDR state.
/// Peptides are built on demand and rebuilt when the filters or the
/// modification setting change.
#[derive(Debug, Clone, Default)]
pub struct PeptideModeller {
    file_peptides: BTreeMap<u64, Vec<ReportPeptide>>,
    built: BTreeSet<u64>,
    filters: BTreeMap<u64, Vec<Filter>>,
    fdr_data: BTreeMap<u64, FdrData>,
    consider_modifications: bool,
}

impl PeptideModeller {
    /// Build the peptides of every file and of the overview
    pub fn new(psm: &PsmModeller, settings: &Settings, registry: &ScoreRegistry) -> Self {
        let mut modeller = PeptideModeller {
            consider_modifications: settings.consider_modifications,
            ..PeptideModeller::default()
        };
        for file in std::iter::once(0).chain(psm.files().keys().copied()) {
            modeller.infer_peptides(file, psm, registry);
        }
        modeller
    }

    #[tracing::instrument(skip(self, psm, registry), level = "debug")]
    fn infer_peptides(&mut self, file_id: u64, psm: &PsmModeller, registry: &ScoreRegistry) {
        info!(
            "inferring peptides for file {}, consider_modifications={}",
            file_id, self.consider_modifications
        );
        let filters = self.filters(file_id).to_vec();
        let items = if file_id == 0 {
            psm.filtered_report_psm_sets(&filters, registry)
                .into_iter()
                .map(PsmItem::Set)
                .collect::<Vec<_>>()
        } else {
            psm.filtered_report_psms(file_id, &filters)
                .into_iter()
                .map(PsmItem::Psm)
                .collect::<Vec<_>>()
        };

        let mut peptides: BTreeMap<String, ReportPeptide> = BTreeMap::new();
        for item in items {
            let id = peptide_string_id(&item, self.consider_modifications);
            peptides
                .entry(id.clone())
                .or_insert_with(|| ReportPeptide::new(id, item.sequence()))
                .add_item(item);
        }
        let mut peptides = peptides.into_values().collect::<Vec<_>>();
        for peptide in peptides.iter_mut() {
            peptide.refresh_best_scores(registry);
        }
        info!("inferred {} peptides for file {}", peptides.len(), file_id);

        self.file_peptides.insert(file_id, peptides);
        self.built.insert(file_id);

        // changed peptides invalidate the FDR, recompute it if it was there
        if self.is_fdr_calculated(file_id) {
            if let Err(e) = self.calculate_fdr(file_id, psm, registry) {
                warn!("peptide FDR of file {} not recomputed: {}", file_id, e);
            }
        }
    }

    fn ensure_built(&mut self, file_id: u64, psm: &PsmModeller, registry: &ScoreRegistry) {
        if !self.built.contains(&file_id) {
            self.infer_peptides(file_id, psm, registry);
        }
    }

    /// Forget every built peptide, e.g. after the PSM level changed
    pub fn invalidate(&mut self) {
        self.built.clear();
    }

    pub fn consider_modifications(&self) -> bool {
        self.consider_modifications
    }

    pub fn set_consider_modifications(&mut self, consider: bool) {
        if self.consider_modifications != consider {
            self.consider_modifications = consider;
            self.invalidate();
        }
    }

    /// Peptides of a file passing `filters`, building them first if needed
    pub fn filtered_report_peptides(
        &mut self,
        file_id: u64,
        filters: &[Filter],
        psm: &PsmModeller,
        registry: &ScoreRegistry,
    ) -> Vec<ReportPeptide> {
        self.ensure_built(file_id, psm, registry);
        match self.file_peptides.get(&file_id) {
            Some(peptides) => apply_filters(peptides, filters, file_id),
            None => {
                error!("no peptides for file {}", file_id);
                Vec::new()
            }
        }
    }

    /// The peptides as last built, without rebuilding
    pub fn report_peptides(&self, file_id: u64) -> &[ReportPeptide] {
        self.file_peptides
            .get(&file_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn report_peptide_mut(&mut self, file_id: u64, id: &str) -> Option<&mut ReportPeptide> {
        self.file_peptides
            .get_mut(&file_id)?
            .iter_mut()
            .find(|p| p.id() == id)
    }

    pub fn score_short_names(&self, file_id: u64, psm: &PsmModeller) -> Vec<String> {
        let mut names = psm.score_short_names(file_id);
        if self.is_fdr_calculated(file_id) {
            names.push(ScoreKind::PeptideQValue.short_name().into());
            names.push(ScoreKind::PeptideFdrScore.short_name().into());
        }
        names
    }

    pub fn filters(&self, file_id: u64) -> &[Filter] {
        self.filters.get(&file_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Add a filter. PSM filters change which peptides exist, so the
    /// file's peptides are rebuilt on next access.
    pub fn add_filter(&mut self, file_id: u64, filter: Filter) {
        if filter.supports(ItemClass::Psm) || filter.supports(ItemClass::PsmSet) {
            self.built.remove(&file_id);
        }
        self.filters.entry(file_id).or_default().push(filter);
    }

    pub fn remove_filter(&mut self, file_id: u64, index: usize) -> Option<Filter> {
        let filters = self.filters.get_mut(&file_id)?;
        if index >= filters.len() {
            return None;
        }
        let removed = filters.remove(index);
        if removed.supports(ItemClass::Psm) || removed.supports(ItemClass::PsmSet) {
            self.built.remove(&file_id);
        }
        Some(removed)
    }

    pub fn remove_all_filters(&mut self) {
        self.filters.clear();
        self.built.clear();
    }

    /// Rank the peptides of a file passing `filters`, the others lose their
    /// rank
    pub fn calculate_ranking(
        &mut self,
        file_id: u64,
        short_name: &str,
        filters: &[Filter],
        psm: &PsmModeller,
        registry: &ScoreRegistry,
    ) -> Result<(), Error> {
        let comparator = registry
            .comparator(short_name)
            .ok_or_else(|| Error::UnknownScore(short_name.into()))?;
        self.ensure_built(file_id, psm, registry);
        let peptides = self
            .file_peptides
            .get_mut(&file_id)
            .ok_or(Error::UnknownFile(file_id))?;

        rank::rank_filtered(&comparator, peptides, filters, file_id);
        Ok(())
    }

    pub fn files_fdr_data(&self, file_id: u64) -> Option<&FdrData> {
        self.fdr_data.get(&file_id)
    }

    pub fn is_fdr_calculated(&self, file_id: u64) -> bool {
        self.fdr_data
            .get(&file_id)
            .map_or(false, FdrData::is_calculated)
    }

    /// Decoy strategy, pattern and threshold of the PSM level, or the
    /// defaults
    fn fdr_data_from_psm_level(file_id: u64, psm: &PsmModeller) -> FdrData {
        match psm.files_fdr_data(file_id) {
            Some(d) => {
                let mut data = FdrData::new(d.decoy_strategy(), d.decoy_pattern(), d.threshold());
                data.set_estimator(d.estimator());
                data
            }
            None => FdrData::default(),
        }
    }

    /// The PSM-level score the peptide FDR is based on
    fn base_score(file_id: u64, psm: &PsmModeller) -> Option<String> {
        if file_id == 0 && psm.is_combined_fdr_score_calculated() {
            Some(ScoreKind::PsmCombinedFdrScore.short_name().into())
        } else if file_id > 0 && psm.is_fdr_calculated(file_id) {
            Some(ScoreKind::PsmFdrScore.short_name().into())
        } else {
            psm.preferred_fdr_score(file_id)
        }
    }

    /// Label the peptides of a file and forget their FDR values
    pub fn update_decoy_states(&mut self, file_id: u64) -> Result<(), Error> {
        let data = self
            .fdr_data
            .get(&file_id)
            .ok_or(Error::UnknownFile(file_id))?;
        let strategy = data.decoy_strategy();
        let regex = match strategy {
            DecoyStrategy::AccessionPattern => Some(data.decoy_regex()?),
            _ => None,
        };
        debug!("updating peptide decoy states of file {}", file_id);
        for peptide in self.file_peptides.get_mut(&file_id).into_iter().flatten() {
            peptide.dump_fdr();
            peptide.update_decoy_status(strategy, regex.as_ref());
        }
        Ok(())
    }

    /// Target-decoy estimation on the peptides of a file, ordered by their
    /// best PSM-level FDR score (or the preferred score)
    pub fn calculate_fdr(
        &mut self,
        file_id: u64,
        psm: &PsmModeller,
        registry: &ScoreRegistry,
    ) -> Result<(), Error> {
        let mut data = Self::fdr_data_from_psm_level(file_id, psm);
        let base = Self::base_score(file_id, psm).ok_or(Error::NoFdrScore(file_id))?;
        data.set_score_short_name(Some(&base));
        info!("peptide FDR of file {} based on {}", file_id, base);
        self.fdr_data.insert(file_id, data);

        self.ensure_built(file_id, psm, registry);
        self.update_decoy_states(file_id)?;

        let comparator = match registry.comparator(&base) {
            Some(c) => c,
            None => {
                warn!("no direction known for score {}, peptide FDR not estimated", base);
                return Ok(());
            }
        };

        if let (Some(data), Some(peptides)) = (
            self.fdr_data.get_mut(&file_id),
            self.file_peptides.get_mut(&file_id),
        ) {
            data.calculate_fdr(&comparator, peptides.iter_mut().collect());
            info!(
                "file {}: {} of {} peptides FDR-good",
                file_id,
                data.nr_fdr_good_targets(),
                data.nr_items()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::new_filter;
    use crate::model::test_graph::{fdr_graph, merge_graph};
    use crate::model::{InputFile, InputGraph, Modification, Spectrum};
    use crate::score::Scored;

    fn setup(graph: &InputGraph, settings: &Settings) -> (PsmModeller, PeptideModeller, ScoreRegistry) {
        let mut registry = ScoreRegistry::new();
        let psm = PsmModeller::new(graph, settings, &mut registry);
        let peptides = PeptideModeller::new(&psm, settings, &registry);
        (psm, peptides, registry)
    }

    fn modified_graph() -> InputGraph {
        let mut g = InputGraph::new();
        g.add_file(InputFile::new(1, "search.dat")).unwrap();
        for (id, modified, score) in [(1, false, 20.0), (2, true, 35.0), (3, false, 25.0)] {
            let mut s = Spectrum::new(id, 1, "PEPMK", 2, 300.0 + id as f64)
                .with_retention_time(10.0 * id as f64)
                .with_score("mascot_score", score);
            if modified {
                s = s.with_modification(4, Modification::new('M', 15.994915));
            }
            g.add_spectrum(s).unwrap();
        }
        g
    }

    #[test]
    fn groups_psms_by_sequence() {
        let (psm, mut peptides, registry) = setup(&modified_graph(), &Settings::default());
        let list = peptides.filtered_report_peptides(1, &[], &psm, &registry);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].nr_psms(), 3);
        assert_eq!(list[0].score("mascot_score"), Some(35.0));

        peptides.set_consider_modifications(true);
        let list = peptides.filtered_report_peptides(1, &[], &psm, &registry);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id(), "PEPMK");
        assert_eq!(list[0].score("mascot_score"), Some(25.0));
        assert_eq!(list[1].id(), "PEPMK(4;15.9949)");
    }

    #[test]
    fn overview_uses_sets() {
        let (psm, mut peptides, registry) = setup(&merge_graph(), &Settings::default());
        let list = peptides.filtered_report_peptides(0, &[], &psm, &registry);
        assert_eq!(list.len(), 1);
        assert!(matches!(list[0].items()[0], PsmItem::Set(_)));
        assert_eq!(list[0].file_names().len(), 2);
        assert_eq!(list[0].nr_spectra(), 1);
    }

    #[test]
    fn psm_filters_rebuild_peptides() {
        let (psm, mut peptides, registry) = setup(&modified_graph(), &Settings::default());
        peptides.add_filter(1, new_filter("psm_score_filter_mascot_score", "LT", "30", false).unwrap());
        let list = peptides.filtered_report_peptides(1, &[], &psm, &registry);
        assert_eq!(list[0].nr_psms(), 2);
        assert_eq!(list[0].score("mascot_score"), Some(25.0));

        assert!(peptides.remove_filter(1, 0).is_some());
        let list = peptides.filtered_report_peptides(1, &[], &psm, &registry);
        assert_eq!(list[0].nr_psms(), 3);
    }

    #[test]
    fn peptide_fdr() {
        let (mut psm, mut peptides, registry) = setup(&fdr_graph(), &Settings::default());

        // without a PSM-level FDR the preferred score is used
        peptides.calculate_fdr(1, &psm, &registry).unwrap();
        assert_eq!(
            peptides.files_fdr_data(1).unwrap().score_short_name(),
            Some("mascot_score")
        );

        psm.calculate_fdr(1, &registry).unwrap();
        peptides.invalidate();
        peptides.calculate_fdr(1, &psm, &registry).unwrap();
        let data = peptides.files_fdr_data(1).unwrap();
        assert_eq!(data.score_short_name(), Some("psm_fdr_score"));
        assert_eq!(data.nr_targets(), 8);
        assert_eq!(data.nr_decoys(), 2);
        assert!(peptides.is_fdr_calculated(1));

        let f = new_filter("peptide_score_filter_peptide_q_value", "LEQ", "0.01", false).unwrap();
        let good = peptides.filtered_report_peptides(1, &[f], &psm, &registry);
        assert_eq!(good.len(), 8);
        assert!(good.iter().all(|p| !p.is_decoy()));
        assert!(peptides
            .score_short_names(1, &psm)
            .contains(&"peptide_fdr_score".to_string()));
    }

    #[test]
    fn ranking() {
        let (psm, mut peptides, registry) = setup(&fdr_graph(), &Settings::default());
        let f = new_filter("peptide_accessions_filter", "REG", "s_.*", true).unwrap();
        peptides.calculate_ranking(1, "mascot_score", &[f], &psm, &registry).unwrap();
        let ranked = peptides.report_peptides(1).iter().filter(|p| p.rank().is_some()).count();
        assert_eq!(ranked, 8);
        assert_eq!(
            peptides.calculate_ranking(1, "unknown", &[], &psm, &registry),
            Err(Error::UnknownScore("unknown".into()))
        );
    }
}
