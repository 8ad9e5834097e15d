use super::{ReportPsm, ReportPsmSet};
use crate::config::Settings;
use crate::error::Error;
use crate::fdr::{matches_decoy_pattern, DecoyStrategy, FdrData, FdrItem};
use crate::filter::{apply_filters, satisfies_filter_list, Filter, ItemClass};
use crate::ident_key::{self, KeySetting, KeySettings};
use crate::model::{Accession, InputFile, InputGraph};
use crate::rank::{self, Rankable};
use crate::score::{ScoreComparator, ScoreKind, ScoreRegistry, Scored};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Decoy pattern value that switches files to the search engine's labels
pub const SEARCH_ENGINE_DECOYS: &str = "searchengine";

const PROGRESS_STEP: usize = 100_000;

/// Owns every PSM of the input, the cross-file PSM sets and the per-file
/// FDR state
#[derive(Debug, Clone)]
pub struct PsmModeller {
    files: BTreeMap<u64, InputFile>,
    file_psms: BTreeMap<u64, Vec<ReportPsm>>,
    psm_sets: Vec<ReportPsmSet>,
    set_of_spectrum: BTreeMap<u64, usize>,

    maximal_settings: KeySettings,
    key_warnings: BTreeMap<KeySetting, BTreeSet<u64>>,
    user_key_settings: Option<KeySettings>,
    psm_set_settings: KeySettings,
    spectrum_settings: KeySettings,
    create_psm_sets: bool,

    fdr_data: BTreeMap<u64, FdrData>,
    file_scores: BTreeMap<u64, Vec<String>>,
    internal_decoys: BTreeMap<u64, bool>,
    preferred_fdr_scores: Vec<String>,
    combined_fdr_calculated: bool,

    filters: BTreeMap<u64, Vec<Filter>>,
}

impl PsmModeller {
    /// Build the PSM level from the input graph. Every score found in the
    /// input, and every score computed later on, is registered.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn new(graph: &InputGraph, settings: &Settings, registry: &mut ScoreRegistry) -> Self {
        for kind in [
            ScoreKind::PsmFdrScore,
            ScoreKind::PsmQValue,
            ScoreKind::AverageFdrScore,
            ScoreKind::PsmCombinedFdrScore,
            ScoreKind::PeptideQValue,
            ScoreKind::PeptideFdrScore,
            ScoreKind::ProteinScore,
        ] {
            registry.register_kind(kind);
        }

        let accessions = graph
            .accessions()
            .iter()
            .map(|(name, acc)| (name.clone(), Arc::new(acc.clone())))
            .collect::<BTreeMap<String, Arc<Accession>>>();

        let spectrum_settings = ident_key::spectrum_settings(graph.spectra());

        // components some PSMs do not carry are as unreliable as those the
        // readers warned about
        let mut key_warnings = graph.key_warnings().clone();
        for spectrum in graph.spectra() {
            for setting in KeySetting::ALL.iter().filter(|s| !s.available(spectrum)) {
                key_warnings
                    .entry(*setting)
                    .or_default()
                    .insert(spectrum.file_id);
            }
        }

        let mut file_psms: BTreeMap<u64, Vec<ReportPsm>> = BTreeMap::new();
        let mut file_scores: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        let mut internal_decoys: BTreeMap<u64, bool> = BTreeMap::new();
        for id in graph.files().keys() {
            file_psms.insert(*id, Vec::new());
            file_scores.insert(*id, Vec::new());
            internal_decoys.insert(*id, false);
        }

        for spectrum in graph.spectra() {
            let file = spectrum.file_id;
            let file_name = graph
                .files()
                .get(&file)
                .map(|f| f.name.as_str())
                .unwrap_or_default();

            let mut psm_accessions = Vec::with_capacity(spectrum.accessions.len());
            for acc in &spectrum.accessions {
                match accessions.get(acc) {
                    Some(a) => psm_accessions.push(a.clone()),
                    None => warn!("spectrum {} references unknown accession {}", spectrum.id, acc),
                }
            }

            let scores = file_scores.entry(file).or_default();
            for score in &spectrum.scores {
                registry.register(score);
                if !scores.contains(&score.short_name) {
                    scores.push(score.short_name.clone());
                }
            }
            if spectrum.is_decoy == Some(true) {
                internal_decoys.insert(file, true);
            }

            let key = ident_key::spectrum_key(spectrum, &spectrum_settings);
            file_psms.entry(file).or_default().push(ReportPsm::new(
                Arc::new(spectrum.clone()),
                file_name,
                psm_accessions,
                key,
            ));
        }

        let mut fdr_data = BTreeMap::new();
        fdr_data.insert(0, FdrData::from(settings));
        for id in graph.files().keys() {
            fdr_data.insert(*id, FdrData::from(settings));
        }

        let mut modeller = PsmModeller {
            files: graph.files().clone(),
            file_psms,
            psm_sets: Vec::new(),
            set_of_spectrum: BTreeMap::new(),
            maximal_settings: ident_key::maximal_settings(&key_warnings),
            key_warnings,
            user_key_settings: settings.key_settings.clone(),
            psm_set_settings: KeySettings::default(),
            spectrum_settings,
            create_psm_sets: settings.create_psm_sets,
            fdr_data,
            file_scores,
            internal_decoys,
            preferred_fdr_scores: settings.preferred_fdr_scores.clone(),
            combined_fdr_calculated: false,
            filters: BTreeMap::new(),
        };
        modeller.calculate_identification_ranks(registry);
        modeller.rebuild_psm_sets(registry);
        modeller
    }

    /// Rank the PSMs of each spectrum against each other, per file and
    /// per score
    fn calculate_identification_ranks(&mut self, registry: &ScoreRegistry) {
        for (file, psms) in self.file_psms.iter_mut() {
            let mut by_spectrum: BTreeMap<String, Vec<usize>> = BTreeMap::new();
            for (idx, psm) in psms.iter().enumerate() {
                by_spectrum
                    .entry(psm.spectrum_key.clone())
                    .or_default()
                    .push(idx);
            }

            let scores = self.file_scores.get(file).cloned().unwrap_or_default();
            for short in &scores {
                let comparator = match registry.comparator(short) {
                    Some(c) => c,
                    None => continue,
                };
                for members in by_spectrum.values() {
                    let values = members
                        .iter()
                        .map(|&i| psms[i].spectrum.score(short))
                        .collect::<Vec<_>>();
                    for (&i, r) in members.iter().zip(rank::dense_ranks(&comparator, &values)) {
                        psms[i].set_identification_rank(short, r);
                    }
                }
            }
        }
    }

    /// User-enabled key settings that some files do not reliably carry,
    /// with those files
    pub fn unavailable_key_settings(&self) -> Vec<(KeySetting, BTreeSet<u64>)> {
        let user = match &self.user_key_settings {
            Some(user) => user,
            None => return Vec::new(),
        };
        user.enabled()
            .filter_map(|setting| {
                self.key_warnings
                    .get(&setting)
                    .filter(|files| !files.is_empty())
                    .map(|files| (setting, files.clone()))
            })
            .collect()
    }

    /// The key settings for grouping: the user's choice or else the maximal
    /// settings the input allows
    fn effective_set_settings(&self) -> KeySettings {
        for (setting, files) in self.unavailable_key_settings() {
            warn!(
                "{} is used for identification keys but unreliable in files {:?}",
                setting.name(),
                files
            );
        }
        let mut settings = self
            .user_key_settings
            .clone()
            .unwrap_or_else(|| self.maximal_settings.clone());
        settings.set(KeySetting::FileId, !self.create_psm_sets);
        ident_key::prune_redundant(settings)
    }

    fn rebuild_psm_sets(&mut self, registry: &ScoreRegistry) {
        self.psm_set_settings = self.effective_set_settings();
        debug!(
            "building PSM sets with {:?}",
            self.psm_set_settings.enabled().map(|s| s.name()).collect::<Vec<_>>()
        );

        let mut grouped: BTreeMap<String, Vec<ReportPsm>> = BTreeMap::new();
        let mut seen = 0;
        for psm in self.file_psms.values().flatten() {
            let key = ident_key::build_key(&psm.spectrum, &self.psm_set_settings);
            grouped.entry(key).or_default().push(psm.clone());
            seen += 1;
            if seen % PROGRESS_STEP == 0 {
                info!("grouped {} PSMs into sets", seen);
            }
        }

        self.psm_sets = grouped
            .into_iter()
            .map(|(key, psms)| ReportPsmSet::new(key, psms, registry))
            .collect();
        self.set_of_spectrum = self
            .psm_sets
            .iter()
            .enumerate()
            .flat_map(|(idx, set)| set.psms.iter().map(move |p| (p.id(), idx)))
            .collect();
        self.combined_fdr_calculated = false;
        if let Some(data) = self.fdr_data.get_mut(&0) {
            data.clear_results();
        }
        info!("{} PSM sets built", self.psm_sets.len());
    }

    /// Change whether PSMs of different files are merged and which key
    /// components identify a set. Sets are rebuilt only when something
    /// changed.
    pub fn apply_general_settings(
        &mut self,
        create_psm_sets: bool,
        key_settings: Option<KeySettings>,
        registry: &ScoreRegistry,
    ) {
        if create_psm_sets != self.create_psm_sets || key_settings != self.user_key_settings {
            self.create_psm_sets = create_psm_sets;
            self.user_key_settings = key_settings;
            self.rebuild_psm_sets(registry);
        }
    }

    pub fn psm_set_settings(&self) -> &KeySettings {
        &self.psm_set_settings
    }

    pub fn spectrum_settings(&self) -> &KeySettings {
        &self.spectrum_settings
    }

    pub fn create_psm_sets(&self) -> bool {
        self.create_psm_sets
    }

    pub fn files(&self) -> &BTreeMap<u64, InputFile> {
        &self.files
    }

    pub fn has_internal_decoys(&self, file_id: u64) -> bool {
        self.internal_decoys.get(&file_id).copied().unwrap_or(false)
    }

    /// Unfiltered PSMs of one file
    pub fn file_psms(&self, file_id: u64) -> &[ReportPsm] {
        self.file_psms.get(&file_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unfiltered PSM sets, ordered by key
    pub fn psm_sets(&self) -> &[ReportPsmSet] {
        &self.psm_sets
    }

    pub fn psm_set(&self, key: &str) -> Option<&ReportPsmSet> {
        self.psm_sets
            .binary_search_by(|s| s.key.as_str().cmp(key))
            .ok()
            .map(|idx| &self.psm_sets[idx])
    }

    /// The set a spectrum ended up in
    pub fn psm_set_of_spectrum(&self, spectrum_id: u64) -> Option<&ReportPsmSet> {
        self.set_of_spectrum
            .get(&spectrum_id)
            .map(|&idx| &self.psm_sets[idx])
    }

    pub fn filtered_report_psms(&self, file_id: u64, filters: &[Filter]) -> Vec<ReportPsm> {
        match self.file_psms.get(&file_id) {
            Some(psms) => apply_filters(psms, filters, file_id),
            None => {
                error!("no PSMs for file {}", file_id);
                Vec::new()
            }
        }
    }

    /// PSM sets rebuilt from their members passing the PSM-only filters,
    /// then filtered as sets. Sets left without members are dropped.
    pub fn filtered_report_psm_sets(
        &self,
        filters: &[Filter],
        registry: &ScoreRegistry,
    ) -> Vec<ReportPsmSet> {
        let member_filters = filters
            .iter()
            .filter(|f| f.supports(ItemClass::Psm) && !f.supports(ItemClass::PsmSet))
            .cloned()
            .collect::<Vec<_>>();

        let mut out = Vec::new();
        for set in &self.psm_sets {
            let set = if member_filters.is_empty() {
                set.clone()
            } else {
                let members = set
                    .psms
                    .iter()
                    .filter(|p| satisfies_filter_list(*p, p.file_id(), &member_filters))
                    .cloned()
                    .collect::<Vec<_>>();
                if members.is_empty() {
                    continue;
                }
                set.with_members(members, registry)
            };
            if satisfies_filter_list(&set, 0, filters) {
                out.push(set);
            }
        }
        out
    }

    /// Score short names of a file, or of all files and the set scores
    /// for file 0
    pub fn score_short_names(&self, file_id: u64) -> Vec<String> {
        let mut names = Vec::new();
        let mut push = |name: &str| {
            if !names.iter().any(|n: &String| n == name) {
                names.push(name.to_string());
            }
        };

        if file_id == 0 {
            self.file_scores.values().flatten().for_each(|s| push(s));
            if self.fdr_data.values().any(FdrData::is_calculated) {
                push(ScoreKind::PsmFdrScore.short_name());
                push(ScoreKind::PsmQValue.short_name());
            }
            if self.combined_fdr_calculated {
                push(ScoreKind::AverageFdrScore.short_name());
                push(ScoreKind::PsmCombinedFdrScore.short_name());
            }
        } else {
            self.file_scores
                .get(&file_id)
                .into_iter()
                .flatten()
                .for_each(|s| push(s));
            if self.is_fdr_calculated(file_id) {
                push(ScoreKind::PsmFdrScore.short_name());
                push(ScoreKind::PsmQValue.short_name());
            }
        }
        names
    }

    /// Change the direction of a score, for scores the registry allows it
    pub fn set_higher_score_better(
        &self,
        registry: &mut ScoreRegistry,
        short_name: &str,
        higher_score_better: bool,
    ) {
        registry.set_higher_score_better(short_name, higher_score_better);
    }

    pub fn files_fdr_data(&self, file_id: u64) -> Option<&FdrData> {
        self.fdr_data.get(&file_id)
    }

    pub fn files_fdr_data_mut(&mut self, file_id: u64) -> Option<&mut FdrData> {
        self.fdr_data.get_mut(&file_id)
    }

    /// Copy the FDR configuration of `template` to the given files
    pub fn update_files_fdr_data(&mut self, file_ids: &[u64], template: &FdrData) -> Result<(), Error> {
        for id in file_ids {
            let data = self.fdr_data.get_mut(id).ok_or(Error::UnknownFile(*id))?;
            data.set_decoy_strategy(template.decoy_strategy());
            data.set_decoy_pattern(template.decoy_pattern())?;
            data.set_threshold(template.threshold());
            data.set_score_short_name(template.score_short_name());
            data.set_top_identifications(template.top_identifications());
            data.set_estimator(template.estimator());
        }
        Ok(())
    }

    /// Set the decoy pattern of every file. [`SEARCH_ENGINE_DECOYS`]
    /// switches files with internal decoys to the search engine's labels.
    pub fn set_all_decoy_pattern(&mut self, pattern: &str) -> Result<(), Error> {
        for (id, data) in self.fdr_data.iter_mut().filter(|(id, _)| **id > 0) {
            if pattern == SEARCH_ENGINE_DECOYS {
                if self.internal_decoys.get(id).copied().unwrap_or(false) {
                    data.set_decoy_strategy(DecoyStrategy::SearchEngine);
                } else {
                    warn!("file {} has no search engine decoys, keeping its decoy pattern", id);
                }
            } else {
                data.set_decoy_strategy(DecoyStrategy::AccessionPattern);
                data.set_decoy_pattern(pattern)?;
            }
        }
        Ok(())
    }

    pub fn set_all_top_identifications(&mut self, top: usize) {
        self.fdr_data
            .values_mut()
            .for_each(|d| d.set_top_identifications(top));
    }

    pub fn preferred_fdr_scores(&self) -> &[String] {
        &self.preferred_fdr_scores
    }

    pub fn add_preferred_fdr_score(&mut self, short_name: &str) {
        if !self.preferred_fdr_scores.iter().any(|s| s == short_name) {
            self.preferred_fdr_scores.push(short_name.into());
        }
    }

    pub fn reset_preferred_fdr_scores(&mut self) {
        self.preferred_fdr_scores.clear();
    }

    /// Copy the state of a file's PSMs into the set members and refresh
    /// the affected sets
    fn sync_sets(&mut self, file_id: u64, registry: &ScoreRegistry) {
        let psms = match self.file_psms.get(&file_id) {
            Some(p) => p,
            None => return,
        };
        let by_id = psms.iter().map(|p| (p.id(), p)).collect::<BTreeMap<_, _>>();
        for set in self.psm_sets.iter_mut() {
            let mut touched = false;
            for member in set.psms_mut().iter_mut().filter(|m| m.file_id() == file_id) {
                if let Some(psm) = by_id.get(&member.id()) {
                    member.copy_fdr_from(psm);
                    touched = true;
                }
            }
            if touched {
                set.refresh_best_scores(registry);
                set.update_decoy_status();
            }
        }
    }

    /// Label the PSMs of a file as target or decoy and forget their FDR
    /// values. For file 0 the sets are labelled from their members.
    pub fn update_decoy_states(&mut self, file_id: u64, registry: &ScoreRegistry) -> Result<(), Error> {
        if file_id == 0 {
            for set in self.psm_sets.iter_mut() {
                set.dump_fdr();
                set.update_decoy_status();
            }
            return Ok(());
        }

        let data = self.fdr_data.get(&file_id).ok_or(Error::UnknownFile(file_id))?;
        let regex = match data.decoy_strategy() {
            DecoyStrategy::AccessionPattern => Some(data.decoy_regex()?),
            DecoyStrategy::SearchEngine | DecoyStrategy::Inherit => None,
        };
        if let Some(psms) = self.file_psms.get_mut(&file_id) {
            for psm in psms.iter_mut() {
                psm.dump_fdr();
                let decoy = match &regex {
                    Some(re) => matches_decoy_pattern(re, psm.accession_names()),
                    None => psm.spectrum.is_decoy.unwrap_or(false),
                };
                psm.set_decoy(decoy);
            }
        }
        self.sync_sets(file_id, registry);
        Ok(())
    }

    /// The first preferred score present in the file, else its first main
    /// search engine score, else its first score
    fn default_fdr_score(&self, file_id: u64) -> Option<String> {
        let scores = if file_id == 0 {
            let mut all: Vec<String> = Vec::new();
            for s in self.file_scores.values().flatten() {
                if !all.contains(s) {
                    all.push(s.clone());
                }
            }
            all
        } else {
            self.file_scores.get(&file_id)?.clone()
        };
        self.preferred_fdr_scores
            .iter()
            .find(|p| scores.contains(p))
            .or_else(|| {
                scores
                    .iter()
                    .find(|s| ScoreKind::lookup(s).map_or(false, |k| k.is_main_score()))
            })
            .or_else(|| scores.first())
            .cloned()
    }

    /// The score the file's FDR is (or would be) estimated on
    pub fn preferred_fdr_score(&self, file_id: u64) -> Option<String> {
        self.fdr_data
            .get(&file_id)
            .and_then(|d| d.score_short_name())
            .map(String::from)
            .or_else(|| self.default_fdr_score(file_id))
    }

    /// Run the target-decoy estimation on one file's PSMs
    #[tracing::instrument(skip(self, registry), level = "debug")]
    pub fn calculate_fdr(&mut self, file_id: u64, registry: &ScoreRegistry) -> Result<(), Error> {
        if file_id == 0 {
            return self.calculate_combined_fdr_score(registry);
        }
        let configured = self
            .fdr_data
            .get(&file_id)
            .ok_or(Error::UnknownFile(file_id))?
            .score_short_name()
            .map(String::from);

        let score = match configured {
            Some(s) => s,
            None => {
                let s = self
                    .default_fdr_score(file_id)
                    .ok_or(Error::NoFdrScore(file_id))?;
                info!("file {}: no FDR score selected, using {}", file_id, s);
                if let Some(data) = self.fdr_data.get_mut(&file_id) {
                    data.set_score_short_name(Some(&s));
                }
                s
            }
        };

        self.update_decoy_states(file_id, registry)?;

        let comparator = match registry.comparator(&score) {
            Some(c) => c,
            None => {
                warn!("file {}: no direction known for score {}, FDR not estimated", file_id, score);
                return Ok(());
            }
        };

        if let (Some(data), Some(psms)) = (
            self.fdr_data.get_mut(&file_id),
            self.file_psms.get_mut(&file_id),
        ) {
            let top = data.top_identifications();
            let items = psms
                .iter_mut()
                .filter(|p| top == 0 || p.identification_rank(&score).map_or(false, |r| r as usize <= top))
                .collect::<Vec<_>>();
            data.calculate_fdr(&comparator, items);
            info!(
                "file {}: {} of {} PSMs FDR-good at {}",
                file_id,
                data.nr_fdr_good_targets(),
                data.nr_items(),
                data.threshold()
            );
        }

        self.sync_sets(file_id, registry);
        Ok(())
    }

    /// FDR of every input file
    pub fn calculate_all_fdr(&mut self, registry: &ScoreRegistry) -> Result<(), Error> {
        let ids = self.files.keys().copied().collect::<Vec<_>>();
        for id in ids {
            self.calculate_fdr(id, registry)?;
        }
        Ok(())
    }

    /// Combine the per-file FDR scores of the set members into one FDR
    /// score per set. Sets are estimated separately per combination of
    /// files that contributed a valid FDR score.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn calculate_combined_fdr_score(&mut self, registry: &ScoreRegistry) -> Result<(), Error> {
        self.update_decoy_states(0, registry)?;

        let mut groups: BTreeMap<String, Vec<&mut ReportPsmSet>> = BTreeMap::new();
        for set in self.psm_sets.iter_mut() {
            let average = set.calculate_average_fdr_score();
            if average.is_nan() {
                set.set_fdr_score(f64::NAN);
            }
            let key = if set.psms.len() > 1 {
                set.psms
                    .iter()
                    .filter(|p| !p.fdr_score.is_nan())
                    .map(|p| p.file_id())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(":")
            } else {
                set.psms
                    .first()
                    .map(|p| p.file_id().to_string())
                    .unwrap_or_default()
            };
            groups.entry(key).or_default().push(set);
        }

        let data = self.fdr_data.entry(0).or_default();
        let average = ScoreKind::AverageFdrScore.short_name();
        data.set_score_short_name(Some(average));
        let comparator = ScoreComparator::new(average, false);
        let threshold = data.threshold();

        for (key, mut sets) in groups {
            let n = sets.len();
            debug!("combined FDR for files [{}]: {} sets", key, n);
            data.calculate_fdr(&comparator, sets.iter_mut().map(|s| &mut **s).collect());
            if n <= 2 {
                for set in sets.iter_mut() {
                    let avg = set.average_fdr_score;
                    set.set_fdr_score(avg);
                }
            }
        }

        let (mut items, mut targets, mut decoys, mut good_t, mut good_d) = (0, 0, 0, 0, 0);
        for set in self.psm_sets.iter_mut().filter(|s| !s.fdr_score.is_nan()) {
            let good = set.fdr_score <= threshold;
            set.set_fdr_good(good);
            items += 1;
            match (set.is_decoy, good) {
                (true, true) => {
                    decoys += 1;
                    good_d += 1;
                }
                (true, false) => decoys += 1,
                (false, true) => {
                    targets += 1;
                    good_t += 1;
                }
                (false, false) => targets += 1,
            }
        }
        data.correct_numbers(items, targets, decoys, good_t, good_d);
        self.combined_fdr_calculated = true;
        info!("combined FDR score: {} of {} sets FDR-good", good_t, items);
        Ok(())
    }

    pub fn is_fdr_calculated(&self, file_id: u64) -> bool {
        self.fdr_data
            .get(&file_id)
            .map_or(false, FdrData::is_calculated)
    }

    pub fn is_combined_fdr_score_calculated(&self) -> bool {
        self.combined_fdr_calculated
    }

    /// Rank the PSMs of a file (or the sets for file 0) passing `filters`
    /// by one score. Items failing the filters lose their rank.
    pub fn calculate_ranking(
        &mut self,
        file_id: u64,
        short_name: &str,
        filters: &[Filter],
        registry: &ScoreRegistry,
    ) -> Result<(), Error> {
        let comparator = registry
            .comparator(short_name)
            .ok_or_else(|| Error::UnknownScore(short_name.into()))?;

        if file_id == 0 {
            rank::rank_filtered(&comparator, &mut self.psm_sets, filters, 0);
            return Ok(());
        }
        let psms = self
            .file_psms
            .get_mut(&file_id)
            .ok_or(Error::UnknownFile(file_id))?;
        rank::rank_filtered(&comparator, psms, filters, file_id);
        self.sync_sets(file_id, registry);
        Ok(())
    }

    pub fn add_filter(&mut self, file_id: u64, filter: Filter) {
        self.filters.entry(file_id).or_default().push(filter);
    }

    pub fn remove_filter(&mut self, file_id: u64, index: usize) -> Option<Filter> {
        let filters = self.filters.get_mut(&file_id)?;
        if index < filters.len() {
            Some(filters.remove(index))
        } else {
            None
        }
    }

    pub fn filters(&self, file_id: u64) -> &[Filter] {
        self.filters.get(&file_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::new_filter;
    use crate::model::test_graph::{fdr_graph, merge_graph};
    use crate::model::Spectrum;

    fn modeller(graph: &InputGraph, settings: &Settings) -> (PsmModeller, ScoreRegistry) {
        let mut registry = ScoreRegistry::new();
        let psm = PsmModeller::new(graph, settings, &mut registry);
        (psm, registry)
    }

    /// Two files reporting the same five spectra, the last one hitting a
    /// decoy in both
    fn two_file_graph() -> InputGraph {
        let mut g = InputGraph::new();
        g.add_file(InputFile::new(1, "mascot.dat")).unwrap();
        g.add_file(InputFile::new(2, "tandem.xml")).unwrap();
        for i in 0..5u64 {
            let acc = if i == 4 { "s_D4".to_string() } else { format!("P{}", i) };
            g.add_accession(Accession::new(&acc).with_file(1).with_file(2)).unwrap();
            for file in [1, 2] {
                let spectrum = Spectrum::new(i * 2 + file, file, &format!("PEP{}K", (b'A' + i as u8) as char), 2, 500.0 + i as f64)
                    .with_retention_time(100.0 * i as f64)
                    .with_accession(&acc);
                let spectrum = if file == 1 {
                    spectrum.with_score("mascot_score", 100.0 - 10.0 * i as f64)
                } else {
                    spectrum.with_score("xtandem_expect", 0.001 * (i + 1) as f64)
                };
                g.add_spectrum(spectrum).unwrap();
            }
        }
        g
    }

    #[test]
    fn merges_files_into_sets() {
        let settings = Settings::default().with_key_settings(KeySettings::only(&[
            KeySetting::Sequence,
            KeySetting::Charge,
            KeySetting::MassToCharge,
            KeySetting::RetentionTime,
        ]));
        let (psm, registry) = modeller(&merge_graph(), &settings);
        assert_eq!(psm.psm_sets().len(), 1);
        let set = &psm.psm_sets()[0];
        assert_eq!(set.psms().len(), 2);
        assert_eq!(set.key(), "400.2000:1200:PEPTIDE:2");
        assert_eq!(set.score("mascot_score"), Some(45.0));
        assert_eq!(set.score("xtandem_expect"), Some(0.001));
        assert!(psm.psm_set_of_spectrum(2).is_some());
        assert!(psm.psm_set(set.key()).is_some());

        let mut psm = psm;
        psm.apply_general_settings(false, settings.key_settings.clone(), &registry);
        assert_eq!(psm.psm_sets().len(), 2);
        assert!(psm.psm_set_settings().is_enabled(KeySetting::FileId));
    }

    #[test]
    fn user_settings_report_missing_components() {
        let (psm, _) = modeller(&merge_graph(), &Settings::default());
        assert!(psm.unavailable_key_settings().is_empty());

        let settings = Settings::default().with_key_settings(KeySettings::only(&[
            KeySetting::Sequence,
            KeySetting::Charge,
            KeySetting::RetentionTime,
            KeySetting::SourceId,
        ]));
        let (psm, _) = modeller(&merge_graph(), &settings);
        let unavailable = psm.unavailable_key_settings();
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].0, KeySetting::SourceId);
        assert_eq!(unavailable[0].1, [1, 2].into_iter().collect::<BTreeSet<u64>>());
    }

    #[test]
    fn file_fdr() {
        let (mut psm, registry) = modeller(&fdr_graph(), &Settings::default());
        assert!(!psm.has_internal_decoys(2));
        assert!(psm.has_internal_decoys(1));
        psm.calculate_fdr(1, &registry).unwrap();

        let data = psm.files_fdr_data(1).unwrap();
        assert_eq!(data.score_short_name(), Some("mascot_score"));
        assert_eq!(data.nr_targets(), 8);
        assert_eq!(data.nr_decoys(), 2);
        assert_eq!(data.nr_fdr_good_targets(), 8);
        assert!(psm.is_fdr_calculated(1));

        let psms = psm.file_psms(1);
        assert!(psms[..8].iter().all(|p| !p.is_decoy() && p.is_fdr_good()));
        assert_eq!(psms[8].fdr(), 0.125);
        assert_eq!(psms[9].q_value(), 0.25);
        assert!(psms.iter().all(|p| p.score("psm_fdr_score").is_some()));

        // the set members carry the same values
        let member = &psm.psm_set_of_spectrum(9).unwrap().psms()[0];
        assert!(member.is_decoy());
        assert_eq!(member.fdr(), 0.125);

        let f = new_filter("psm_score_filter_psm_q_value", "LEQ", "0.01", false).unwrap();
        assert_eq!(psm.filtered_report_psms(1, &[f.clone()]).len(), 8);
        assert_eq!(psm.filtered_report_psm_sets(&[f], &registry).len(), 8);
        assert!(psm.score_short_names(1).contains(&"psm_q_value".to_string()));
    }

    #[test]
    fn search_engine_decoys() {
        let (mut psm, registry) = modeller(&fdr_graph(), &Settings::default());
        psm.set_all_decoy_pattern("s_D.*").unwrap();
        psm.update_decoy_states(1, &registry).unwrap();
        assert_eq!(psm.file_psms(1).iter().filter(|p| p.is_decoy()).count(), 2);

        psm.set_all_decoy_pattern("nothing").unwrap();
        psm.update_decoy_states(1, &registry).unwrap();
        assert!(psm.file_psms(1).iter().all(|p| !p.is_decoy()));

        psm.set_all_decoy_pattern(SEARCH_ENGINE_DECOYS).unwrap();
        assert_eq!(
            psm.files_fdr_data(1).unwrap().decoy_strategy(),
            DecoyStrategy::SearchEngine
        );
        psm.update_decoy_states(1, &registry).unwrap();
        assert_eq!(psm.file_psms(1).iter().filter(|p| p.is_decoy()).count(), 2);

        assert!(psm.set_all_decoy_pattern("(").is_err());
    }

    #[test]
    fn missing_fdr_score() {
        let mut g = InputGraph::new();
        g.add_file(InputFile::new(1, "empty.dat")).unwrap();
        let (mut psm, registry) = modeller(&g, &Settings::default());
        assert_eq!(psm.calculate_fdr(1, &registry), Err(Error::NoFdrScore(1)));
        assert_eq!(psm.calculate_fdr(7, &registry), Err(Error::UnknownFile(7)));
    }

    #[test]
    fn preferred_score() {
        let settings = Settings::default().with_preferred_fdr_score("xtandem_expect");
        let (mut psm, registry) = modeller(&two_file_graph(), &settings);
        psm.calculate_all_fdr(&registry).unwrap();
        assert_eq!(psm.files_fdr_data(1).unwrap().score_short_name(), Some("mascot_score"));
        assert_eq!(psm.files_fdr_data(2).unwrap().score_short_name(), Some("xtandem_expect"));
    }

    #[test]
    fn top_identifications() {
        let mut g = InputGraph::new();
        g.add_file(InputFile::new(1, "search.dat")).unwrap();
        g.add_accession(Accession::new("P1").with_file(1)).unwrap();
        g.add_accession(Accession::new("s_P1").with_file(1)).unwrap();
        // two candidates for the same spectrum, one more spectrum
        for (id, seq, score, acc, mz) in [
            (1, "AAAK", 60.0, "P1", 300.0),
            (2, "CCCK", 20.0, "s_P1", 300.0),
            (3, "DDDK", 50.0, "P1", 320.0),
        ] {
            g.add_spectrum(
                Spectrum::new(id, 1, seq, 2, mz)
                    .with_retention_time(10.0)
                    .with_score("mascot_score", score)
                    .with_accession(acc),
            )
            .unwrap();
        }
        let (mut psm, registry) = modeller(&g, &Settings::default().with_top_identifications(1));
        let ranks = psm
            .file_psms(1)
            .iter()
            .map(|p| p.identification_rank("mascot_score"))
            .collect::<Vec<_>>();
        assert_eq!(ranks, vec![Some(1), Some(2), Some(1)]);

        psm.calculate_fdr(1, &registry).unwrap();
        let data = psm.files_fdr_data(1).unwrap();
        assert_eq!(data.nr_items(), 2);
        assert_eq!(data.nr_decoys(), 0);
        assert!(psm.file_psms(1)[1].fdr().is_nan());

        let f = new_filter("psm_top_identification_filter_mascot_score", "EQ", "1", false).unwrap();
        assert_eq!(psm.filtered_report_psms(1, &[f]).len(), 2);
    }

    #[test]
    fn combined_fdr() {
        let (mut psm, registry) = modeller(&two_file_graph(), &Settings::default());
        assert_eq!(psm.psm_sets().len(), 5);
        psm.calculate_all_fdr(&registry).unwrap();
        psm.calculate_combined_fdr_score(&registry).unwrap();
        assert!(psm.is_combined_fdr_score_calculated());

        let data = psm.files_fdr_data(0).unwrap();
        assert_eq!(data.nr_items(), 5);
        assert_eq!(data.nr_targets(), 4);
        assert_eq!(data.nr_decoys(), 1);

        let sets = psm.psm_sets();
        assert!(sets.iter().all(|s| s.score("psm_combined_fdr_score").is_some()));
        let decoy = sets.iter().find(|s| s.is_decoy()).unwrap();
        assert!(sets
            .iter()
            .filter(|s| !s.is_decoy())
            .all(|s| s.fdr_score() <= decoy.fdr_score()));

        let f = new_filter("psm_score_filter_psm_combined_fdr_score", "LEQ", "1", false).unwrap();
        assert_eq!(psm.filtered_report_psm_sets(&[f], &registry).len(), 5);
        assert!(psm
            .score_short_names(0)
            .contains(&"psm_combined_fdr_score".to_string()));
    }

    #[test]
    fn ranking() {
        let (mut psm, registry) = modeller(&fdr_graph(), &Settings::default());
        let f = new_filter("psm_accessions_filter", "REG", "s_.*", true).unwrap();
        psm.calculate_ranking(1, "mascot_score", &[f], &registry).unwrap();
        let ranks = psm.file_psms(1).iter().map(|p| p.rank()).collect::<Vec<_>>();
        assert_eq!(&ranks[..3], &[Some(1), Some(2), Some(3)]);
        assert_eq!(&ranks[8..], &[None, None]);

        psm.calculate_ranking(0, "mascot_score", &[], &registry).unwrap();
        assert!(psm.psm_sets().iter().all(|s| s.rank().is_some()));
        assert_eq!(
            psm.calculate_ranking(1, "no_such_score", &[], &registry),
            Err(Error::UnknownScore("no_such_score".into()))
        );
    }

    #[test]
    fn filter_crud() {
        let (mut psm, _) = modeller(&fdr_graph(), &Settings::default());
        let f = new_filter("charge_filter", "EQ", "2", false).unwrap();
        psm.add_filter(1, f.clone());
        assert_eq!(psm.filters(1), &[f.clone()]);
        assert_eq!(psm.remove_filter(1, 3), None);
        assert_eq!(psm.remove_filter(1, 0), Some(f));
        assert!(psm.filters(1).is_empty());
        assert!(psm.filters(5).is_empty());
    }
}
