//! Consolidation of peptide-spectrum matches from one or more search engine
//! runs into PSM, peptide and protein reports, each with decoy-based FDR
//! estimation, ranking and filtering
pub mod config;
mod error;
pub mod fdr;
pub mod filter;
pub mod ident_key;
pub mod model;
pub mod peptide;
pub mod protein;
pub mod psm;
pub mod rank;
pub mod score;
mod util;

pub use config::Settings;
pub use error::Error;
pub use fdr::{DecoyStrategy, FdrData, FdrEstimator};
pub use filter::{new_filter, parse_rules, Filter};
pub use model::InputGraph;
pub use peptide::{PeptideModeller, ReportPeptide};
pub use protein::{InferenceMethod, ProteinModeller, PsmForScoring, ReportProtein, ScoringMethod};
pub use psm::{PsmModeller, ReportPsm, ReportPsmSet};
pub use score::{ScoreKind, ScoreRegistry};

use tracing::info;

/// Wires the PSM, peptide and protein levels over one input graph. The
/// peptide level is built on first use and rebuilt after the PSM level
/// changed.
#[derive(Debug)]
pub struct Modeller {
    graph: InputGraph,
    settings: Settings,
    registry: ScoreRegistry,
    psm: PsmModeller,
    peptide: Option<PeptideModeller>,
    protein: ProteinModeller,
}

impl Modeller {
    pub fn new(graph: InputGraph, settings: Settings) -> Self {
        let mut registry = ScoreRegistry::new();
        let psm = PsmModeller::new(&graph, &settings, &mut registry);
        let protein = ProteinModeller::new(&settings);
        info!(
            "modeller ready: {} files, {} PSM sets",
            psm.files().len(),
            psm.psm_sets().len()
        );
        Modeller {
            graph,
            settings,
            registry,
            psm,
            peptide: None,
            protein,
        }
    }

    pub fn graph(&self) -> &InputGraph {
        &self.graph
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ScoreRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ScoreRegistry {
        &mut self.registry
    }

    pub fn psm_modeller(&self) -> &PsmModeller {
        &self.psm
    }

    /// Mutable PSM level. The peptide level is rebuilt on its next use.
    pub fn psm_modeller_mut(&mut self) -> &mut PsmModeller {
        self.invalidate_peptides();
        &mut self.psm
    }

    pub fn peptide_modeller(&mut self) -> &PeptideModeller {
        self.peptide_modeller_mut()
    }

    pub fn peptide_modeller_mut(&mut self) -> &mut PeptideModeller {
        let (psm, settings, registry) = (&self.psm, &self.settings, &self.registry);
        self.peptide
            .get_or_insert_with(|| PeptideModeller::new(psm, settings, registry))
    }

    pub fn protein_modeller(&self) -> &ProteinModeller {
        &self.protein
    }

    pub fn protein_modeller_mut(&mut self) -> &mut ProteinModeller {
        &mut self.protein
    }

    fn invalidate_peptides(&mut self) {
        if let Some(peptide) = self.peptide.as_mut() {
            peptide.invalidate();
        }
    }

    /// Merge (or stop merging) PSMs of different files into PSM sets
    pub fn set_create_psm_sets(&mut self, create: bool) {
        if self.settings.create_psm_sets == create {
            return;
        }
        self.settings.create_psm_sets = create;
        self.psm
            .apply_general_settings(create, self.settings.key_settings.clone(), &self.registry);
        self.invalidate_peptides();
    }

    /// PSM FDR of every file, plus the combined FDR score of the sets when
    /// PSM sets are created
    pub fn calculate_psm_fdr(&mut self) -> Result<(), Error> {
        self.psm.calculate_all_fdr(&self.registry)?;
        if self.psm.create_psm_sets() {
            self.psm.calculate_combined_fdr_score(&self.registry)?;
        }
        self.invalidate_peptides();
        Ok(())
    }

    /// Peptides of a file passing `filters`
    pub fn filtered_report_peptides(&mut self, file_id: u64, filters: &[Filter]) -> Vec<ReportPeptide> {
        self.peptide_modeller_mut();
        match self.peptide.as_mut() {
            Some(peptide) => peptide.filtered_report_peptides(file_id, filters, &self.psm, &self.registry),
            None => Vec::new(),
        }
    }

    pub fn calculate_peptide_fdr(&mut self, file_id: u64) -> Result<(), Error> {
        self.peptide_modeller_mut();
        match self.peptide.as_mut() {
            Some(peptide) => peptide.calculate_fdr(file_id, &self.psm, &self.registry),
            None => Ok(()),
        }
    }

    /// Infer the proteins from the current PSM level, reusing the unfiltered
    /// overview peptides
    pub fn infer_proteins(&mut self) -> Result<(), Error> {
        self.peptide_modeller_mut();
        let overview = match self.peptide.as_mut() {
            Some(peptide) => peptide.filtered_report_peptides(0, &[], &self.psm, &self.registry),
            None => Vec::new(),
        };
        self.protein.infer(
            &self.graph,
            &self.psm,
            &overview,
            self.settings.consider_modifications,
            &self.registry,
        )
    }

    pub fn calculate_protein_fdr(&mut self) -> Result<(), Error> {
        self.protein.calculate_fdr(&self.registry)
    }
}
