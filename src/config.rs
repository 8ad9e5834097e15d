//! Every tunable default in one place
use crate::fdr::{DecoyStrategy, FdrEstimator, DEFAULT_DECOY_PATTERN, DEFAULT_FDR_THRESHOLD};
use crate::ident_key::KeySettings;
use crate::protein::{InferenceMethod, PsmForScoring, ScoringMethod};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Settings {
    pub decoy_strategy: DecoyStrategy,
    pub decoy_pattern: String,
    pub fdr_threshold: f64,
    /// Only PSMs ranked at most this high per spectrum enter the FDR walk,
    /// 0 disables the filter
    pub top_identifications: usize,
    pub estimator: FdrEstimator,
    /// Merge PSMs of different files into cross-file PSM sets
    pub create_psm_sets: bool,
    /// User-chosen identification key settings, `None` for the maximal
    /// settings allowed by the input
    pub key_settings: Option<KeySettings>,
    /// Peptides with different modifications are distinct peptides
    pub consider_modifications: bool,
    /// Scores tried first when choosing the FDR score of a file
    pub preferred_fdr_scores: Vec<String>,
    pub inference: InferenceMethod,
    pub scoring: ScoringMethod,
    /// Base score for protein scoring, `None` for the PSM-level FDR score
    pub scoring_base_score: Option<String>,
    pub psms_for_scoring: PsmForScoring,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            decoy_strategy: DecoyStrategy::AccessionPattern,
            decoy_pattern: DEFAULT_DECOY_PATTERN.into(),
            fdr_threshold: DEFAULT_FDR_THRESHOLD,
            top_identifications: 0,
            estimator: FdrEstimator::DecoysOverTargets,
            create_psm_sets: true,
            key_settings: None,
            consider_modifications: false,
            preferred_fdr_scores: Vec::new(),
            inference: InferenceMethod::OccamsRazor,
            scoring: ScoringMethod::Multiplicative,
            scoring_base_score: None,
            psms_for_scoring: PsmForScoring::Best,
        }
    }
}

impl Settings {
    pub fn with_decoy_strategy(mut self, strategy: DecoyStrategy) -> Self {
        self.decoy_strategy = strategy;
        self
    }

    pub fn with_decoy_pattern(mut self, pattern: &str) -> Self {
        self.decoy_pattern = pattern.into();
        self
    }

    pub fn with_fdr_threshold(mut self, threshold: f64) -> Self {
        self.fdr_threshold = threshold;
        self
    }

    pub fn with_top_identifications(mut self, top: usize) -> Self {
        self.top_identifications = top;
        self
    }

    pub fn with_estimator(mut self, estimator: FdrEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_create_psm_sets(mut self, create: bool) -> Self {
        self.create_psm_sets = create;
        self
    }

    pub fn with_key_settings(mut self, settings: KeySettings) -> Self {
        self.key_settings = Some(settings);
        self
    }

    pub fn with_consider_modifications(mut self, consider: bool) -> Self {
        self.consider_modifications = consider;
        self
    }

    pub fn with_preferred_fdr_score(mut self, short_name: &str) -> Self {
        if !self.preferred_fdr_scores.iter().any(|s| s == short_name) {
            self.preferred_fdr_scores.push(short_name.into());
        }
        self
    }

    pub fn with_inference(mut self, method: InferenceMethod) -> Self {
        self.inference = method;
        self
    }

    pub fn with_scoring(mut self, method: ScoringMethod) -> Self {
        self.scoring = method;
        self
    }

    pub fn with_scoring_base_score(mut self, short_name: &str) -> Self {
        self.scoring_base_score = Some(short_name.into());
        self
    }

    pub fn with_psms_for_scoring(mut self, psms: PsmForScoring) -> Self {
        self.psms_for_scoring = psms;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.decoy_pattern, "s.*");
        assert_eq!(s.fdr_threshold, 0.01);
        assert_eq!(s.top_identifications, 0);
        assert!(s.create_psm_sets);
        assert!(!s.consider_modifications);
        assert_eq!(s.inference, InferenceMethod::OccamsRazor);
        assert_eq!(s.scoring, ScoringMethod::Multiplicative);
        assert_eq!(s.psms_for_scoring, PsmForScoring::Best);
    }

    #[test]
    fn builder() {
        let s = Settings::default()
            .with_preferred_fdr_score("mascot_score")
            .with_preferred_fdr_score("mascot_score")
            .with_fdr_threshold(0.05)
            .with_decoy_strategy(DecoyStrategy::SearchEngine);
        assert_eq!(s.preferred_fdr_scores, vec!["mascot_score".to_string()]);
        assert_eq!(s.fdr_threshold, 0.05);
        assert_eq!(s.decoy_strategy, DecoyStrategy::SearchEngine);
    }

    #[cfg(feature = "serialization")]
    #[test]
    fn json_roundtrip() {
        let s = Settings::default()
            .with_scoring(ScoringMethod::Additive)
            .with_key_settings(KeySettings::default());
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
