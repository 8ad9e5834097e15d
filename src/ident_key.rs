//! Identification keys decide when two raw PSMs describe the same
//! observation and have to be merged into one PSM set
use crate::model::Spectrum;
use crate::util::{format_mass, round_half_up};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Components of an identification key, in rendering order
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum KeySetting {
    MassToCharge,
    RetentionTime,
    SourceId,
    SpectrumTitle,
    Sequence,
    Modifications,
    Charge,
    FileId,
}

impl KeySetting {
    pub const ALL: [KeySetting; 8] = [
        KeySetting::MassToCharge,
        KeySetting::RetentionTime,
        KeySetting::SourceId,
        KeySetting::SpectrumTitle,
        KeySetting::Sequence,
        KeySetting::Modifications,
        KeySetting::Charge,
        KeySetting::FileId,
    ];

    pub fn default_value(&self) -> bool {
        !matches!(
            self,
            KeySetting::SourceId | KeySetting::SpectrumTitle | KeySetting::FileId
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeySetting::MassToCharge => "mass_to_charge",
            KeySetting::RetentionTime => "retention_time",
            KeySetting::SourceId => "source_id",
            KeySetting::SpectrumTitle => "spectrum_title",
            KeySetting::Sequence => "sequence",
            KeySetting::Modifications => "modifications",
            KeySetting::Charge => "charge",
            KeySetting::FileId => "file_id",
        }
    }

    fn render(&self, psm: &Spectrum) -> String {
        match self {
            KeySetting::MassToCharge => {
                if psm.mass_to_charge.is_nan() {
                    String::new()
                } else {
                    format!("{:.4}", psm.mass_to_charge)
                }
            }
            KeySetting::RetentionTime => psm
                .retention_time
                .filter(|rt| !rt.is_nan())
                .map(|rt| format!("{}", round_half_up(rt, 0) as i64))
                .unwrap_or_default(),
            KeySetting::SourceId => psm.source_id.clone().unwrap_or_default(),
            KeySetting::SpectrumTitle => psm.spectrum_title.clone().unwrap_or_default(),
            KeySetting::Sequence => psm.sequence.to_uppercase(),
            KeySetting::Modifications => psm
                .modifications
                .iter()
                .map(|(pos, m)| {
                    format!(
                        "({}:{}/{})",
                        pos,
                        m.accession.as_deref().unwrap_or(""),
                        format_mass(m.mass)
                    )
                })
                .collect(),
            KeySetting::Charge => psm.charge.to_string(),
            KeySetting::FileId => psm.file_id.to_string(),
        }
    }

    /// Whether the PSM carries a usable value for this component
    pub(crate) fn available(&self, psm: &Spectrum) -> bool {
        match self {
            KeySetting::MassToCharge => !psm.mass_to_charge.is_nan(),
            KeySetting::RetentionTime => psm.retention_time.map_or(false, |rt| !rt.is_nan()),
            KeySetting::SourceId => psm.source_id.is_some(),
            KeySetting::SpectrumTitle => psm.spectrum_title.is_some(),
            _ => true,
        }
    }
}

/// Which components make up an identification key
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct KeySettings(BTreeMap<KeySetting, bool>);

impl Default for KeySettings {
    fn default() -> Self {
        KeySettings(
            KeySetting::ALL
                .iter()
                .map(|s| (*s, s.default_value()))
                .collect(),
        )
    }
}

impl KeySettings {
    /// Every component enabled
    pub fn all() -> Self {
        KeySettings(KeySetting::ALL.iter().map(|s| (*s, true)).collect())
    }

    /// Only the given components enabled
    pub fn only(settings: &[KeySetting]) -> Self {
        KeySettings(
            KeySetting::ALL
                .iter()
                .map(|s| (*s, settings.contains(s)))
                .collect(),
        )
    }

    pub fn is_enabled(&self, setting: KeySetting) -> bool {
        self.0.get(&setting).copied().unwrap_or(false)
    }

    pub fn set(&mut self, setting: KeySetting, enabled: bool) {
        self.0.insert(setting, enabled);
    }

    pub fn with(mut self, setting: KeySetting, enabled: bool) -> Self {
        self.set(setting, enabled);
        self
    }

    pub fn enabled(&self) -> impl Iterator<Item = KeySetting> + '_ {
        self.0.iter().filter(|(_, on)| **on).map(|(s, _)| *s)
    }
}

/// Build the canonical key of a PSM: the enabled components, rendered and
/// joined by `:`
pub fn build_key(psm: &Spectrum, settings: &KeySettings) -> String {
    settings
        .enabled()
        .map(|s| s.render(psm))
        .collect::<Vec<_>>()
        .join(":")
}

/// A trusted source id makes m/z, retention time and title redundant
pub fn prune_redundant(mut settings: KeySettings) -> KeySettings {
    if settings.is_enabled(KeySetting::SourceId) {
        settings.set(KeySetting::MassToCharge, false);
        settings.set(KeySetting::RetentionTime, false);
        settings.set(KeySetting::SpectrumTitle, false);
    }
    settings
}

/// Start from every component and drop those that some file reported as
/// unreliable, then prune
pub fn maximal_settings(warnings: &BTreeMap<KeySetting, BTreeSet<u64>>) -> KeySettings {
    let mut settings = KeySettings::all();
    for (setting, files) in warnings {
        if !files.is_empty() {
            warn!(
                "disabling {} for identification keys, unreliable in files {:?}",
                setting.name(),
                files
            );
            settings.set(*setting, false);
        }
    }
    prune_redundant(settings)
}

const SPECTRUM_COMPONENTS: [KeySetting; 5] = [
    KeySetting::MassToCharge,
    KeySetting::RetentionTime,
    KeySetting::SourceId,
    KeySetting::SpectrumTitle,
    KeySetting::Charge,
];

/// Settings for spectrum keys: the spectrum components that every given
/// PSM carries, pruned
pub fn spectrum_settings<'a, I>(psms: I) -> KeySettings
where
    I: IntoIterator<Item = &'a Spectrum>,
{
    let mut settings = KeySettings::only(&SPECTRUM_COMPONENTS);
    for psm in psms {
        for setting in SPECTRUM_COMPONENTS.iter() {
            if !setting.available(psm) {
                settings.set(*setting, false);
            }
        }
    }
    prune_redundant(settings)
}

/// Key of the spectrum a PSM identifies, without peptide information
pub fn spectrum_key(psm: &Spectrum, settings: &KeySettings) -> String {
    let settings = settings
        .clone()
        .with(KeySetting::Sequence, false)
        .with(KeySetting::Modifications, false)
        .with(KeySetting::FileId, false);
    build_key(psm, &settings)
}
