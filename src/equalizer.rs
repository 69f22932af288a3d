use crate::config;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_BANDS: &[&str] = &[
    "30-120Hz",
    "120-460Hz",
    "460-1800Hz",
    "1800-7000Hz",
    "7000-20000Hz",
];
const DEFAULT_LOWER_LEVEL_MB: i16 = -1500;
const DEFAULT_UPPER_LEVEL_MB: i16 = 1500;

/// Band gains in millibels, persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualizerSettings {
    #[serde(default)]
    pub enabled: bool,
    pub band_frequencies: Vec<String>,
    pub lower_level_mb: i16,
    pub upper_level_mb: i16,
    pub band_levels_mb: Vec<i16>,
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            band_frequencies: DEFAULT_BANDS.iter().map(|band| band.to_string()).collect(),
            lower_level_mb: DEFAULT_LOWER_LEVEL_MB,
            upper_level_mb: DEFAULT_UPPER_LEVEL_MB,
            band_levels_mb: vec![0; DEFAULT_BANDS.len()],
        }
    }
}

impl EqualizerSettings {
    fn normalized(mut self) -> Self {
        if self.lower_level_mb > self.upper_level_mb {
            std::mem::swap(&mut self.lower_level_mb, &mut self.upper_level_mb);
        }
        self.band_levels_mb.resize(self.band_frequencies.len(), 0);
        let (low, high) = (self.lower_level_mb, self.upper_level_mb);
        for level in &mut self.band_levels_mb {
            *level = (*level).clamp(low, high);
        }
        self
    }
}

pub struct EqualizerController {
    settings: EqualizerSettings,
    path: Option<PathBuf>,
}

impl EqualizerController {
    pub fn load() -> Result<Self> {
        Self::load_from(config::equalizer_path()?)
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        let settings: EqualizerSettings = config::load_json_or_default(&path)?;
        Ok(Self {
            settings: settings.normalized(),
            path: Some(path),
        })
    }

    /// Controller that never touches disk.
    pub fn in_memory(settings: EqualizerSettings) -> Self {
        Self {
            settings: settings.normalized(),
            path: None,
        }
    }

    pub fn settings(&self) -> &EqualizerSettings {
        &self.settings
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.settings.enabled = enabled;
        self.save()
    }

    /// Sets one band, clamping the level to the supported range.
    pub fn set_band_level(&mut self, band: usize, level_mb: i16) -> Result<i16> {
        let (low, high) = (self.settings.lower_level_mb, self.settings.upper_level_mb);
        let Some(slot) = self.settings.band_levels_mb.get_mut(band) else {
            bail!("equalizer has no band {band}");
        };
        *slot = level_mb.clamp(low, high);
        let applied = *slot;
        self.save()?;
        Ok(applied)
    }

    pub fn set_band_levels(&mut self, levels_mb: &[i16]) -> Result<()> {
        if levels_mb.len() != self.settings.band_levels_mb.len() {
            bail!(
                "expected {} band levels, got {}",
                self.settings.band_levels_mb.len(),
                levels_mb.len()
            );
        }
        let (low, high) = (self.settings.lower_level_mb, self.settings.upper_level_mb);
        for (slot, level) in self.settings.band_levels_mb.iter_mut().zip(levels_mb) {
            *slot = (*level).clamp(low, high);
        }
        self.save()
    }

    pub fn reset(&mut self) -> Result<()> {
        self.settings.band_levels_mb.fill(0);
        self.save()
    }

    /// Levels the output should apply right now; empty while disabled.
    pub fn effective_levels(&self) -> Vec<i16> {
        if self.settings.enabled {
            self.settings.band_levels_mb.clone()
        } else {
            Vec::new()
        }
    }

    fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => config::save_json(path, &self.settings),
            None => Ok(()),
        }
    }
}
