//! Persisted user settings.
//!
//! Stored as JSON in the user's config directory, by default
//! `<config dir>/spectra/settings.json`. Every field has a default so older or
//! hand-edited files keep loading.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::audio::player::{MAX_INTENSITY_DB, MAX_PLAYBACK_RATE, MIN_INTENSITY_DB, MIN_PLAYBACK_RATE};
use crate::audio::DEFAULT_BEAT_DECAY;
use crate::visualizers::SettingValue;

/// Per-visualizer overrides, keyed by visualizer name then setting key.
pub type VisualizerSettings = BTreeMap<String, BTreeMap<String, SettingValue>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub volume: f32,
    pub intensity_gain_db: f32,
    pub playback_rate: f64,
    pub last_opened_folder: Option<PathBuf>,
    pub include_subfolders: bool,
    pub active_visualizer: Option<String>,
    pub theme_preset: Option<String>,
    /// `None` renders at the display rate.
    pub fps_cap: Option<u32>,
    pub beat_detection: bool,
    pub beat_flash_decay: f32,
    pub presence_enabled: bool,
    pub visualizers: VisualizerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            intensity_gain_db: 0.0,
            playback_rate: 1.0,
            last_opened_folder: None,
            include_subfolders: false,
            active_visualizer: None,
            theme_preset: None,
            fps_cap: Some(60),
            beat_detection: true,
            beat_flash_decay: DEFAULT_BEAT_DECAY,
            presence_enabled: false,
            visualizers: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Pulls out-of-range values from a hand-edited file back into range.
    pub fn sanitized(mut self) -> Self {
        let defaults = Settings::default();
        self.volume = finite_or(self.volume, defaults.volume).clamp(0.0, 1.0);
        self.intensity_gain_db =
            finite_or(self.intensity_gain_db, defaults.intensity_gain_db).clamp(MIN_INTENSITY_DB, MAX_INTENSITY_DB);
        self.playback_rate = if self.playback_rate.is_finite() {
            self.playback_rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
        } else {
            defaults.playback_rate
        };
        self.beat_flash_decay = finite_or(self.beat_flash_decay, defaults.beat_flash_decay).clamp(0.0, 1.0);
        self
    }

    pub fn visualizer_setting(&self, visualizer: &str, key: &str) -> Option<&SettingValue> {
        self.visualizers.get(visualizer)?.get(key)
    }

    pub fn set_visualizer_setting(&mut self, visualizer: &str, key: &str, value: SettingValue) {
        self.visualizers
            .entry(visualizer.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Default settings location: `<config dir>/spectra/settings.json`.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("spectra")
        .join("settings.json")
}

/// Settings bound to the file they are read from and written back to.
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    pub fn open(path: PathBuf) -> Self {
        let settings = load_settings(&path);
        Self { path, settings }
    }

    /// A store that starts from defaults without reading anything.
    pub fn in_memory(path: PathBuf) -> Self {
        Self {
            path,
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Applies `change` and writes the result. A failed write is logged and
    /// the in-memory value is kept.
    pub fn update(&mut self, change: impl FnOnce(&mut Settings)) {
        change(&mut self.settings);
        if let Err(e) = save_settings(&self.settings, &self.path) {
            warn!("⚠️  Could not save settings: {:#}", e);
        }
    }
}

/// Reads settings, falling back to defaults when the file is missing or unreadable.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        info!("No settings at {}, using defaults", path.display());
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
            Ok(settings) => {
                info!("✅ Settings loaded from {}", path.display());
                settings.sanitized()
            }
            Err(e) => {
                warn!("⚠️  Failed to parse settings: {}. Falling back to defaults.", e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("⚠️  Failed to read settings file: {}. Falling back to defaults.", e);
            Settings::default()
        }
    }
}

/// Writes settings as pretty JSON, creating parent directories as needed.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write settings file: {:?}", path))?;
    Ok(())
}
