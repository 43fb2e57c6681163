//! Visualizers turn one spectral frame at a time into pixels.
//!
//! Each visualizer copies what it needs in [`Visualizer::update`] and paints in
//! [`Visualizer::draw`]. Settings are described by a schema so the registry can
//! validate values before they reach an instance.

pub mod circular;
pub mod dna_helix;
pub mod fireworks;
pub mod frequency_bars;
pub mod kaleidoscope;
pub mod oscilloscope;
pub mod particles;
pub mod radial_bars;
pub mod registry;
pub mod spectra;
pub mod spectrum;
pub mod starfield;
pub mod tunnel;
pub mod wave_rings;
pub mod waveform;

use serde::{Deserialize, Serialize};
use tiny_skia::Pixmap;

use crate::effects::Theme;
use crate::error::{Error, Result};

pub use registry::VisualizerRegistry;

/// What a visualizer draws onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDescriptor {
    pub width: u32,
    pub height: u32,
    pub theme: Theme,
}

impl SurfaceDescriptor {
    pub fn new(width: u32, height: u32, theme: Theme) -> Self {
        Self { width, height, theme }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f32),
    Text(String),
}

impl SettingValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            SettingValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingKind {
    Range { min: f32, max: f32, step: f32 },
    Select { options: &'static [&'static str] },
    Toggle,
}

/// One entry of a visualizer's settings schema.
///
/// `structural` settings change the shape of an instance's state (particle
/// counts, ring segmentation), so the registry re-initializes after applying them.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingDef {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: SettingKind,
    pub default: SettingValue,
    pub structural: bool,
}

impl SettingDef {
    pub fn range(key: &'static str, label: &'static str, min: f32, max: f32, step: f32, default: f32) -> Self {
        Self {
            key,
            label,
            kind: SettingKind::Range { min, max, step },
            default: SettingValue::Number(default),
            structural: false,
        }
    }

    pub fn select(key: &'static str, label: &'static str, options: &'static [&'static str], default: &str) -> Self {
        Self {
            key,
            label,
            kind: SettingKind::Select { options },
            default: SettingValue::Text(default.to_string()),
            structural: false,
        }
    }

    pub fn toggle(key: &'static str, label: &'static str, default: bool) -> Self {
        Self {
            key,
            label,
            kind: SettingKind::Toggle,
            default: SettingValue::Bool(default),
            structural: false,
        }
    }

    pub fn structural(mut self) -> Self {
        self.structural = true;
        self
    }

    /// Checks `value` against the schema. Ranges are clamped and snapped to the step.
    pub fn validate(&self, value: &SettingValue) -> Result<SettingValue> {
        match (&self.kind, value) {
            (SettingKind::Range { min, max, step }, SettingValue::Number(n)) => {
                if !n.is_finite() {
                    return Err(Error::invalid_setting(self.key, "not a finite number"));
                }
                let v = n.clamp(*min, *max);
                if *step <= 0.0 {
                    return Ok(SettingValue::Number(v));
                }
                let snapped = (min + ((v - min) / step).round() * step).clamp(*min, *max);
                // Values already on a step keep their exact bits.
                if (snapped - v).abs() < step * 1e-3 {
                    Ok(SettingValue::Number(v))
                } else {
                    Ok(SettingValue::Number(snapped))
                }
            }
            (SettingKind::Select { options }, SettingValue::Text(s)) => {
                if options.contains(&s.as_str()) {
                    Ok(value.clone())
                } else {
                    Err(Error::invalid_setting(self.key, format!("'{}' is not one of {:?}", s, options)))
                }
            }
            (SettingKind::Toggle, SettingValue::Bool(_)) => Ok(value.clone()),
            _ => Err(Error::invalid_setting(self.key, format!("wrong value type {:?}", value))),
        }
    }
}

pub trait Visualizer: Send {
    fn name(&self) -> &'static str;

    /// (Re)builds all surface-dependent state.
    fn init(&mut self, surface: &SurfaceDescriptor);

    /// Copies the latest frame. Must not allocate.
    fn update(&mut self, time_domain: &[u8], frequency: &[u8]);

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()>;

    fn settings_schema(&self) -> Vec<SettingDef> {
        Vec::new()
    }

    /// Receives an already validated value.
    fn apply_setting(&mut self, key: &str, _value: &SettingValue) -> Result<()> {
        Err(Error::invalid_setting(key, "unknown setting"))
    }

    fn set_beat(&mut self, _envelope: f32) {}
}

/// A visualizer's private copy of the latest frame.
///
/// Storage only grows when the analysis bin count changes, so steady-state
/// updates never allocate.
#[derive(Debug, Default, Clone)]
pub(crate) struct FrameCopy {
    pub time_domain: Vec<u8>,
    pub frequency: Vec<u8>,
}

impl FrameCopy {
    pub fn copy_from(&mut self, time_domain: &[u8], frequency: &[u8]) {
        copy_resizing(&mut self.time_domain, time_domain);
        copy_resizing(&mut self.frequency, frequency);
    }
}

fn copy_resizing(dst: &mut Vec<u8>, src: &[u8]) {
    if dst.len() != src.len() {
        dst.resize(src.len(), 0);
    }
    dst.copy_from_slice(src);
}

pub(crate) fn number(value: &SettingValue, key: &str) -> Result<f32> {
    value.as_f32().ok_or_else(|| Error::invalid_setting(key, "expected a number"))
}

pub(crate) fn flag(value: &SettingValue, key: &str) -> Result<bool> {
    value.as_bool().ok_or_else(|| Error::invalid_setting(key, "expected true or false"))
}

/// Average of `bins[start..end]` normalized to `0..1`.
pub(crate) fn band_energy(bins: &[u8], start: usize, end: usize) -> f32 {
    let end = end.min(bins.len());
    if start >= end {
        return 0.0;
    }
    let sum: u32 = bins[start..end].iter().map(|&b| b as u32).sum();
    sum as f32 / (end - start) as f32 / 255.0
}

/// Every built-in visualizer, in menu order.
pub fn builtin() -> Vec<Box<dyn Visualizer>> {
    vec![
        Box::new(waveform::Waveform::new()),
        Box::new(frequency_bars::FrequencyBars::new()),
        Box::new(spectrum::Spectrum::new()),
        Box::new(spectra::Spectra::new()),
        Box::new(radial_bars::RadialBars::new()),
        Box::new(particles::Particles::new()),
        Box::new(starfield::Starfield::new()),
        Box::new(wave_rings::WaveRings::new()),
        Box::new(dna_helix::DnaHelix::new()),
        Box::new(tunnel::Tunnel::new()),
        Box::new(oscilloscope::Oscilloscope::new()),
        Box::new(kaleidoscope::Kaleidoscope::new()),
        Box::new(circular::Circular::new()),
        Box::new(fireworks::Fireworks::new()),
    ]
}

/// A registry holding [`builtin`], with the first one active.
pub fn default_registry() -> VisualizerRegistry {
    let mut registry = VisualizerRegistry::new();
    for visualizer in builtin() {
        if let Err(e) = registry.register(visualizer) {
            log::warn!("⚠️  Skipping visualizer: {}", e);
        }
    }
    registry
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validation_clamps_and_snaps() {
        let def = SettingDef::range("count", "Count", 50.0, 500.0, 50.0, 200.0);
        assert_eq!(def.validate(&SettingValue::Number(1000.0)).unwrap(), SettingValue::Number(500.0));
        assert_eq!(def.validate(&SettingValue::Number(130.0)).unwrap(), SettingValue::Number(150.0));
        assert!(def.validate(&SettingValue::Number(f32::NAN)).is_err());
        assert!(def.validate(&SettingValue::Bool(true)).is_err());
    }

    #[test]
    fn test_select_and_toggle_validation() {
        let def = SettingDef::select("style", "Style", &["solid", "glow"], "solid");
        assert!(def.validate(&SettingValue::Text("glow".into())).is_ok());
        assert!(def.validate(&SettingValue::Text("plaid".into())).is_err());

        let toggle = SettingDef::toggle("mirror", "Mirror", false);
        assert!(toggle.validate(&SettingValue::Bool(true)).is_ok());
        assert!(toggle.validate(&SettingValue::Number(1.0)).is_err());
    }

    #[test]
    fn test_setting_value_json_is_untagged() {
        let values: Vec<SettingValue> = serde_json::from_str(r#"[true, 2.5, "glow"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                SettingValue::Bool(true),
                SettingValue::Number(2.5),
                SettingValue::Text("glow".into())
            ]
        );
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let registry = default_registry();
        assert_eq!(registry.list().len(), 14);
        assert_eq!(registry.current_name(), Some("Waveform"));
    }

    #[test]
    fn test_every_builtin_draws_and_accepts_defaults() {
        for mut visualizer in builtin() {
            testing::defaults_apply(visualizer.as_mut());
            assert!(
                testing::renders_something(visualizer.as_mut()),
                "{} drew nothing",
                visualizer.name()
            );
        }
    }

    #[test]
    fn test_band_energy() {
        assert_eq!(band_energy(&[255, 255, 0, 0], 0, 2), 1.0);
        assert_eq!(band_energy(&[255, 255, 0, 0], 2, 10), 0.0);
        assert_eq!(band_energy(&[], 0, 4), 0.0);
    }
}
