use serde::{Deserialize, Serialize};

use crate::graphics::Rgb;

/// Global look shared by every visualizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub background: Rgb,
    pub primary: Rgb,
    pub sensitivity: f32,
    pub line_width: f32,
    pub mirror: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Rgb::BLACK,
            primary: Rgb::new(0x00, 0xff, 0x88),
            sensitivity: 1.0,
            line_width: 2.0,
            mirror: false,
        }
    }
}

impl Theme {
    pub const MIN_SENSITIVITY: f32 = 0.1;
    pub const MAX_SENSITIVITY: f32 = 3.0;

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = sensitivity.clamp(Self::MIN_SENSITIVITY, Self::MAX_SENSITIVITY);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemePreset {
    pub name: String,
    pub theme: Theme,
}

impl ThemePreset {
    fn new(name: &str, background: Rgb, primary: Rgb, sensitivity: f32, line_width: f32, mirror: bool) -> Self {
        Self {
            name: name.to_string(),
            theme: Theme {
                background,
                primary,
                sensitivity,
                line_width,
                mirror,
            },
        }
    }
}

pub struct PresetManager {
    presets: Vec<ThemePreset>,
    current_preset: usize,
}

impl Default for PresetManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PresetManager {
    pub fn new() -> Self {
        let presets = vec![
            ThemePreset::new("Classic", Rgb::BLACK, Rgb::new(0x00, 0xff, 0x88), 1.0, 2.0, false),
            ThemePreset::new("Amethyst", Rgb::new(0x0b, 0x06, 0x1a), Rgb::new(0x5e, 0xb3, 0xf6), 1.2, 2.0, false),
            ThemePreset::new("Neon", Rgb::new(0x05, 0x00, 0x10), Rgb::new(0xff, 0x2e, 0xc8), 1.5, 3.0, true),
            ThemePreset::new("Ember", Rgb::new(0x12, 0x05, 0x00), Rgb::new(0xff, 0x8c, 0x1a), 1.1, 2.5, false),
            ThemePreset::new("Mono", Rgb::new(0x10, 0x10, 0x10), Rgb::new(0xe0, 0xe0, 0xe0), 0.8, 1.5, true),
        ];

        Self {
            presets,
            current_preset: 0,
        }
    }

    pub fn current(&self) -> &ThemePreset {
        &self.presets[self.current_preset]
    }

    pub fn presets(&self) -> &[ThemePreset] {
        &self.presets
    }

    pub fn current_index(&self) -> usize {
        self.current_preset
    }

    /// Selects a preset by name, case-insensitively. Unknown names leave the selection alone.
    pub fn select(&mut self, name: &str) -> bool {
        match self.presets.iter().position(|p| p.name.eq_ignore_ascii_case(name)) {
            Some(index) => {
                self.current_preset = index;
                true
            }
            None => false,
        }
    }

    pub fn next(&mut self) -> &ThemePreset {
        self.current_preset = (self.current_preset + 1) % self.presets.len();
        self.current()
    }
}
