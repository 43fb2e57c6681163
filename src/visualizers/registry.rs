use log::{error, info};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tiny_skia::Pixmap;

use super::{SettingValue, SurfaceDescriptor, Visualizer};
use crate::effects::Theme;
use crate::error::{Error, Result};

/// Owns the visualizer instances and tracks which one is on screen.
pub struct VisualizerRegistry {
    entries: Vec<Box<dyn Visualizer>>,
    active: Option<usize>,
    surface: Option<SurfaceDescriptor>,
    beat: f32,
}

impl Default for VisualizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualizerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            active: None,
            surface: None,
            beat: 0.0,
        }
    }

    /// Adds an instance. The first registration becomes active.
    pub fn register(&mut self, mut visualizer: Box<dyn Visualizer>) -> Result<()> {
        let name = visualizer.name();
        if self.position(name).is_some() {
            return Err(Error::AlreadyRegistered(name.to_string()));
        }
        if let Some(surface) = &self.surface {
            visualizer.init(surface);
        }
        self.entries.push(visualizer);
        if self.active.is_none() {
            self.active = Some(self.entries.len() - 1);
        }
        Ok(())
    }

    /// Switches the active visualizer. Unknown names leave the current one in place.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        let index = self
            .position(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.active = Some(index);
        info!("🎨 Visualizer: {}", self.entries[index].name());
        Ok(())
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.entries.iter().map(|v| v.name()).collect()
    }

    pub fn current(&self) -> Option<&dyn Visualizer> {
        self.active.map(|i| self.entries[i].as_ref())
    }

    pub fn current_name(&self) -> Option<&'static str> {
        self.current().map(|v| v.name())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Visualizer> {
        self.position(name).map(|i| self.entries[i].as_ref())
    }

    pub fn surface(&self) -> Option<&SurfaceDescriptor> {
        self.surface.as_ref()
    }

    /// Initializes every instance against a new surface.
    pub fn init(&mut self, surface: SurfaceDescriptor) {
        for visualizer in &mut self.entries {
            visualizer.init(&surface);
        }
        self.surface = Some(surface);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let theme = self.surface.map(|s| s.theme).unwrap_or_default();
        self.init(SurfaceDescriptor::new(width, height, theme));
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if let Some(surface) = self.surface {
            self.init(SurfaceDescriptor { theme, ..surface });
        } else {
            self.surface = Some(SurfaceDescriptor::new(0, 0, theme));
        }
    }

    pub fn theme(&self) -> Theme {
        self.surface.map(|s| s.theme).unwrap_or_default()
    }

    pub fn set_beat(&mut self, envelope: f32) {
        self.beat = envelope;
    }

    pub fn beat(&self) -> f32 {
        self.beat
    }

    /// Feeds one spectral frame to the active visualizer.
    pub fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        let beat = self.beat;
        if let Some(visualizer) = self.active_mut() {
            visualizer.set_beat(beat);
            visualizer.update(time_domain, frequency);
        }
    }

    /// Draws the active visualizer. Errors and panics are logged and the frame is skipped.
    pub fn draw(&mut self, pixmap: &mut Pixmap) -> bool {
        let Some(visualizer) = self.active_mut() else {
            return false;
        };
        let name = visualizer.name();
        match catch_unwind(AssertUnwindSafe(|| visualizer.draw(pixmap))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Visualizer '{}' failed to draw: {}", name, e);
                false
            }
            Err(_) => {
                error!("Visualizer '{}' panicked while drawing", name);
                false
            }
        }
    }

    /// Validates `value` against the named visualizer's schema and applies it.
    ///
    /// Returns the value actually applied after clamping. Structural settings
    /// re-initialize the instance.
    pub fn apply_setting(&mut self, name: &str, key: &str, value: &SettingValue) -> Result<SettingValue> {
        let index = self
            .position(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let surface = self.surface;
        let visualizer = &mut self.entries[index];

        let def = visualizer
            .settings_schema()
            .into_iter()
            .find(|d| d.key == key)
            .ok_or_else(|| Error::invalid_setting(key, format!("{} has no such setting", name)))?;
        let value = def.validate(value)?;
        visualizer.apply_setting(key, &value)?;

        if def.structural {
            if let Some(surface) = &surface {
                visualizer.init(surface);
            }
        }
        Ok(value)
    }

    fn active_mut(&mut self) -> Option<&mut Box<dyn Visualizer>> {
        let index = self.active?;
        self.entries.get_mut(index)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|v| v.name() == name)
    }
}
