use std::f32::consts::TAU;
use tiny_skia::Pixmap;

use super::{number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::canvas;

/// Bars radiating from a ring, over a selectable slice of the spectrum.
pub struct RadialBars {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    bar_count: usize,
    rotation_degrees: f32,
    freq_start: f32,
    freq_end: f32,
}

impl Default for RadialBars {
    fn default() -> Self {
        Self::new()
    }
}

impl RadialBars {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            bar_count: 64,
            rotation_degrees: 0.0,
            freq_start: 0.0,
            freq_end: 100.0,
        }
    }

    /// Start and end as bin indices; empty when the slice has no width.
    fn bin_range(&self) -> Option<(usize, usize)> {
        let len = self.frame.frequency.len() as f32;
        let start = (self.freq_start / 100.0 * len).floor() as usize;
        let end = (self.freq_end / 100.0 * len).floor() as usize;
        (end > start).then_some((start, end))
    }

    fn draw_ring(&self, pixmap: &mut Pixmap, inward: bool, alpha: f32) {
        let Some((start, end)) = self.bin_range() else {
            return;
        };
        let theme = self.surface.theme;
        let (cx, cy) = self.surface.center();
        let radius = cx.min(cy) * 0.3;
        let paint = canvas::solid(theme.primary.with_alpha(alpha));
        let rotation = self.rotation_degrees.to_radians();

        for i in 0..self.bar_count {
            let t = i as f32 / self.bar_count as f32;
            let angle = t * TAU + rotation;
            let bin = (start + (t * (end - start) as f32) as usize).min(end - 1);
            let mut bar = self.frame.frequency[bin] as f32 / 255.0 * radius * theme.sensitivity;
            if inward {
                bar = -bar * 0.7;
            }

            let (sin, cos) = angle.sin_cos();
            let from = (cx + cos * radius, cy + sin * radius);
            let to = (cx + cos * (radius + bar), cy + sin * (radius + bar));
            canvas::line(pixmap, from, to, &paint, theme.line_width);
        }
    }
}

impl Visualizer for RadialBars {
    fn name(&self) -> &'static str {
        "Radial Bars"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
    }

    fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        self.frame.copy_from(time_domain, frequency);
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        canvas::clear(pixmap, self.surface.theme.background);
        self.draw_ring(pixmap, false, 1.0);
        if self.surface.theme.mirror {
            self.draw_ring(pixmap, true, 0.5);
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("barCount", "Bar Count", 32.0, 128.0, 1.0, 64.0),
            SettingDef::range("rotation", "Rotation", 0.0, 360.0, 1.0, 0.0),
            SettingDef::range("freqStart", "Frequency Start %", 0.0, 100.0, 1.0, 0.0),
            SettingDef::range("freqEnd", "Frequency End %", 0.0, 100.0, 1.0, 100.0),
        ]
    }

    /// Start and end push each other apart so the slice is never empty.
    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        let v = number(value, key)?;
        match key {
            "barCount" => self.bar_count = v as usize,
            "rotation" => self.rotation_degrees = v,
            "freqStart" => {
                self.freq_start = v;
                if v >= self.freq_end {
                    self.freq_end = (v + 1.0).min(100.0);
                }
            }
            "freqEnd" => {
                self.freq_end = v;
                if v <= self.freq_start {
                    self.freq_start = (v - 1.0).max(0.0);
                }
            }
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}
