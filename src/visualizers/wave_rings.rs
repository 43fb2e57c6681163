use std::f32::consts::TAU;
use tiny_skia::Pixmap;

use super::{number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::canvas;

const POINTS_PER_RING: usize = 100;

/// Concentric rings displaced by the waveform.
pub struct WaveRings {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    points: Vec<(f32, f32)>,
    ring_count: usize,
    ring_spacing: f32,
}

impl Default for WaveRings {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveRings {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            points: Vec::with_capacity(POINTS_PER_RING + 1),
            ring_count: 5,
            ring_spacing: 30.0,
        }
    }

    fn ring_points(&mut self, ring: usize, scale: f32, inverted: bool) {
        let (cx, cy) = self.surface.center();
        let base = (ring + 1) as f32 * self.ring_spacing;
        let samples = &self.frame.time_domain;
        let sensitivity = self.surface.theme.sensitivity;

        self.points.clear();
        for i in 0..=POINTS_PER_RING {
            let t = i as f32 / POINTS_PER_RING as f32;
            let index = ((t * samples.len() as f32) as usize).min(samples.len().saturating_sub(1));
            let sample = samples.get(index).copied().unwrap_or(128);
            let mut amplitude = (sample as f32 / 255.0 - 0.5) * 50.0 * sensitivity * scale;
            if inverted {
                amplitude = -amplitude;
            }
            let (sin, cos) = (t * TAU).sin_cos();
            self.points.push((cx + cos * (base + amplitude), cy + sin * (base + amplitude)));
        }
    }

    fn draw_rings(&mut self, pixmap: &mut Pixmap, scale: f32, inverted: bool) {
        let theme = self.surface.theme;
        for ring in 0..self.ring_count {
            let fade = 1.0 - ring as f32 / self.ring_count as f32 * 0.5;
            let alpha = if inverted { fade * 0.5 } else { fade };
            self.ring_points(ring, scale, inverted);
            let paint = canvas::solid(theme.primary.with_alpha(alpha));
            canvas::polyline(pixmap, &self.points, &paint, theme.line_width, true);
        }
    }
}

impl Visualizer for WaveRings {
    fn name(&self) -> &'static str {
        "Wave Rings"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
    }

    fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        self.frame.copy_from(time_domain, frequency);
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        canvas::clear(pixmap, self.surface.theme.background);
        self.draw_rings(pixmap, 1.0, false);
        if self.surface.theme.mirror {
            self.draw_rings(pixmap, 0.6, true);
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("ringCount", "Ring Count", 3.0, 10.0, 1.0, 5.0),
            SettingDef::range("ringSpacing", "Ring Spacing", 20.0, 60.0, 1.0, 30.0),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        let v = number(value, key)?;
        match key {
            "ringCount" => self.ring_count = v as usize,
            "ringSpacing" => self.ring_spacing = v,
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}
