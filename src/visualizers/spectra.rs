use tiny_skia::{GradientStop, LinearGradient, Pixmap, Point, SpreadMode, Transform};

use super::{number, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::canvas;
use crate::spectrum::{compress_into, log_parabolic_resample_into, CompressorOptions};

// Stops used to approximate the power-curve fill falloff.
const FALLOFF_STOPS: usize = 6;

/// A smooth spectrum line over a log frequency axis with a fading fill beneath.
///
/// Frames are compressed harder than the default so a loud kick drum does not
/// flatten everything else, then resampled onto `binCount` log-spaced points.
pub struct Spectra {
    surface: SurfaceDescriptor,
    compressor: CompressorOptions,
    normalized: Vec<f32>,
    compressed: Vec<u8>,
    amplitudes: Vec<f32>,
    points: Vec<(f32, f32)>,
    line_thickness: f32,
    fill_opacity: f32,
    opacity_falloff: f32,
    bin_count: usize,
}

impl Default for Spectra {
    fn default() -> Self {
        Self::new()
    }
}

impl Spectra {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            compressor: CompressorOptions {
                threshold: 0.65,
                ratio: 6.0,
                bass_range: 0.15,
            },
            normalized: Vec::new(),
            compressed: Vec::new(),
            amplitudes: vec![0.0; 256],
            points: Vec::new(),
            line_thickness: 0.02,
            fill_opacity: 0.3,
            opacity_falloff: 2.0,
            bin_count: 256,
        }
    }

    fn wave_y(&self, amplitude: f32) -> f32 {
        let h = self.surface.height as f32;
        h * (1.0 - (0.5 + amplitude * 0.4))
    }

    fn fill_column(&self, pixmap: &mut Pixmap, x: f32, width: f32, top: f32) {
        let theme = self.surface.theme;
        let h = self.surface.height as f32;
        let opacity = (self.fill_opacity * theme.sensitivity).clamp(0.0, 1.0);
        if opacity <= 0.0 || top >= h {
            return;
        }

        let stops = (0..=FALLOFF_STOPS)
            .map(|s| {
                let d = s as f32 / FALLOFF_STOPS as f32;
                let alpha = opacity * (1.0 - d).powf(self.opacity_falloff);
                GradientStop::new(d, theme.primary.with_alpha(alpha))
            })
            .collect();
        let shader = LinearGradient::new(
            Point::from_xy(x, top),
            Point::from_xy(x, h),
            stops,
            SpreadMode::Pad,
            Transform::identity(),
        );

        let mut paint = canvas::solid(theme.primary.with_alpha(opacity));
        if let Some(shader) = shader {
            paint.shader = shader;
        }
        canvas::fill_rect(pixmap, x, top, width, h - top, &paint);
    }
}

impl Visualizer for Spectra {
    fn name(&self) -> &'static str {
        "Spectra"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
        self.amplitudes.resize(self.bin_count, 0.0);
        self.points.reserve(self.bin_count);
    }

    fn update(&mut self, _time_domain: &[u8], frequency: &[u8]) {
        if self.normalized.len() != frequency.len() {
            self.normalized.resize(frequency.len(), 0.0);
            self.compressed.resize(frequency.len(), 0);
        }
        compress_into(frequency, &self.compressor, &mut self.normalized);
        for (dst, &v) in self.compressed.iter_mut().zip(&self.normalized) {
            *dst = (v * 255.0).round() as u8;
        }
        log_parabolic_resample_into(&self.compressed, &mut self.amplitudes);
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        let theme = self.surface.theme;
        canvas::clear(pixmap, theme.background);

        let w = self.surface.width as f32;
        let count = self.amplitudes.len();
        if count == 0 {
            return Ok(());
        }
        let step = if count > 1 { w / (count - 1) as f32 } else { w };

        self.points.clear();
        for (i, &amp) in self.amplitudes.iter().enumerate() {
            self.points.push((i as f32 * step, self.wave_y(amp)));
        }
        for &(x, y) in &self.points {
            self.fill_column(pixmap, x - step / 2.0, step, y);
        }

        let line_width = self.line_thickness * 2.0 * self.surface.height as f32;
        canvas::polyline(pixmap, &self.points, &canvas::solid(theme.primary.opaque()), line_width, false);
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("lineThickness", "Line Thickness", 0.005, 0.05, 0.005, 0.02),
            SettingDef::range("fillOpacity", "Fill Opacity", 0.0, 1.0, 0.1, 0.3),
            SettingDef::range("opacityFalloff", "Opacity Falloff", 0.5, 4.0, 0.5, 2.0),
            SettingDef::range("binCount", "Frequency Bins", 64.0, 512.0, 32.0, 256.0).structural(),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        let v = number(value, key)?;
        match key {
            "lineThickness" => self.line_thickness = v,
            "fillOpacity" => self.fill_opacity = v,
            "opacityFalloff" => self.opacity_falloff = v,
            "binCount" => self.bin_count = v as usize,
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}
