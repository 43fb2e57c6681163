use tiny_skia::Pixmap;

use super::{number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::canvas;

const BAR_COUNT: usize = 64;
const STYLES: &[&str] = &["solid", "gradient", "glow"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarStyle {
    Solid,
    Gradient,
    Glow,
}

/// Classic analyzer: 64 bars with a configurable gap and fill.
pub struct Spectrum {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    bar_gap: f32,
    style: BarStyle,
}

impl Default for Spectrum {
    fn default() -> Self {
        Self::new()
    }
}

impl Spectrum {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            bar_gap: 2.0,
            style: BarStyle::Gradient,
        }
    }
}

impl Visualizer for Spectrum {
    fn name(&self) -> &'static str {
        "Spectrum"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
    }

    fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        self.frame.copy_from(time_domain, frequency);
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        let theme = self.surface.theme;
        canvas::clear(pixmap, theme.background);

        let (w, h) = (self.surface.width as f32, self.surface.height as f32);
        let bar_width = (w / BAR_COUNT as f32 - self.bar_gap).max(1.0);

        for (i, &value) in self.frame.frequency.iter().take(BAR_COUNT).enumerate() {
            let bar_height = value as f32 / 255.0 * h * theme.sensitivity;
            let x = i as f32 * (bar_width + self.bar_gap);
            let y = h - bar_height;

            match self.style {
                BarStyle::Solid => {
                    canvas::fill_rect(pixmap, x, y, bar_width, bar_height, &canvas::solid(theme.primary.opaque()));
                }
                BarStyle::Gradient => {
                    let mut paint = canvas::solid(theme.primary.opaque());
                    if let Some(shader) =
                        canvas::vertical_gradient(theme.primary.opaque(), theme.background.opaque(), x, y, h)
                    {
                        paint.shader = shader;
                    }
                    canvas::fill_rect(pixmap, x, y, bar_width, bar_height, &paint);
                }
                BarStyle::Glow => {
                    // Soft halo first, then the bar itself.
                    let halo = canvas::solid(theme.primary.with_alpha(0.25));
                    canvas::fill_rect(pixmap, x - 3.0, y - 3.0, bar_width + 6.0, bar_height + 3.0, &halo);
                    canvas::fill_rect(pixmap, x, y, bar_width, bar_height, &canvas::solid(theme.primary.opaque()));
                }
            }
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("barGap", "Bar Gap", 0.0, 10.0, 1.0, 2.0),
            SettingDef::select("barStyle", "Bar Style", STYLES, "gradient"),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        match key {
            "barGap" => self.bar_gap = number(value, key)?,
            "barStyle" => {
                self.style = match value.as_str() {
                    Some("solid") => BarStyle::Solid,
                    Some("gradient") => BarStyle::Gradient,
                    Some("glow") => BarStyle::Glow,
                    _ => return Err(Error::invalid_setting(key, "unknown bar style")),
                }
            }
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}
