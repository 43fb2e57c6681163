use tiny_skia::Pixmap;

use super::{FrameCopy, SurfaceDescriptor, Visualizer};
use crate::error::Result;
use crate::graphics::{canvas, Rgb};

const BAR_COUNT: usize = 128;

/// Rainbow bars over the lowest 128 bins.
pub struct FrequencyBars {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    palette: [Rgb; BAR_COUNT],
}

impl Default for FrequencyBars {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyBars {
    pub fn new() -> Self {
        let mut palette = [Rgb::BLACK; BAR_COUNT];
        for (i, colour) in palette.iter_mut().enumerate() {
            *colour = Rgb::from_hsl(i as f32 / BAR_COUNT as f32 * 360.0, 1.0, 0.5);
        }
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            palette,
        }
    }
}

impl Visualizer for FrequencyBars {
    fn name(&self) -> &'static str {
        "Frequency Bars"
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
        let bar_width = w / BAR_COUNT as f32;
        for (i, &value) in self.frame.frequency.iter().take(BAR_COUNT).enumerate() {
            let bar_height = value as f32 / 255.0 * h * theme.sensitivity;
            let paint = canvas::solid(self.palette[i].opaque());
            canvas::fill_rect(pixmap, i as f32 * bar_width, h - bar_height, bar_width - 1.0, bar_height, &paint);
        }
        Ok(())
    }
}
