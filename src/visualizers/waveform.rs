use tiny_skia::Pixmap;

use super::{FrameCopy, SurfaceDescriptor, Visualizer};
use crate::error::Result;
use crate::graphics::canvas;

/// Oscilloscope trace of the time-domain signal.
pub struct Waveform {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    points: Vec<(f32, f32)>,
}

impl Default for Waveform {
    fn default() -> Self {
        Self::new()
    }
}

impl Waveform {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            points: Vec::new(),
        }
    }

    fn trace(&mut self, flip: bool) {
        let (w, h) = (self.surface.width as f32, self.surface.height as f32);
        let samples = &self.frame.time_domain;
        let slice = w / samples.len().max(1) as f32;
        let sensitivity = self.surface.theme.sensitivity;

        self.points.clear();
        for (i, &sample) in samples.iter().enumerate() {
            let y = sample as f32 / 255.0 * h * sensitivity;
            self.points.push((i as f32 * slice, if flip { h - y } else { y }));
        }
        self.points.push((w, h / 2.0));
    }
}

impl Visualizer for Waveform {
    fn name(&self) -> &'static str {
        "Waveform"
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
        if self.frame.time_domain.is_empty() {
            return Ok(());
        }

        self.trace(false);
        canvas::polyline(pixmap, &self.points, &canvas::solid(theme.primary.opaque()), theme.line_width, false);

        if theme.mirror {
            self.trace(true);
            let paint = canvas::solid(theme.primary.with_alpha(0.5));
            canvas::polyline(pixmap, &self.points, &paint, theme.line_width, false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizers::testing;

    #[test]
    fn test_trace_follows_samples() {
        let mut waveform = Waveform::new();
        waveform.init(&testing::surface());
        waveform.update(&[0, 255], &[0, 0]);
        waveform.trace(false);
        assert_eq!(waveform.points, vec![(0.0, 0.0), (80.0, 120.0), (160.0, 60.0)]);

        waveform.trace(true);
        assert_eq!(waveform.points[0], (0.0, 120.0));
    }

    #[test]
    fn test_empty_frame_only_clears() {
        let mut waveform = Waveform::new();
        waveform.init(&testing::surface());
        let mut pixmap = Pixmap::new(160, 120).unwrap();
        waveform.draw(&mut pixmap).unwrap();
        assert!(pixmap.pixels().iter().all(|p| p.red() == 0 && p.green() == 0 && p.alpha() == 255));
    }
}
