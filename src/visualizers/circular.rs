use std::f32::consts::{FRAC_PI_2, TAU};
use tiny_skia::Pixmap;

use super::{FrameCopy, SurfaceDescriptor, Visualizer};
use crate::error::Result;
use crate::graphics::canvas;

const MARGIN: f32 = 50.0;
const AMPLITUDE: f32 = 100.0;

/// The time-domain signal wrapped around a circle.
///
/// With the theme's mirror effect on, three flipped copies turned a quarter
/// turn apart fade in behind the main ring.
pub struct Circular {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    points: Vec<(f32, f32)>,
}

impl Default for Circular {
    fn default() -> Self {
        Self::new()
    }
}

impl Circular {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            points: Vec::new(),
        }
    }

    fn radius(&self) -> f32 {
        let (cx, cy) = self.surface.center();
        let half = cx.min(cy);
        (half - MARGIN).max(half * 0.25)
    }

    /// Ring for copy `turn`: copy 0 is the plain trace, later copies are
    /// mirrored across the x axis and rotated by `turn` quarter turns.
    fn ring(&mut self, turn: usize) {
        let (cx, cy) = self.surface.center();
        let radius = self.radius();
        let sensitivity = self.surface.theme.sensitivity;
        let samples = &self.frame.time_domain;
        let slice = TAU / samples.len().max(1) as f32;

        self.points.clear();
        self.points.extend(samples.iter().enumerate().map(|(i, &s)| {
            let r = radius + (s as f32 / 255.0 - 0.5) * AMPLITUDE * sensitivity;
            let angle = if turn == 0 {
                slice * i as f32
            } else {
                turn as f32 * FRAC_PI_2 - slice * i as f32
            };
            (cx + r * angle.cos(), cy + r * angle.sin())
        }));
    }
}

impl Visualizer for Circular {
    fn name(&self) -> &'static str {
        "Circular"
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

        self.ring(0);
        canvas::polyline(pixmap, &self.points, &canvas::solid(theme.primary.opaque()), theme.line_width, true);

        if theme.mirror {
            for turn in 1..=3 {
                self.ring(turn);
                let paint = canvas::solid(theme.primary.with_alpha(0.8 - turn as f32 * 0.15));
                canvas::polyline(pixmap, &self.points, &paint, theme.line_width, true);
            }
        }
        Ok(())
    }
}
