use tiny_skia::Pixmap;

use super::{flag, number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::{canvas, Rgb};

const GRID: Rgb = Rgb::new(0x33, 0x33, 0x33);
const GRID_ROWS: usize = 4;
const GRID_COLUMNS: usize = 8;

/// Bench-scope trace of the time-domain signal over an optional graticule.
pub struct Oscilloscope {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    points: Vec<(f32, f32)>,
    grid_lines: bool,
    thickness: f32,
}

impl Default for Oscilloscope {
    fn default() -> Self {
        Self::new()
    }
}

impl Oscilloscope {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            points: Vec::new(),
            grid_lines: true,
            thickness: 2.0,
        }
    }

    fn trace(&mut self) {
        let (w, h) = (self.surface.width as f32, self.surface.height as f32);
        let samples = &self.frame.time_domain;
        let slice = w / samples.len().max(1) as f32;

        self.points.clear();
        self.points
            .extend(samples.iter().enumerate().map(|(i, &s)| (i as f32 * slice, s as f32 / 255.0 * h)));
    }

    fn draw_grid(&self, pixmap: &mut Pixmap) {
        let (w, h) = (self.surface.width as f32, self.surface.height as f32);
        let paint = canvas::solid(GRID.opaque());
        for row in 0..=GRID_ROWS {
            let y = h / GRID_ROWS as f32 * row as f32;
            canvas::line(pixmap, (0.0, y), (w, y), &paint, 1.0);
        }
        for column in 0..=GRID_COLUMNS {
            let x = w / GRID_COLUMNS as f32 * column as f32;
            canvas::line(pixmap, (x, 0.0), (x, h), &paint, 1.0);
        }
    }
}

impl Visualizer for Oscilloscope {
    fn name(&self) -> &'static str {
        "Oscilloscope"
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
        if self.grid_lines {
            self.draw_grid(pixmap);
        }

        self.trace();
        canvas::polyline(pixmap, &self.points, &canvas::solid(theme.primary.opaque()), self.thickness, false);
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::toggle("gridLines", "Grid Lines", true),
            SettingDef::range("thickness", "Line Thickness", 1.0, 5.0, 1.0, 2.0),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        match key {
            "gridLines" => self.grid_lines = flag(value, key)?,
            "thickness" => self.thickness = number(value, key)?,
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}
