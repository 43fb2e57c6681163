use glam::{Quat, Vec3};
use std::f32::consts::{PI, TAU};
use tiny_skia::Pixmap;

use super::{number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::{canvas, Camera};

const SEGMENTS: usize = 64;
const RADIUS: f32 = 1.5;
const SPHERE_RADIUS: f32 = 0.15;
const RUNG_EVERY: usize = 4;

/// A rotating double helix whose nodes swell with the spectrum.
pub struct DnaHelix {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    camera: Camera,
    // Unrotated node positions, both strands interleaved.
    nodes: Vec<Vec3>,
    rotation: f32,
    speed: f32,
    height: f32,
}

impl Default for DnaHelix {
    fn default() -> Self {
        Self::new()
    }
}

impl DnaHelix {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            camera: Camera::new(Vec3::new(0.0, 0.0, 8.0), 60.0, 1, 1),
            nodes: Vec::new(),
            rotation: 0.0,
            speed: 1.0,
            height: 4.0,
        }
    }

    fn build_nodes(&mut self) {
        self.nodes.clear();
        for i in 0..SEGMENTS {
            let t = i as f32 / SEGMENTS as f32;
            let angle = t * 2.0 * TAU;
            let y = (t - 0.5) * self.height;
            for strand in [0.0, PI] {
                let (sin, cos) = (angle + strand).sin_cos();
                self.nodes.push(Vec3::new(cos * RADIUS, y, sin * RADIUS));
            }
        }
    }
}

impl Visualizer for DnaHelix {
    fn name(&self) -> &'static str {
        "DNA Helix"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
        self.camera = Camera::new(Vec3::new(0.0, 0.0, 8.0), 60.0, surface.width, surface.height);
        self.build_nodes();
    }

    fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        self.frame.copy_from(time_domain, frequency);
        self.rotation += 0.01 * self.speed;
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        let theme = self.surface.theme;
        canvas::clear(pixmap, theme.background);

        let spin = Quat::from_rotation_y(self.rotation);
        let rung_paint = canvas::solid(theme.primary.with_alpha(0.6));

        for (i, pair) in self.nodes.chunks_exact(2).enumerate() {
            if i % RUNG_EVERY != 0 {
                continue;
            }
            let a = self.camera.project(spin * pair[0]);
            let b = self.camera.project(spin * pair[1]);
            if let (Some((ax, ay, _)), Some((bx, by, _))) = (a, b) {
                canvas::line(pixmap, (ax, ay), (bx, by), &rung_paint, theme.line_width);
            }
        }

        let bins = &self.frame.frequency;
        let total = self.nodes.len();
        for (i, &node) in self.nodes.iter().enumerate() {
            let intensity = if bins.is_empty() {
                0.0
            } else {
                bins[i * bins.len() / total] as f32 / 255.0
            };
            let Some((x, y, scale)) = self.camera.project(spin * node) else {
                continue;
            };
            let radius = SPHERE_RADIUS * (1.0 + intensity * 0.5) * scale;
            let colour = theme.primary.lerp(crate::graphics::Rgb::WHITE, intensity * 0.5);
            canvas::fill_circle(pixmap, x, y, radius, &canvas::solid(colour.opaque()));
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("helixSpeed", "Rotation Speed", 0.0, 3.0, 0.1, 1.0),
            SettingDef::range("helixHeight", "Helix Height", 2.0, 8.0, 0.5, 4.0).structural(),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        let v = number(value, key)?;
        match key {
            "helixSpeed" => self.speed = v,
            "helixHeight" => self.height = v,
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}
