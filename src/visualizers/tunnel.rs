use glam::Vec3;
use std::f32::consts::TAU;
use tiny_skia::Pixmap;

use super::{band_energy, number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::{canvas, Camera};

const RING_COUNT: usize = 30;
const RING_RADIUS: f32 = 3.0;
const RING_SPACING: f32 = 2.0;
const RECYCLE_Z: f32 = 2.0;
const FOG_NEAR: f32 = 5.0;
const FOG_FAR: f32 = 20.0;

/// Wireframe rings flying towards the camera, pulsing with the spectrum.
pub struct Tunnel {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    camera: Camera,
    ring_z: Vec<f32>,
    outline: Vec<(f32, f32)>,
    time: f32,
    speed: f32,
    segments: usize,
}

impl Default for Tunnel {
    fn default() -> Self {
        Self::new()
    }
}

impl Tunnel {
    pub fn new() -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            camera: Camera::looking_at(Vec3::ZERO, Vec3::NEG_Z, 75.0, 1, 1),
            ring_z: Vec::new(),
            outline: Vec::new(),
            time: 0.0,
            speed: 1.0,
            segments: 32,
        }
    }

    fn fog(depth: f32) -> f32 {
        1.0 - ((depth - FOG_NEAR) / (FOG_FAR - FOG_NEAR)).clamp(0.0, 1.0)
    }
}

impl Visualizer for Tunnel {
    fn name(&self) -> &'static str {
        "Tunnel"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
        self.camera = Camera::looking_at(Vec3::ZERO, Vec3::NEG_Z, 75.0, surface.width, surface.height);
        self.ring_z = (0..RING_COUNT).map(|i| -(i as f32) * RING_SPACING).collect();
        self.outline = Vec::with_capacity(self.segments + 1);
    }

    fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        self.frame.copy_from(time_domain, frequency);
        self.time += 0.05 * self.speed;

        let push = 0.1 * self.speed * (1.0 + band_energy(frequency, 0, 64));
        let far = -(RING_COUNT as f32 * RING_SPACING - RECYCLE_Z);
        for z in &mut self.ring_z {
            *z += push;
            if *z > RECYCLE_Z {
                *z = far;
            }
        }
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        let theme = self.surface.theme;
        canvas::clear(pixmap, theme.background);

        let bins = &self.frame.frequency;
        for (i, &z) in self.ring_z.iter().enumerate() {
            let intensity = if bins.is_empty() {
                0.0
            } else {
                bins[i * bins.len() / RING_COUNT] as f32 / 255.0
            };
            let scale = 1.0 + intensity * 0.5 * theme.sensitivity;
            let rotation = self.time + i as f32 * 0.1;

            self.outline.clear();
            for s in 0..=self.segments {
                let angle = s as f32 / self.segments as f32 * TAU + rotation;
                let point = Vec3::new(angle.cos() * RING_RADIUS * scale, angle.sin() * RING_RADIUS * scale, z);
                match self.camera.project(point) {
                    Some((x, y, _)) => self.outline.push((x, y)),
                    None => break,
                }
            }
            if self.outline.len() <= self.segments {
                continue;
            }

            let alpha = Self::fog(-z);
            if alpha <= 0.0 {
                continue;
            }
            let paint = canvas::solid(theme.primary.with_alpha(alpha));
            canvas::polyline(pixmap, &self.outline, &paint, theme.line_width, false);
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("tunnelSpeed", "Speed", 0.1, 3.0, 0.1, 1.0),
            SettingDef::range("segments", "Ring Segments", 16.0, 64.0, 8.0, 32.0).structural(),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        let v = number(value, key)?;
        match key {
            "tunnelSpeed" => self.speed = v,
            "segments" => self.segments = v as usize,
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizers::testing;

    #[test]
    fn test_rings_recycle_behind_the_camera() {
        let mut tunnel = Tunnel::new();
        tunnel.init(&testing::surface());
        for _ in 0..1000 {
            tunnel.update(&[128; 128], &[255; 128]);
        }
        assert_eq!(tunnel.ring_z.len(), RING_COUNT);
        assert!(tunnel.ring_z.iter().all(|&z| z <= RECYCLE_Z && z >= -60.0));
    }

    #[test]
    fn test_fog_fades_distant_rings() {
        assert_eq!(Tunnel::fog(1.0), 1.0);
        assert_eq!(Tunnel::fog(30.0), 0.0);
        assert!(Tunnel::fog(12.5) > 0.0 && Tunnel::fog(12.5) < 1.0);
    }
}
