use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use tiny_skia::Pixmap;

use super::{band_energy, number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::{canvas, Camera, Rgb};

const SHAPES: &[&str] = &["sphere", "cube", "cone", "torus"];
const PARTICLES_PER_LEVEL: usize = 50;
const INNER_RADIUS: f32 = 2.0;
const PARTICLE_RADIUS: f32 = 0.1;
const TIME_STEP: f32 = 0.016;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Sphere,
    Cube,
    Cone,
    Torus,
}

impl Shape {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "sphere" => Some(Shape::Sphere),
            "cube" => Some(Shape::Cube),
            "cone" => Some(Shape::Cone),
            "torus" => Some(Shape::Torus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Seed {
    base: Vec3,
    angle: f32,
    phase: f32,
}

/// Arm of particles mirrored around the centre `segments` times.
///
/// Every copy shares the same seeds; only the rotation about the view axis
/// differs, so the pattern stays symmetric whatever the spectrum does.
pub struct Kaleidoscope {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    camera: Camera,
    rng: StdRng,
    seeds: Vec<Seed>,
    outline: Vec<(f32, f32)>,
    rotation: f32,
    time: f32,
    segments: usize,
    complexity: usize,
    rotation_speed: f32,
    particle_size: f32,
    depth: f32,
    spread: f32,
    pulse_intensity: f32,
    shape: Shape,
    bloom_intensity: f32,
    trail_length: f32,
}

impl Default for Kaleidoscope {
    fn default() -> Self {
        Self::new()
    }
}

impl Kaleidoscope {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            frame: FrameCopy::default(),
            camera: Camera::new(Vec3::new(0.0, 0.0, 15.0), 60.0, 1, 1),
            rng,
            seeds: Vec::new(),
            outline: Vec::with_capacity(12),
            rotation: 0.0,
            time: 0.0,
            segments: 8,
            complexity: 3,
            rotation_speed: 1.0,
            particle_size: 1.0,
            depth: 2.0,
            spread: 8.0,
            pulse_intensity: 1.0,
            shape: Shape::Sphere,
            bloom_intensity: 0.5,
            trail_length: 0.0,
        }
    }

    fn build_seeds(&mut self) {
        let count = PARTICLES_PER_LEVEL * self.complexity;
        let rng = &mut self.rng;
        let (depth, spread) = (self.depth, self.spread);
        self.seeds = (0..count)
            .map(|i| {
                let t = i as f32 / count as f32;
                let angle = t * TAU;
                let radius = INNER_RADIUS + t * spread;
                let z = if depth > 0.0 { rng.gen_range(-0.5..0.5) * depth } else { 0.0 };
                Seed {
                    base: Vec3::new(angle.cos() * radius, angle.sin() * radius, z),
                    angle,
                    phase: rng.gen_range(0.0..TAU),
                }
            })
            .collect();
    }

    fn intensity(&self, index: usize) -> f32 {
        let bins = &self.frame.frequency;
        if bins.is_empty() {
            return 0.0;
        }
        bins[index * bins.len() / self.seeds.len().max(1)] as f32 / 255.0
    }

    /// Particle position and size in world units before the segment rotation.
    fn place(&self, index: usize) -> (Vec3, f32) {
        let seed = self.seeds[index];
        let intensity = self.intensity(index);
        let sensitivity = self.surface.theme.sensitivity;

        let pulse = (self.time * 2.0 + seed.phase).sin() * 0.2 + 1.0;
        let scale = self.particle_size * (0.5 + intensity * 1.5 * sensitivity * self.pulse_intensity) * pulse;

        let push = 1.0 + intensity * 0.5 * self.pulse_intensity;
        let wave = (self.time + seed.angle * 2.0).sin() * 0.5 * intensity;
        let position = Vec3::new(seed.base.x * push, seed.base.y * push, seed.base.z + wave);
        (position, PARTICLE_RADIUS * scale)
    }

    fn draw_particle(&mut self, pixmap: &mut Pixmap, x: f32, y: f32, radius: f32, colour: Rgb, spin: f32) {
        let paint = canvas::solid(colour.opaque());
        match self.shape {
            Shape::Sphere => canvas::fill_circle(pixmap, x, y, radius, &paint),
            Shape::Torus => {
                self.regular(x, y, radius * 0.8, 12, spin);
                canvas::polyline(pixmap, &self.outline, &paint, (radius * 0.6).max(1.0), true);
            }
            Shape::Cube => {
                self.regular(x, y, radius * 1.5, 4, spin);
                canvas::fill_polygon(pixmap, &self.outline, &paint);
            }
            Shape::Cone => {
                self.regular(x, y, radius * 1.5, 3, spin);
                canvas::fill_polygon(pixmap, &self.outline, &paint);
            }
        }
    }

    fn regular(&mut self, x: f32, y: f32, radius: f32, sides: usize, spin: f32) {
        self.outline.clear();
        self.outline.extend((0..sides).map(|k| {
            let a = spin + k as f32 / sides as f32 * TAU;
            (x + a.cos() * radius, y + a.sin() * radius)
        }));
    }
}

impl Visualizer for Kaleidoscope {
    fn name(&self) -> &'static str {
        "Kaleidoscope"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
        self.camera = Camera::new(Vec3::new(0.0, 0.0, 15.0), 60.0, surface.width, surface.height);
        self.build_seeds();
    }

    fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        self.frame.copy_from(time_domain, frequency);
        self.rotation += 0.01 * self.rotation_speed;
        self.time += TIME_STEP;
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        let theme = self.surface.theme;
        if self.trail_length > 0.0 {
            let alpha = (1.0 - self.trail_length / 21.0).max(0.02);
            canvas::fade(pixmap, theme.background, alpha);
        } else {
            canvas::clear(pixmap, theme.background);
        }

        let glow = band_energy(&self.frame.frequency, 0, 32);
        for index in 0..self.seeds.len() {
            let (position, size) = self.place(index);
            let intensity = self.intensity(index);
            let emissive = (intensity * (0.5 + self.bloom_intensity)).min(1.0);
            let colour = theme.primary.lerp(Rgb::WHITE, emissive * 0.5);
            let spin = if self.shape == Shape::Sphere {
                0.0
            } else {
                self.time + self.seeds[index].angle
            };

            for segment in 0..self.segments {
                let turn = TAU * segment as f32 / self.segments as f32 + self.rotation;
                let Some((x, y, scale)) = self.camera.project(Quat::from_rotation_z(turn) * position) else {
                    continue;
                };
                let radius = size * scale;
                if self.bloom_intensity > 0.0 && glow > 0.0 {
                    let halo = canvas::solid(colour.with_alpha(0.15 * self.bloom_intensity.min(1.0) * glow));
                    canvas::fill_circle(pixmap, x, y, radius * 2.5, &halo);
                }
                self.draw_particle(pixmap, x, y, radius, colour, spin);
            }
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("segments", "Segments", 4.0, 16.0, 1.0, 8.0),
            SettingDef::range("complexity", "Complexity", 1.0, 5.0, 1.0, 3.0).structural(),
            SettingDef::range("rotationSpeed", "Rotation Speed", 0.0, 3.0, 0.1, 1.0),
            SettingDef::range("particleSize", "Particle Size", 0.5, 2.0, 0.1, 1.0),
            SettingDef::range("depth", "Depth", 0.0, 5.0, 0.5, 2.0).structural(),
            SettingDef::range("spread", "Spread", 4.0, 15.0, 0.5, 8.0).structural(),
            SettingDef::range("pulseIntensity", "Pulse Intensity", 0.0, 2.0, 0.1, 1.0),
            SettingDef::select("particleShape", "Particle Shape", SHAPES, "sphere"),
            SettingDef::range("bloomIntensity", "Bloom Intensity", 0.0, 2.0, 0.1, 0.5),
            SettingDef::range("trailLength", "Trail Length", 0.0, 20.0, 1.0, 0.0),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        if key == "particleShape" {
            self.shape = value
                .as_str()
                .and_then(Shape::parse)
                .ok_or_else(|| Error::invalid_setting(key, "expected a particle shape"))?;
            return Ok(());
        }
        let v = number(value, key)?;
        match key {
            "segments" => self.segments = (v as usize).max(1),
            "complexity" => self.complexity = (v as usize).max(1),
            "rotationSpeed" => self.rotation_speed = v,
            "particleSize" => self.particle_size = v,
            "depth" => self.depth = v,
            "spread" => self.spread = v,
            "pulseIntensity" => self.pulse_intensity = v,
            "bloomIntensity" => self.bloom_intensity = v,
            "trailLength" => self.trail_length = v,
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizers::testing;

    fn kaleidoscope() -> Kaleidoscope {
        let mut k = Kaleidoscope::with_seed(7);
        k.init(&testing::surface());
        k
    }

    #[test]
    fn test_complexity_sets_particle_count() {
        let mut k = kaleidoscope();
        assert_eq!(k.seeds.len(), 150);

        k.apply_setting("complexity", &SettingValue::Number(5.0)).unwrap();
        k.init(&testing::surface());
        assert_eq!(k.seeds.len(), 250);
    }

    #[test]
    fn test_flat_depth_keeps_arm_in_plane() {
        let mut k = Kaleidoscope::with_seed(3);
        k.apply_setting("depth", &SettingValue::Number(0.0)).unwrap();
        k.init(&testing::surface());
        assert!(k.seeds.iter().all(|s| s.base.z == 0.0));
        // The arm spirals outward from the inner ring to inner ring + spread.
        assert_eq!(k.seeds[0].base.length(), INNER_RADIUS);
        assert!(k.seeds.last().unwrap().base.length() < INNER_RADIUS + k.spread);
    }

    #[test]
    fn test_loud_bins_push_particles_outward() {
        let mut k = kaleidoscope();
        k.update(&[128; 64], &[0; 64]);
        let (quiet, quiet_size) = k.place(10);
        k.update(&[128; 64], &[255; 64]);
        let (loud, loud_size) = k.place(10);

        let outward = |p: Vec3| Vec3::new(p.x, p.y, 0.0).length();
        assert!(outward(loud) > outward(quiet));
        assert!(loud_size > quiet_size);
    }

    #[test]
    fn test_segments_rotate_copies() {
        let mut k = kaleidoscope();
        k.apply_setting("segments", &SettingValue::Number(4.0)).unwrap();
        assert_eq!(k.segments, 4);
        assert!(k.apply_setting("particleShape", &SettingValue::Text("cube".into())).is_ok());
        assert_eq!(k.shape, Shape::Cube);
        assert!(k.apply_setting("particleShape", &SettingValue::Text("plaid".into())).is_err());
        assert!(k.apply_setting("segments", &SettingValue::Bool(true)).is_err());
    }

    #[test]
    fn test_every_shape_draws() {
        for shape in SHAPES {
            let mut k = Kaleidoscope::with_seed(11);
            k.apply_setting("particleShape", &SettingValue::Text(shape.to_string())).unwrap();
            assert!(testing::renders_something(&mut k), "{shape} drew nothing");
        }
    }
}
