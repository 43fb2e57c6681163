use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiny_skia::Pixmap;

use super::{band_energy, number, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::canvas;

#[derive(Debug, Clone, Copy)]
struct Particle {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    size: f32,
    base_speed: f32,
    energy: f32,
}

/// Drifting particles; each third of the swarm reacts to bass, mids or treble.
pub struct Particles {
    surface: SurfaceDescriptor,
    rng: StdRng,
    particles: Vec<Particle>,
    count: usize,
    speed: f32,
    trail_length: f32,
}

impl Default for Particles {
    fn default() -> Self {
        Self::new()
    }
}

impl Particles {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic layout for tests and reproducible captures.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            rng,
            particles: Vec::new(),
            count: 150,
            speed: 1.5,
            trail_length: 0.15,
        }
    }

    fn spawn(&mut self) {
        let (w, h) = (self.surface.width.max(1) as f32, self.surface.height.max(1) as f32);
        let rng = &mut self.rng;
        self.particles = (0..self.count)
            .map(|_| Particle {
                x: rng.gen_range(0.0..w),
                y: rng.gen_range(0.0..h),
                vx: rng.gen_range(-1.5..1.5),
                vy: rng.gen_range(-1.5..1.5),
                size: rng.gen_range(1.0..3.0),
                base_speed: rng.gen_range(0.5..1.0),
                energy: 0.0,
            })
            .collect();
    }
}

impl Visualizer for Particles {
    fn name(&self) -> &'static str {
        "Particles"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
        self.spawn();
    }

    fn update(&mut self, _time_domain: &[u8], frequency: &[u8]) {
        let len = frequency.len();
        if len == 0 {
            return;
        }
        let bass_end = len / 10;
        let mid_end = len * 4 / 10;
        let bass = band_energy(frequency, 0, bass_end);
        let mid = band_energy(frequency, bass_end, mid_end);
        let treble = band_energy(frequency, mid_end, len);

        let average = band_energy(frequency, 0, len) * 255.0;
        let energy = (average / 128.0 * self.surface.theme.sensitivity).min(3.0);

        let (w, h) = (self.surface.width as f32, self.surface.height as f32);
        let total = self.particles.len();
        for (i, p) in self.particles.iter_mut().enumerate() {
            p.energy = match i * 3 / total {
                0 => energy * (1.0 + bass * 2.0),
                1 => energy * (1.0 + mid),
                _ => energy * (1.0 + treble),
            };

            let step = p.base_speed * self.speed * (1.0 + p.energy);
            p.x += p.vx * step;
            p.y += p.vy * step;

            if p.x < 0.0 {
                p.x = w;
            } else if p.x > w {
                p.x = 0.0;
            }
            if p.y < 0.0 {
                p.y = h;
            } else if p.y > h {
                p.y = 0.0;
            }
        }
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        let theme = self.surface.theme;
        canvas::fade(pixmap, theme.background, self.trail_length);

        for p in &self.particles {
            let colour = theme.primary.brighten(p.energy * 50.0, p.energy * 30.0, p.energy * 20.0);
            let radius = p.size * (1.0 + p.energy * 0.5);
            if p.energy > 1.0 {
                let glow = canvas::solid(theme.primary.with_alpha(0.15));
                canvas::fill_circle(pixmap, p.x, p.y, radius * 2.0, &glow);
            }
            let paint = canvas::solid(colour.with_alpha(0.6 + p.energy * 0.4));
            canvas::fill_circle(pixmap, p.x, p.y, radius, &paint);
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("particleCount", "Particle Count", 50.0, 300.0, 1.0, 150.0).structural(),
            SettingDef::range("speed", "Speed", 0.5, 3.0, 0.1, 1.5),
            SettingDef::range("trailLength", "Trail Length", 0.05, 0.5, 0.05, 0.15),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        let v = number(value, key)?;
        match key {
            "particleCount" => self.count = v as usize,
            "speed" => self.speed = v,
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

    #[test]
    fn test_count_applies_on_reinit() {
        let mut particles = Particles::with_seed(7);
        particles.init(&testing::surface());
        assert_eq!(particles.particles.len(), 150);

        particles.apply_setting("particleCount", &SettingValue::Number(60.0)).unwrap();
        particles.init(&testing::surface());
        assert_eq!(particles.particles.len(), 60);
    }

    #[test]
    fn test_particles_stay_on_surface() {
        let mut particles = Particles::with_seed(1);
        particles.init(&testing::surface());
        for _ in 0..200 {
            particles.update(&[128; 64], &[255; 64]);
        }
        assert!(particles
            .particles
            .iter()
            .all(|p| (0.0..=160.0).contains(&p.x) && (0.0..=120.0).contains(&p.y)));
    }

    #[test]
    fn test_energy_is_capped_and_bass_third_reacts_most() {
        let mut particles = Particles::with_seed(3);
        particles.init(&testing::surface());
        let mut frequency = vec![0u8; 100];
        frequency[..10].fill(255);
        particles.update(&[128; 100], &frequency);

        let first = particles.particles[0].energy;
        let last = particles.particles[149].energy;
        assert!(first > last);

        particles.update(&[128; 100], &[255; 100]);
        assert!(particles.particles.iter().all(|p| p.energy <= 3.0 * 3.0));
    }
}
