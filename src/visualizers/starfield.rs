use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiny_skia::Pixmap;

use super::{band_energy, number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::canvas;

const BASS_BINS: usize = 32;
const MID_BINS: usize = 128;
const SHAKE_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy)]
struct Star {
    x: f32,
    y: f32,
    z: f32,
}

/// Fly-through starfield. Bass drives speed and shake, mids star size, highs brightness.
pub struct Starfield {
    surface: SurfaceDescriptor,
    rng: StdRng,
    frame: FrameCopy,
    stars: Vec<Star>,
    star_count: usize,
    speed: f32,
    bass: f32,
    mid: f32,
    high: f32,
    shake: (f32, f32),
}

impl Default for Starfield {
    fn default() -> Self {
        Self::new()
    }
}

impl Starfield {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            surface: SurfaceDescriptor::new(0, 0, Default::default()),
            rng,
            frame: FrameCopy::default(),
            stars: Vec::new(),
            star_count: 200,
            speed: 1.0,
            bass: 0.0,
            mid: 0.0,
            high: 0.0,
            shake: (0.0, 0.0),
        }
    }

    fn random_star(rng: &mut StdRng, z: f32) -> Star {
        Star {
            x: rng.gen_range(-1.0..1.0),
            y: rng.gen_range(-1.0..1.0),
            z,
        }
    }
}

impl Visualizer for Starfield {
    fn name(&self) -> &'static str {
        "Starfield"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
        let rng = &mut self.rng;
        self.stars = (0..self.star_count)
            .map(|_| {
                let z = rng.gen_range(f32::EPSILON..1.0);
                Self::random_star(rng, z)
            })
            .collect();
    }

    fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        self.frame.copy_from(time_domain, frequency);
        self.bass = band_energy(frequency, 0, BASS_BINS);
        self.mid = band_energy(frequency, BASS_BINS, MID_BINS);
        self.high = band_energy(frequency, MID_BINS, frequency.len());

        self.shake = if self.bass > SHAKE_THRESHOLD {
            let amount = 10.0 * self.bass;
            (
                self.rng.gen_range(-0.5..0.5) * amount,
                self.rng.gen_range(-0.5..0.5) * amount,
            )
        } else {
            (0.0, 0.0)
        };

        let step = 0.01 * self.speed * (1.0 + self.bass * 4.0) * self.surface.theme.sensitivity;
        for star in &mut self.stars {
            star.z -= step;
            if star.z <= 0.0 {
                *star = Self::random_star(&mut self.rng, 1.0);
            }
        }
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        let theme = self.surface.theme;
        canvas::fade(pixmap, theme.background, 0x20 as f32 / 255.0);

        let (cx, cy) = self.surface.center();
        let (sx, sy) = self.shake;
        let size_boost = 1.0 + self.mid * 2.0;
        let brightness = self.high * 0.5;
        let bins = &self.frame.frequency;
        let total = self.stars.len().max(1);

        let project = |star: &Star, z: f32| (cx + star.x * cx / z + sx, cy + star.y * cy / z + sy);

        for (i, star) in self.stars.iter().enumerate() {
            let intensity = if bins.is_empty() {
                0.0
            } else {
                bins[i * bins.len() / total] as f32 / 255.0
            };
            let depth = 1.0 - star.z;
            let size = depth * 3.0 * size_boost * (1.0 + intensity * theme.sensitivity);
            let alpha = depth * (0.4 + intensity * 0.6 + brightness);
            let (x, y) = project(star, star.z);

            canvas::fill_circle(pixmap, x, y, size, &canvas::solid(theme.primary.with_alpha(alpha)));

            let trail_z = star.z + 0.05 + self.bass * 0.15;
            if trail_z < 1.0 {
                let paint = canvas::solid(theme.primary.with_alpha(alpha * 0.6));
                canvas::line(pixmap, project(star, trail_z), (x, y), &paint, size * 0.5);
            }
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("starCount", "Star Count", 50.0, 500.0, 50.0, 200.0).structural(),
            SettingDef::range("speed", "Speed", 0.1, 3.0, 0.1, 1.0),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        let v = number(value, key)?;
        match key {
            "starCount" => self.star_count = v as usize,
            "speed" => self.speed = v,
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
    fn test_stars_respawn_at_far_plane() {
        let mut field = Starfield::with_seed(11);
        field.init(&testing::surface());
        for _ in 0..500 {
            field.update(&[128; 256], &[255; 256]);
            assert!(field.stars.iter().all(|s| s.z > 0.0 && s.z <= 1.0));
        }
    }

    #[test]
    fn test_quiet_bass_does_not_shake() {
        let mut field = Starfield::with_seed(2);
        field.init(&testing::surface());
        field.update(&[128; 256], &[0; 256]);
        assert_eq!(field.shake, (0.0, 0.0));

        field.update(&[128; 256], &[255; 256]);
        assert!(field.bass > SHAKE_THRESHOLD);
    }
}
