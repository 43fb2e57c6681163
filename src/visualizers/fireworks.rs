use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use tiny_skia::Pixmap;

use super::{band_energy, number, FrameCopy, SettingDef, SettingValue, SurfaceDescriptor, Visualizer};
use crate::error::{Error, Result};
use crate::graphics::canvas;

const FADE_ALPHA: f32 = 0x15 as f32 / 255.0;
const GRAVITY: f32 = 0.1;
const DRAG: f32 = 0.99;
// About 200 ms at 60 fps.
const COOLDOWN_FRAMES: u32 = 12;

#[derive(Debug, Clone, Copy)]
struct Spark {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    size: f32,
}

#[derive(Debug, Clone)]
struct Burst {
    sparks: Vec<Spark>,
    life: u32,
}

/// Bursts of sparks set off whenever the bass band crosses a threshold.
pub struct Fireworks {
    surface: SurfaceDescriptor,
    frame: FrameCopy,
    rng: StdRng,
    bursts: Vec<Burst>,
    cooldown: u32,
    threshold: f32,
    particle_life: u32,
}

impl Default for Fireworks {
    fn default() -> Self {
        Self::new()
    }
}

impl Fireworks {
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
            rng,
            bursts: Vec::new(),
            cooldown: 0,
            threshold: 0.7,
            particle_life: 60,
        }
    }

    fn launch(&mut self) {
        let (w, h) = (self.surface.width.max(1) as f32, self.surface.height.max(1) as f32);
        let rng = &mut self.rng;
        let (x, y) = (rng.gen_range(0.0..w), rng.gen_range(0.0..h * 0.6));
        let count = rng.gen_range(50..100);
        let sparks = (0..count)
            .map(|i| {
                let angle = TAU * i as f32 / count as f32;
                let speed = rng.gen_range(2.0..6.0);
                Spark {
                    x,
                    y,
                    vx: angle.cos() * speed,
                    vy: angle.sin() * speed,
                    size: rng.gen_range(2.0..4.0),
                }
            })
            .collect();
        self.bursts.push(Burst {
            sparks,
            life: self.particle_life,
        });
    }

    /// Launches a burst if the bass is loud enough and the last one is not too recent.
    fn trigger(&mut self) -> bool {
        self.cooldown = self.cooldown.saturating_sub(1);
        let bass = band_energy(&self.frame.frequency, 0, 32);
        if bass <= self.threshold || self.cooldown > 0 {
            return false;
        }
        self.launch();
        self.cooldown = COOLDOWN_FRAMES;
        true
    }

    fn step(&mut self) {
        self.bursts.retain_mut(|burst| {
            burst.life = burst.life.saturating_sub(1);
            if burst.life == 0 {
                return false;
            }
            for spark in &mut burst.sparks {
                spark.x += spark.vx;
                spark.y += spark.vy;
                spark.vy += GRAVITY;
                spark.vx *= DRAG;
                spark.vy *= DRAG;
            }
            true
        });
    }
}

impl Visualizer for Fireworks {
    fn name(&self) -> &'static str {
        "Fireworks"
    }

    fn init(&mut self, surface: &SurfaceDescriptor) {
        self.surface = *surface;
        self.bursts.clear();
        self.cooldown = 0;
    }

    fn update(&mut self, time_domain: &[u8], frequency: &[u8]) {
        self.frame.copy_from(time_domain, frequency);
    }

    fn draw(&mut self, pixmap: &mut Pixmap) -> Result<()> {
        let theme = self.surface.theme;
        canvas::fade(pixmap, theme.background, FADE_ALPHA);

        self.trigger();
        self.step();

        let life = self.particle_life.max(1) as f32;
        for burst in &self.bursts {
            let alpha = burst.life as f32 / life * 0.8;
            let dot = canvas::solid(theme.primary.with_alpha(alpha));
            let trail = canvas::solid(theme.primary.with_alpha(alpha * 0.3));
            for spark in &burst.sparks {
                canvas::fill_circle(pixmap, spark.x, spark.y, spark.size, &dot);
                let tail = (spark.x - spark.vx * 2.0, spark.y - spark.vy * 2.0);
                canvas::line(pixmap, tail, (spark.x, spark.y), &trail, spark.size * 0.5);
            }
        }
        Ok(())
    }

    fn settings_schema(&self) -> Vec<SettingDef> {
        vec![
            SettingDef::range("explosionThreshold", "Beat Sensitivity", 0.3, 0.9, 0.1, 0.7),
            SettingDef::range("particleLife", "Particle Life", 30.0, 120.0, 10.0, 60.0),
        ]
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> Result<()> {
        let v = number(value, key)?;
        match key {
            "explosionThreshold" => self.threshold = v,
            "particleLife" => self.particle_life = v.max(1.0) as u32,
            _ => return Err(Error::invalid_setting(key, "unknown setting")),
        }
        Ok(())
    }
}
