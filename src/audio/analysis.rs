use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::AudioGraph;

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const DEFAULT_MIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_DB: f32 = -30.0;

/// One sampled snapshot of the analysis tap, both arrays `fft_size / 2` long.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    pub time_domain: Vec<u8>,
    pub frequency: Vec<u8>,
}

impl SpectralFrame {
    pub fn new(bin_count: usize) -> Self {
        Self {
            time_domain: vec![128; bin_count],
            frequency: vec![0; bin_count],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.frequency.len()
    }
}

/// Anything that can fill a [`SpectralFrame`] once per rendered frame.
pub trait AnalysisSource {
    fn sample(&mut self, frame: &mut SpectralFrame);
}

/// Byte-scaled spectrum extraction over the graph's analysis tap.
///
/// Samples are Blackman-windowed, transformed, divided by the FFT size and
/// smoothed over time with `smoothing`. Magnitudes are mapped from
/// `min_db..max_db` onto `0..=255`; time-domain samples map `-1..1` onto
/// `0..=255` around 128.
pub struct SpectrumSampler {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl SpectrumSampler {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let fft_scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft_size,
            fft,
            window: Self::blackman_window(fft_size),
            samples: vec![0.0; fft_size],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            fft_scratch,
            smoothed: vec![0.0; fft_size / 2],
            smoothing: DEFAULT_SMOOTHING,
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
        }
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing.clamp(0.0, 1.0);
    }

    /// Sets the decibel window mapped onto the byte range. Ignored unless `min_db < max_db`.
    pub fn set_decibel_range(&mut self, min_db: f32, max_db: f32) {
        if min_db < max_db {
            self.min_db = min_db;
            self.max_db = max_db;
        }
    }

    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }

    /// Pulls the newest samples out of `graph` and analyzes them.
    pub fn sample_graph(&mut self, graph: &AudioGraph, frame: &mut SpectralFrame) {
        graph.copy_analysis(&mut self.samples);
        self.process(frame);
    }

    /// Analyzes the most recent `fft_size` samples of `input` (zero padded at the front).
    pub fn analyze_samples(&mut self, input: &[f32], frame: &mut SpectralFrame) {
        let take = input.len().min(self.fft_size);
        let lead = self.fft_size - take;
        self.samples[..lead].fill(0.0);
        self.samples[lead..].copy_from_slice(&input[input.len() - take..]);
        self.process(frame);
    }

    fn process(&mut self, frame: &mut SpectralFrame) {
        let bins = self.bin_count();

        // Most recent half of the window.
        let recent = &self.samples[self.fft_size - bins..];
        for (dst, &s) in frame.time_domain.iter_mut().zip(recent) {
            *dst = (128.0 * (1.0 + s)).floor().clamp(0.0, 255.0) as u8;
        }

        for ((dst, &s), &w) in self.scratch.iter_mut().zip(&self.samples).zip(&self.window) {
            *dst = Complex::new(s * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.scratch, &mut self.fft_scratch);

        let scale = 255.0 / (self.max_db - self.min_db);
        let norm = 1.0 / self.fft_size as f32;
        for ((dst, smoothed), bin) in frame
            .frequency
            .iter_mut()
            .zip(self.smoothed.iter_mut())
            .zip(&self.scratch[..bins])
        {
            let magnitude = bin.norm() * norm;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
            let db = 20.0 * smoothed.log10();
            *dst = (scale * (db - self.min_db)).floor().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Binds a sampler to the graph it reads from.
pub struct GraphAnalysis {
    graph: AudioGraph,
    sampler: SpectrumSampler,
}

impl GraphAnalysis {
    pub fn new(graph: AudioGraph) -> Self {
        let sampler = SpectrumSampler::new(graph.fft_size());
        Self { graph, sampler }
    }

    pub fn bin_count(&self) -> usize {
        self.sampler.bin_count()
    }

    pub fn sampler_mut(&mut self) -> &mut SpectrumSampler {
        &mut self.sampler
    }
}

impl AnalysisSource for GraphAnalysis {
    fn sample(&mut self, frame: &mut SpectralFrame) {
        self.sampler.sample_graph(&self.graph, frame);
    }
}
