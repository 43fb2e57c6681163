use log::debug;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    /// Rounded to a whole number of beats per minute.
    pub bpm: f32,
    /// Time of the first beat of the grid, within one beat of the start.
    pub offset: f64,
    /// Peak-to-mean ratio of the weighted autocorrelation; higher is steadier.
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct TempoConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Centre of the log-normal tempo prior.
    pub preferred_bpm: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 512,
            min_bpm: 60.0,
            max_bpm: 200.0,
            preferred_bpm: 120.0,
        }
    }
}

/// Estimates tempo and beat phase from mono samples.
///
/// Spectral flux of log-compressed magnitudes gives an onset envelope, the
/// envelope's autocorrelation (weighted toward `preferred_bpm`) picks the beat
/// period, and a comb over the envelope picks the phase.
pub fn estimate_tempo(samples: &[f32], sample_rate: u32, config: &TempoConfig) -> Result<TempoEstimate> {
    let frame = config.frame_size.max(64);
    let hop = config.hop_size.clamp(1, frame);
    if sample_rate == 0 {
        return Err(Error::AnalysisUnavailable("sample rate is zero".into()));
    }
    if samples.len() < frame * 16 {
        return Err(Error::AnalysisUnavailable(format!(
            "need at least {} samples, got {}",
            frame * 16,
            samples.len()
        )));
    }

    let envelope = onset_envelope(samples, frame, hop);
    let frame_rate = sample_rate as f32 / hop as f32;

    let (lag, confidence) = best_period(&envelope, frame_rate, config)?;
    let phase = best_phase(&envelope, lag);

    let bpm = (60.0 * frame_rate / lag).round();
    let offset = (phase as f64 * hop as f64 + frame as f64 / 2.0) / sample_rate as f64;

    debug!(
        "Tempo estimate: {} BPM (lag {:.2} frames), offset {:.3}s, confidence {:.2}",
        bpm, lag, offset, confidence
    );

    Ok(TempoEstimate {
        bpm,
        offset,
        confidence,
    })
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

fn onset_envelope(samples: &[f32], frame: usize, hop: usize) -> Vec<f32> {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(frame);
    let window = hann_window(frame);
    let bins = frame / 2;

    let frame_count = (samples.len() - frame) / hop + 1;
    let mut buffer = vec![Complex::new(0.0f32, 0.0); frame];
    let mut previous = vec![0.0f32; bins];
    let mut current = vec![0.0f32; bins];
    let mut flux = Vec::with_capacity(frame_count);

    for i in 0..frame_count {
        let start = i * hop;
        for ((dst, &s), &w) in buffer.iter_mut().zip(&samples[start..start + frame]).zip(&window) {
            *dst = Complex::new(s * w, 0.0);
        }
        fft.process(&mut buffer);

        for (mag, bin) in current.iter_mut().zip(&buffer[..bins]) {
            *mag = (1.0 + 100.0 * bin.norm()).ln();
        }
        let rise: f32 = if i == 0 {
            0.0
        } else {
            current
                .iter()
                .zip(&previous)
                .map(|(c, p)| (c - p).max(0.0))
                .sum()
        };
        flux.push(rise);
        std::mem::swap(&mut previous, &mut current);
    }

    // Remove the slowly varying floor, then soften single-frame jitter.
    const HALF: usize = 8;
    let n = flux.len();
    let mut detrended = vec![0.0f32; n];
    for (i, out) in detrended.iter_mut().enumerate() {
        let lo = i.saturating_sub(HALF);
        let hi = (i + HALF + 1).min(n);
        let mean = flux[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;
        *out = (flux[i] - mean).max(0.0);
    }

    (0..n)
        .map(|i| {
            let prev = detrended[i.saturating_sub(1)];
            let next = detrended[(i + 1).min(n - 1)];
            0.25 * prev + 0.5 * detrended[i] + 0.25 * next
        })
        .collect()
}

fn best_period(envelope: &[f32], frame_rate: f32, config: &TempoConfig) -> Result<(f32, f32)> {
    let energy: f32 = envelope.iter().map(|v| v * v).sum();
    if energy <= f32::EPSILON {
        return Err(Error::AnalysisUnavailable("no onsets found (silent input?)".into()));
    }

    let n = envelope.len();
    let min_lag = ((60.0 * frame_rate / config.max_bpm).floor() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / config.min_bpm).ceil() as usize).min(n / 2);
    if min_lag + 2 > max_lag {
        return Err(Error::AnalysisUnavailable("input too short for the tempo range".into()));
    }

    let mut scores = vec![0.0f32; max_lag + 2];
    for lag in min_lag.saturating_sub(1)..=(max_lag + 1).min(n - 1) {
        let ac: f32 = envelope[..n - lag]
            .iter()
            .zip(&envelope[lag..])
            .map(|(a, b)| a * b)
            .sum::<f32>()
            / (n - lag) as f32;
        let bpm = 60.0 * frame_rate / lag.max(1) as f32;
        let octaves = (bpm / config.preferred_bpm).log2();
        scores[lag] = ac * (-0.5 * octaves * octaves).exp();
    }

    let (best, peak) = (min_lag..=max_lag)
        .map(|lag| (lag, scores[lag]))
        .fold((min_lag, f32::MIN), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
    if peak <= 0.0 {
        return Err(Error::AnalysisUnavailable("no periodicity in onset envelope".into()));
    }

    let (y0, y1, y2) = (scores[best - 1], scores[best], scores[best + 1]);
    let curvature = y0 - 2.0 * y1 + y2;
    let shift = if curvature.abs() > f32::EPSILON {
        (0.5 * (y0 - y2) / curvature).clamp(-0.5, 0.5)
    } else {
        0.0
    };

    let mean = scores[min_lag..=max_lag].iter().sum::<f32>() / (max_lag - min_lag + 1) as f32;
    let confidence = if mean > 0.0 { peak / mean } else { 0.0 };
    Ok((best as f32 + shift, confidence))
}

fn best_phase(envelope: &[f32], lag: f32) -> usize {
    let period = lag.ceil().max(1.0) as usize;
    (0..period)
        .map(|phase| {
            let mut sum = 0.0;
            let mut k = 0usize;
            loop {
                let idx = (phase as f32 + k as f32 * lag).round() as usize;
                if idx >= envelope.len() {
                    break;
                }
                sum += envelope[idx];
                k += 1;
            }
            (phase, sum)
        })
        .fold((0, f32::MIN), |acc, cur| if cur.1 > acc.1 { cur } else { acc })
        .0
}
