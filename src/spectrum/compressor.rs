use serde::{Deserialize, Serialize};

// Keeps log10 finite for silent bins.
const DB_EPSILON: f32 = 1e-4;
// Share of the bass reduction applied outside the bass window.
const LIGHT_REDUCTION: f32 = 0.3;

/// Tuning for [`compress`]. Thresholds are in normalized units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorOptions {
    pub threshold: f32,
    pub ratio: f32,
    /// Fraction of the leading bins treated as bass.
    pub bass_range: f32,
}

impl Default for CompressorOptions {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            ratio: 4.0,
            bass_range: 0.15,
        }
    }
}

/// Keeps saturated low bins from flat-lining bar and line visualizers.
///
/// When the normalized peak of the bass window exceeds `threshold`, the dB
/// reduction that maps that peak to `threshold + (peak - threshold) / ratio` is
/// applied in full to the bass bins and at 30% to every other bin. Below the
/// threshold the input is only normalized. Output is always within `0.0..=1.0`.
pub fn compress(input: &[u8], options: &CompressorOptions) -> Vec<f32> {
    let mut output = vec![0.0; input.len()];
    compress_into(input, options, &mut output);
    output
}

/// Allocation-free [`compress`]; `output` must be at least as long as `input`.
pub fn compress_into(input: &[u8], options: &CompressorOptions, output: &mut [f32]) {
    for (out, &value) in output.iter_mut().zip(input) {
        *out = value as f32 / 255.0;
    }
    let len = input.len().min(output.len());
    compress_normalized_in_place(&mut output[..len], options);
}

/// Compresses data that is already normalized to `0.0..=1.0`.
pub fn compress_normalized(input: &[f32], options: &CompressorOptions) -> Vec<f32> {
    let mut output = input.to_vec();
    compress_normalized_in_place(&mut output, options);
    output
}

pub fn compress_normalized_in_place(data: &mut [f32], options: &CompressorOptions) {
    let bass_end = ((data.len() as f32 * options.bass_range).floor() as usize).min(data.len());
    let peak = data[..bass_end].iter().fold(0.0f32, |acc, &v| acc.max(v));

    if peak <= options.threshold || options.ratio <= 0.0 {
        for value in data.iter_mut() {
            *value = value.clamp(0.0, 1.0);
        }
        return;
    }

    let target = options.threshold + (peak - options.threshold) / options.ratio;
    let reduction_db = to_db(peak) - to_db(target);

    for (i, value) in data.iter_mut().enumerate() {
        let applied = if i < bass_end {
            reduction_db
        } else {
            reduction_db * LIGHT_REDUCTION
        };
        let compressed = 10f32.powf((to_db(*value) - applied) / 20.0);
        *value = compressed.clamp(0.0, 1.0);
    }
}

/// Caps normalized values at `max_value` (itself normalized).
pub fn limit(input: &[u8], max_value: f32) -> Vec<f32> {
    input
        .iter()
        .map(|&v| (v as f32 / 255.0).min(max_value))
        .collect()
}

#[inline]
fn to_db(value: f32) -> f32 {
    20.0 * (value + DB_EPSILON).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturated_bass_is_compressed() {
        let mut input = vec![100u8; 1024];
        let bass_end = (1024.0 * 0.15) as usize;
        input[..bass_end].fill(255);

        let options = CompressorOptions::default();
        let output = compress(&input, &options);

        for &value in &output[..bass_end] {
            assert!(value < 1.0, "bass should be pulled below the ceiling, got {value}");
            assert!(value > options.threshold);
        }
        // Upper bins only get the lighter reduction.
        let untouched = 100.0 / 255.0;
        assert!(output[bass_end + 10] < untouched);
        assert!(output[bass_end + 10] > untouched * 0.9);
    }

    #[test]
    fn test_below_threshold_passes_through() {
        let input: Vec<u8> = (0..200).map(|i| (i % 128) as u8).collect();
        let output = compress(&input, &CompressorOptions::default());

        for (got, raw) in output.iter().zip(&input) {
            assert_eq!(*got, *raw as f32 / 255.0);
        }
    }

    #[test]
    fn test_normalized_input_at_half_is_unchanged() {
        let input = vec![0.5f32; 64];
        assert_eq!(compress_normalized(&input, &CompressorOptions::default()), input);
    }

    #[test]
    fn test_quiet_bass_still_clamps_output() {
        let mut input = vec![0.2f32; 40];
        input[20] = 1.5;
        input[30] = -0.25;

        let output = compress_normalized(&input, &CompressorOptions::default());
        assert_eq!(output[0], 0.2);
        assert_eq!(output[20], 1.0);
        assert_eq!(output[30], 0.0);
        assert!(output.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_limit_caps_values() {
        let output = limit(&[0, 128, 255], 0.85);
        assert_eq!(output[0], 0.0);
        assert!((output[1] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(output[2], 0.85);
    }
}
