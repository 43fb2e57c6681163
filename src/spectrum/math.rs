/// Default output width for visualizers that draw the full log-scaled spectrum.
pub const VISUALIZER_BIN_COUNT: usize = 960;

/// Maps an 8-bit analyser value onto `0.0..=1.0`.
#[inline]
pub fn normalize_8bit(value: f32) -> f32 {
    value.clamp(0.0, 255.0) / 255.0
}

/// Resamples byte spectrum data onto `output_len` log-spaced points.
///
/// Output index `i` reads the virtual source index `(M - 1)^(i / (output_len - 1))`
/// and evaluates a parabola through the three neighbouring bins at the
/// fractional offset. The low bins get most of the output width, which matches
/// where musical energy sits. Results are normalized by 255 and clamped to
/// `0.0..=1.0`.
pub fn log_parabolic_resample(input: &[u8], output_len: usize) -> Vec<f32> {
    let mut output = vec![0.0; output_len];
    log_parabolic_resample_into(input, &mut output);
    output
}

/// Allocation-free variant of [`log_parabolic_resample`]; fills all of `output`.
pub fn log_parabolic_resample_into(input: &[u8], output: &mut [f32]) {
    if input.is_empty() {
        output.fill(0.0);
        return;
    }

    let max_index = input.len() - 1;
    let last = output.len().saturating_sub(1);

    for (i, out) in output.iter_mut().enumerate() {
        // A single output point evaluates i = 0, i.e. exponent 0.
        let exponent = if last == 0 { 0.0 } else { i as f32 / last as f32 };
        let virtual_index = if max_index == 0 {
            0.0
        } else {
            (max_index as f32).powf(exponent).min(max_index as f32)
        };

        let base = virtual_index.floor() as usize;
        let t = virtual_index - base as f32;

        let y0 = input[base.saturating_sub(1)] as f32;
        let y1 = input[base] as f32;
        let y2 = input[(base + 1).min(max_index)] as f32;

        let a = (y0 - 2.0 * y1 + y2) / 2.0;
        let b = (y2 - y0) / 2.0;
        let y = a * t * t + b * t + y1;

        *out = normalize_8bit(y);
    }
}

/// Uniformly resamples byte data onto `output_len` points with linear interpolation.
pub fn linear_resample(input: &[u8], output_len: usize) -> Vec<f32> {
    let mut output = vec![0.0; output_len];
    linear_resample_into(input, &mut output);
    output
}

/// Allocation-free variant of [`linear_resample`].
pub fn linear_resample_into(input: &[u8], output: &mut [f32]) {
    if input.is_empty() {
        output.fill(0.0);
        return;
    }

    let max_index = input.len() - 1;
    let last = output.len().saturating_sub(1);

    for (i, out) in output.iter_mut().enumerate() {
        let position = if last == 0 {
            0.0
        } else {
            i as f32 / last as f32 * max_index as f32
        };
        let base = (position.floor() as usize).min(max_index);
        let t = position - base as f32;

        let y0 = input[base] as f32;
        let y1 = input[(base + 1).min(max_index)] as f32;

        *out = normalize_8bit(y0 + (y1 - y0) * t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_input_has_no_ripple() {
        let input = vec![128u8; 1024];
        let output = log_parabolic_resample(&input, VISUALIZER_BIN_COUNT);

        assert_eq!(output.len(), VISUALIZER_BIN_COUNT);
        for value in output {
            assert!((value - 128.0 / 255.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_log_resample_endpoints() {
        let input: Vec<u8> = (0..=255).collect();
        let output = log_parabolic_resample(&input, 64);

        // First point reads bin 1 ((M-1)^0), last point reads the final bin.
        assert!((output[0] - 1.0 / 255.0).abs() < 1e-4);
        assert!((output[63] - 1.0).abs() < 1e-4);
        assert!(output.windows(2).all(|w| w[1] >= w[0] - 1e-6));
    }

    #[test]
    fn test_degenerate_lengths() {
        let single = log_parabolic_resample(&[10, 20, 30], 1);
        assert_eq!(single.len(), 1);
        assert!(single[0].is_finite());
        assert!((single[0] - 20.0 / 255.0).abs() < 1e-4);

        let one_bin = log_parabolic_resample(&[200], 8);
        assert!(one_bin.iter().all(|v| (v - 200.0 / 255.0).abs() < 1e-4));

        assert!(log_parabolic_resample(&[], 4).iter().all(|v| *v == 0.0));
        assert!(linear_resample(&[], 4).iter().all(|v| *v == 0.0));
        assert_eq!(linear_resample(&[51, 255], 1), vec![0.2]);
    }

    #[test]
    fn test_output_stays_in_unit_range() {
        // Sharp peaks make the parabola overshoot before clamping.
        let input: Vec<u8> = (0..512).map(|i| if i % 3 == 0 { 255 } else { 0 }).collect();
        let output = log_parabolic_resample(&input, VISUALIZER_BIN_COUNT);
        assert!(output.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_linear_resample_interpolates() {
        let output = linear_resample(&[0, 255], 5);
        let expected = [0.0, 0.25, 0.5, 0.75, 1.0];
        for (got, want) in output.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5);
        }
    }
}
