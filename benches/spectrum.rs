use criterion::{black_box, criterion_group, criterion_main, Criterion};

use spectra::audio::{SpectralFrame, SpectrumSampler, DEFAULT_FFT_SIZE};
use spectra::spectrum::compressor::{compress_into, CompressorOptions};
use spectra::spectrum::math::{log_parabolic_resample_into, VISUALIZER_BIN_COUNT};

fn frequency_bins(len: usize) -> Vec<u8> {
    (0..len).map(|i| (255 - (i * 255 / len)) as u8).collect()
}

fn bench_resample(c: &mut Criterion) {
    let input = frequency_bins(DEFAULT_FFT_SIZE / 2);
    let mut output = vec![0.0f32; VISUALIZER_BIN_COUNT];
    c.bench_function("log_parabolic_resample_into 1024 -> 960", |b| {
        b.iter(|| log_parabolic_resample_into(black_box(&input), &mut output))
    });
}

fn bench_compress(c: &mut Criterion) {
    let input = frequency_bins(DEFAULT_FFT_SIZE / 2);
    let options = CompressorOptions::default();
    let mut output = vec![0.0f32; input.len()];
    c.bench_function("compress_into 1024 bins", |b| {
        b.iter(|| compress_into(black_box(&input), &options, &mut output))
    });
}

fn bench_sampler(c: &mut Criterion) {
    let mut sampler = SpectrumSampler::new(DEFAULT_FFT_SIZE);
    let mut frame = SpectralFrame::new(sampler.bin_count());
    let samples: Vec<f32> = (0..DEFAULT_FFT_SIZE)
        .map(|i| (i as f32 * 0.05).sin() * 0.5)
        .collect();
    c.bench_function("SpectrumSampler 2048-point frame", |b| {
        b.iter(|| sampler.analyze_samples(black_box(&samples), &mut frame))
    });
}

criterion_group!(benches, bench_resample, bench_compress, bench_sampler);
criterion_main!(benches);
