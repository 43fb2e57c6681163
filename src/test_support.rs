use std::f32::consts::PI;
use std::path::Path;

use crate::audio::PcmBuffer;

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// Writes a 16-bit PCM sine tone.
pub fn write_sine_wav(path: &Path, frequency: f32, seconds: f32, sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (seconds * sample_rate as f32) as usize;
    for i in 0..frames {
        let sample = (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin() * 0.5;
        let value = (sample * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Decaying 2 kHz bursts at `first + k * 60 / bpm`.
pub fn click_track(bpm: f32, first: f32, seconds: f32, sample_rate: u32) -> PcmBuffer {
    let len = (seconds * sample_rate as f32) as usize;
    let mut samples = vec![0.0f32; len];
    let interval = 60.0 / bpm;
    let mut onset = first;
    while onset < seconds {
        let start = (onset * sample_rate as f32) as usize;
        for n in 0..256 {
            if let Some(slot) = samples.get_mut(start + n) {
                let t = n as f32 / sample_rate as f32;
                *slot = (2.0 * PI * 2000.0 * t).sin() * (-(n as f32) / 48.0).exp();
            }
        }
        onset += interval;
    }
    PcmBuffer::new(sample_rate, vec![samples])
}

/// Constant-valued mono buffer, handy for driving the graph clock.
pub fn constant_buffer(value: f32, seconds: f64, sample_rate: u32) -> PcmBuffer {
    let frames = (seconds * sample_rate as f64) as usize;
    PcmBuffer::new(sample_rate, vec![vec![value; frames]])
}
