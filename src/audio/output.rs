use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::AudioGraph;

const FALLBACK_SAMPLE_RATE: u32 = 44100;
const FALLBACK_CHANNELS: u16 = 2;

/// Whatever is pulling samples out of the graph.
pub enum AudioOutput {
    Device(DeviceOutput),
    Silent(SilentOutput),
}

impl AudioOutput {
    pub fn is_silent(&self) -> bool {
        matches!(self, AudioOutput::Silent(_))
    }
}

/// Opens the default output device, or a silent clock if there is none.
///
/// The graph is created at the device's native rate and channel count so the
/// callback never has to convert.
pub fn open_output(fft_size: usize) -> (AudioGraph, AudioOutput) {
    match DeviceOutput::open(fft_size) {
        Ok((graph, output)) => {
            info!("✅ Audio output initialized");
            (graph, AudioOutput::Device(output))
        }
        Err(e) => {
            warn!("⚠️  Audio device unavailable: {}. Falling back to silent clock.", e);
            let graph = AudioGraph::new(FALLBACK_SAMPLE_RATE, FALLBACK_CHANNELS, fft_size);
            let silent = SilentOutput::start(graph.clone());
            (graph, AudioOutput::Silent(silent))
        }
    }
}

pub struct DeviceOutput {
    _stream: Stream,
}

impl DeviceOutput {
    pub fn open(fft_size: usize) -> Result<(AudioGraph, Self)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;
        let supported = device
            .default_output_config()
            .map_err(|e| anyhow!("Failed to get default output config: {}", e))?;

        info!("Using audio device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));
        info!("Audio config: {:?}", supported);

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let graph = AudioGraph::new(config.sample_rate.0, config.channels, fft_size);

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, graph.clone())?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, graph.clone())?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, graph.clone())?,
            SampleFormat::I32 => Self::build_stream::<i32>(&device, &config, graph.clone())?,
            other => return Err(anyhow!("Unsupported sample format {:?}", other)),
        };
        stream.play()?;

        Ok((graph, Self { _stream: stream }))
    }

    fn build_stream<T>(device: &Device, config: &StreamConfig, graph: AudioGraph) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        info!(
            "Creating output stream with {} channels at {} Hz",
            config.channels, config.sample_rate.0
        );

        let mut mix: Vec<f32> = Vec::new();
        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if mix.len() < data.len() {
                    mix.resize(data.len(), 0.0);
                }
                let mix = &mut mix[..data.len()];
                graph.render(mix);
                for (dst, &sample) in data.iter_mut().zip(mix.iter()) {
                    *dst = T::from_sample(sample);
                }
            },
            |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;

        Ok(stream)
    }
}

/// Advances the graph in real time without producing sound.
pub struct SilentOutput {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SilentOutput {
    pub fn start(graph: AudioGraph) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = std::thread::spawn(move || {
            let started = Instant::now();
            let mut rendered: u64 = 0;
            while flag.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(10));
                let due = (started.elapsed().as_secs_f64() * graph.sample_rate() as f64) as u64;
                if due > rendered {
                    graph.render_offline((due - rendered) as usize);
                    rendered = due;
                }
            }
        });

        Self {
            running,
            thread: Some(thread),
        }
    }
}

impl Drop for SilentOutput {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
