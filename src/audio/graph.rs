use log::{debug, trace};
use std::sync::{Arc, Mutex, MutexGuard};

use super::PcmBuffer;
use crate::error::{Error, Result};

pub type SourceId = u64;

/// The fixed signal graph: `source -> intensity gain -> analysis tap -> volume gain -> output`.
///
/// The intensity stage only feeds the analysis tap and the volume stage only
/// scales what reaches the device, so each gain is independent of the other
/// path. `AudioGraph` is a cheap handle; the device callback and the control
/// thread share one core behind a mutex. All mutation goes through the player.
#[derive(Clone)]
pub struct AudioGraph {
    core: Arc<Mutex<GraphCore>>,
    sample_rate: u32,
    channels: u16,
    fft_size: usize,
}

struct GraphCore {
    sample_rate: u32,
    channels: usize,
    frames_rendered: u64,
    source: Option<SourceNode>,
    intensity_gain: f32,
    volume_gain: f32,
    tap: AnalysisTap,
    ended: Vec<SourceId>,
    next_id: SourceId,
    frame: Vec<f32>,
}

struct SourceNode {
    id: SourceId,
    buffer: Arc<PcmBuffer>,
    position: f64,      // in buffer frames
    step: f64,          // buffer frames per graph frame at rate 1
    rate: f64,
}

/// Ring of the most recent mono samples seen after the intensity stage.
struct AnalysisTap {
    ring: Vec<f32>,
    write: usize,
}

impl AudioGraph {
    pub fn new(sample_rate: u32, channels: u16, fft_size: usize) -> Self {
        let sample_rate = sample_rate.max(1);
        let channels = channels.max(1);
        let fft_size = fft_size.max(32).next_power_of_two();

        let core = GraphCore {
            sample_rate,
            channels: channels as usize,
            frames_rendered: 0,
            source: None,
            intensity_gain: 1.0,
            volume_gain: 1.0,
            tap: AnalysisTap {
                ring: vec![0.0; fft_size],
                write: 0,
            },
            ended: Vec::new(),
            next_id: 1,
            frame: vec![0.0; channels as usize],
        };

        Self {
            core: Arc::new(Mutex::new(core)),
            sample_rate,
            channels,
            fft_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GraphCore> {
        // A panic inside the device callback must not take the control thread down with it.
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Graph clock in seconds, advanced only by rendering.
    pub fn current_time(&self) -> f64 {
        let core = self.lock();
        core.frames_rendered as f64 / core.sample_rate as f64
    }

    /// Connects a new source reading `buffer` from `offset` seconds, replacing any active one.
    pub fn start_source(&self, buffer: Arc<PcmBuffer>, offset: f64, rate: f64) -> Result<SourceId> {
        if buffer.is_empty() || buffer.channel_count() == 0 {
            return Err(Error::Graph("cannot start a source on an empty buffer".into()));
        }
        if buffer.sample_rate == 0 {
            return Err(Error::Graph("buffer has no sample rate".into()));
        }
        if !offset.is_finite() || !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Graph(format!("invalid source offset {offset} or rate {rate}")));
        }

        let mut core = self.lock();
        let id = core.next_id;
        core.next_id += 1;

        let position = (offset.max(0.0) * buffer.sample_rate as f64).min(buffer.frames() as f64);
        let step = buffer.sample_rate as f64 / core.sample_rate as f64;
        core.source = Some(SourceNode {
            id,
            buffer,
            position,
            step,
            rate,
        });

        debug!("Source {} connected at {:.3}s (rate {:.2})", id, offset, rate);
        Ok(id)
    }

    /// Disconnects the active source. A stopped source is not reported as ended.
    pub fn stop_source(&self) -> Option<SourceId> {
        let mut core = self.lock();
        core.source.take().map(|source| source.id)
    }

    pub fn active_source(&self) -> Option<SourceId> {
        self.lock().source.as_ref().map(|source| source.id)
    }

    pub fn set_source_rate(&self, rate: f64) {
        if let Some(source) = self.lock().source.as_mut() {
            source.rate = rate;
        }
    }

    pub fn set_intensity_gain(&self, gain: f32) {
        self.lock().intensity_gain = gain;
    }

    pub fn intensity_gain(&self) -> f32 {
        self.lock().intensity_gain
    }

    pub fn set_volume_gain(&self, gain: f32) {
        self.lock().volume_gain = gain;
    }

    pub fn volume_gain(&self) -> f32 {
        self.lock().volume_gain
    }

    /// Sources that ran off the end of their buffer since the last call.
    pub fn take_ended(&self) -> Vec<SourceId> {
        std::mem::take(&mut self.lock().ended)
    }

    /// Fills interleaved device output and advances the graph clock.
    pub fn render(&self, output: &mut [f32]) {
        self.lock().render(output);
    }

    /// Advances the graph by `frames` without a device. Used by the silent
    /// output and by tests that need a deterministic clock.
    pub fn render_offline(&self, frames: usize) {
        let channels = self.channels as usize;
        let mut scratch = vec![0.0; 512 * channels];
        let mut remaining = frames;
        let mut core = self.lock();
        while remaining > 0 {
            let chunk = remaining.min(512);
            core.render(&mut scratch[..chunk * channels]);
            remaining -= chunk;
        }
    }

    /// Copies the latest `fft_size` tapped samples into `dst`, oldest first.
    pub fn copy_analysis(&self, dst: &mut [f32]) {
        let core = self.lock();
        let ring = &core.tap.ring;
        let n = ring.len();
        let take = dst.len().min(n);
        let start = (core.tap.write + n - take) % n;
        let dst_len = dst.len();
        for (i, slot) in dst[dst_len - take..].iter_mut().enumerate() {
            *slot = ring[(start + i) % n];
        }
        let lead = dst.len() - take;
        dst[..lead].fill(0.0);
    }
}

impl GraphCore {
    fn render(&mut self, output: &mut [f32]) {
        let channels = self.channels;
        for out_frame in output.chunks_mut(channels) {
            let playing = match self.source.as_mut() {
                Some(source) => source.read_frame(&mut self.frame),
                None => false,
            };
            if !playing {
                if let Some(source) = self.source.take() {
                    trace!("Source {} reached end of buffer", source.id);
                    self.ended.push(source.id);
                }
                self.frame.fill(0.0);
            }

            let mut mono = 0.0;
            for (dst, &sample) in out_frame.iter_mut().zip(&self.frame) {
                mono += sample;
                *dst = sample * self.volume_gain;
            }
            self.tap.push(mono / channels as f32 * self.intensity_gain);
            self.frames_rendered += 1;
        }
    }
}

impl SourceNode {
    /// Writes one output frame; returns false once the buffer is exhausted.
    fn read_frame(&mut self, out: &mut [f32]) -> bool {
        let frames = self.buffer.frames();
        if self.position >= frames as f64 {
            return false;
        }

        let i0 = self.position.floor() as usize;
        let i1 = (i0 + 1).min(frames - 1);
        let frac = (self.position - i0 as f64) as f32;
        let source_channels = self.buffer.channel_count();

        if out.len() == 1 && source_channels > 1 {
            let sum: f32 = self
                .buffer
                .channels
                .iter()
                .map(|ch| ch[i0] + (ch[i1] - ch[i0]) * frac)
                .sum();
            out[0] = sum / source_channels as f32;
        } else {
            for (c, slot) in out.iter_mut().enumerate() {
                let ch = &self.buffer.channels[c % source_channels];
                *slot = ch[i0] + (ch[i1] - ch[i0]) * frac;
            }
        }

        self.position += self.step * self.rate;
        true
    }
}

impl AnalysisTap {
    fn push(&mut self, sample: f32) {
        self.ring[self.write] = sample;
        self.write = (self.write + 1) % self.ring.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::constant_buffer;

    #[test]
    fn test_gain_stages_are_independent() {
        let graph = AudioGraph::new(1000, 1, 64);
        graph.set_intensity_gain(2.0);
        graph.set_volume_gain(0.25);
        graph.start_source(Arc::new(constant_buffer(0.5, 1.0, 1000)), 0.0, 1.0).unwrap();

        let mut out = vec![0.0; 64];
        graph.render(&mut out);
        assert!(out.iter().all(|s| (s - 0.125).abs() < 1e-6));

        let mut tapped = vec![0.0; 64];
        graph.copy_analysis(&mut tapped);
        assert!(tapped.iter().all(|s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_clock_and_end_of_buffer() {
        let graph = AudioGraph::new(1000, 2, 64);
        let id = graph.start_source(Arc::new(constant_buffer(0.1, 0.5, 1000)), 0.0, 1.0).unwrap();

        graph.render_offline(400);
        assert!(graph.take_ended().is_empty());
        assert!((graph.current_time() - 0.4).abs() < 1e-9);

        graph.render_offline(200);
        assert_eq!(graph.take_ended(), vec![id]);
        assert_eq!(graph.active_source(), None);
        assert!((graph.current_time() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_rate_and_resampling_step() {
        // 2 kHz buffer on a 1 kHz graph at double speed covers four buffer frames per graph frame.
        let graph = AudioGraph::new(1000, 1, 64);
        let id = graph.start_source(Arc::new(constant_buffer(0.1, 1.0, 2000)), 0.0, 2.0).unwrap();
        graph.render_offline(499);
        assert!(graph.take_ended().is_empty());
        graph.render_offline(2);
        assert_eq!(graph.take_ended(), vec![id]);
    }

    #[test]
    fn test_stopped_source_is_not_reported_ended() {
        let graph = AudioGraph::new(1000, 1, 64);
        graph.start_source(Arc::new(constant_buffer(0.1, 0.01, 1000)), 0.0, 1.0).unwrap();
        assert!(graph.stop_source().is_some());
        graph.render_offline(100);
        assert!(graph.take_ended().is_empty());
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let graph = AudioGraph::new(1000, 1, 64);
        let empty = Arc::new(PcmBuffer::new(1000, vec![Vec::new()]));
        assert!(matches!(graph.start_source(empty, 0.0, 1.0), Err(Error::Graph(_))));
        assert_eq!(graph.active_source(), None);
    }
}
