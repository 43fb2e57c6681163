use crossbeam_channel::{Receiver, Sender};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

use super::tempo::{estimate_tempo, TempoConfig, TempoEstimate};
use super::PcmBuffer;
use crate::error::Result;

/// A beat counts if the playhead is at most this far past it.
const BEAT_WINDOW: f64 = 0.05;
pub const DEFAULT_BEAT_DECAY: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatAnalysis {
    pub success: bool,
    pub bpm: f32,
    pub beat_offset: f64,
}

/// Beat grid extrapolated from an offline tempo estimate.
///
/// The detector never listens to live audio; it trusts `bpm` and
/// `beat_offset` and checks the playback position against the grid each tick.
/// Positions are track time, so the grid stays phase-locked at any playback
/// rate: one beat still spans `60 / bpm` track seconds, which is
/// `60 / bpm / rate` seconds of wall time.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    bpm: f32,
    beat_offset: f64,
    last_beat_index: Option<i64>,
    envelope: f32,
    decay: f32,
    config: TempoConfig,
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl BeatDetector {
    pub fn new() -> Self {
        Self {
            bpm: 0.0,
            beat_offset: 0.0,
            last_beat_index: None,
            envelope: 0.0,
            decay: DEFAULT_BEAT_DECAY,
            config: TempoConfig::default(),
        }
    }

    pub fn with_decay(mut self, decay: f32) -> Self {
        self.set_decay(decay);
        self
    }

    pub fn set_decay(&mut self, decay: f32) {
        self.decay = decay.clamp(0.0, 1.0);
    }

    pub fn with_tempo_config(mut self, config: TempoConfig) -> Self {
        self.config = config;
        self
    }

    /// Settings used by [`analyze`](Self::analyze); hand the same to a [`BeatAnalysisWorker`].
    pub fn tempo_config(&self) -> &TempoConfig {
        &self.config
    }

    /// Runs tempo estimation over the whole buffer and installs the result.
    pub fn analyze(&mut self, buffer: &PcmBuffer) -> BeatAnalysis {
        let estimate = estimate_tempo(&buffer.mono(), buffer.sample_rate, &self.config);
        self.apply(estimate)
    }

    /// Installs an estimate produced elsewhere (e.g. by [`BeatAnalysisWorker`]).
    pub fn apply(&mut self, estimate: Result<TempoEstimate>) -> BeatAnalysis {
        match estimate {
            Ok(estimate) => {
                self.set_bpm(estimate.bpm, estimate.offset);
                info!("🥁 BPM detected: {} (offset {:.3}s)", self.bpm, self.beat_offset);
                BeatAnalysis {
                    success: true,
                    bpm: self.bpm,
                    beat_offset: self.beat_offset,
                }
            }
            Err(e) => {
                warn!("⚠️  {}", e);
                self.reset();
                BeatAnalysis {
                    success: false,
                    bpm: 0.0,
                    beat_offset: 0.0,
                }
            }
        }
    }

    /// Installs a tempo from a cache or an external service.
    pub fn set_bpm(&mut self, bpm: f32, offset: f64) {
        self.bpm = if bpm.is_finite() { bpm.round().max(0.0) } else { 0.0 };
        self.beat_offset = if offset.is_finite() { offset } else { 0.0 };
        self.last_beat_index = None;
    }

    pub fn reset(&mut self) {
        self.bpm = 0.0;
        self.beat_offset = 0.0;
        self.last_beat_index = None;
        self.envelope = 0.0;
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn beat_offset(&self) -> f64 {
        self.beat_offset
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    /// True when a beat of the grid falls on this tick.
    pub fn predict_beat(&mut self, position: f64) -> bool {
        self.predict_beat_with_decay(position, self.decay)
    }

    /// Same as [`predict_beat`](Self::predict_beat) with a one-off decay factor.
    pub fn predict_beat_with_decay(&mut self, position: f64, decay: f32) -> bool {
        if self.bpm <= 0.0 || !position.is_finite() {
            self.envelope *= decay;
            return false;
        }

        let interval = 60.0 / self.bpm as f64;
        let index = ((position - self.beat_offset) / interval).floor() as i64;
        let beat_time = index as f64 * interval + self.beat_offset;
        let since = position - beat_time;

        if (0.0..BEAT_WINDOW).contains(&since) && self.last_beat_index != Some(index) {
            self.last_beat_index = Some(index);
            self.envelope = 1.0;
            return true;
        }

        self.envelope *= decay;
        false
    }

    /// Idle tick: fades the envelope without consulting the grid.
    pub fn decay(&mut self) {
        self.envelope *= self.decay;
    }
}

/// Finished background analysis, tagged with the request it answers.
pub struct BeatJob {
    pub generation: u64,
    pub path: PathBuf,
    pub result: Result<TempoEstimate>,
}

/// Runs tempo estimation on the blocking pool so the render loop never waits.
pub struct BeatAnalysisWorker {
    runtime: Handle,
    config: TempoConfig,
    generation: u64,
    tx: Sender<BeatJob>,
    rx: Receiver<BeatJob>,
}

impl BeatAnalysisWorker {
    pub fn new(runtime: Handle) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            runtime,
            config: TempoConfig::default(),
            generation: 0,
            tx,
            rx,
        }
    }

    pub fn with_config(mut self, config: TempoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TempoConfig {
        &self.config
    }

    /// Starts analysing `buffer`; supersedes any request still in flight.
    pub fn request(&mut self, path: PathBuf, buffer: Arc<PcmBuffer>) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let config = self.config;

        self.runtime.spawn_blocking(move || {
            let result = estimate_tempo(&buffer.mono(), buffer.sample_rate, &config);
            let _ = tx.send(BeatJob {
                generation,
                path,
                result,
            });
        });
        generation
    }

    /// Drops any in-flight request's result.
    pub fn cancel(&mut self) {
        self.generation += 1;
    }

    /// Returns the newest finished job that is still current.
    pub fn poll(&mut self) -> Option<BeatJob> {
        let mut latest = None;
        while let Ok(job) = self.rx.try_recv() {
            if job.generation == self.generation {
                latest = Some(job);
            }
        }
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_support::{click_track, runtime};
    use std::time::{Duration, Instant};

    #[test]
    fn test_predicts_beats_at_120_bpm() {
        let mut detector = BeatDetector::new();
        detector.set_bpm(120.0, 0.0);

        let fired: Vec<bool> = [0.001, 0.02, 0.49, 0.51, 1.0]
            .iter()
            .map(|&t| detector.predict_beat(t))
            .collect();
        assert_eq!(fired, vec![true, false, false, true, true]);
        assert_eq!(detector.envelope(), 1.0);
    }

    #[test]
    fn test_envelope_decays_between_beats() {
        let mut detector = BeatDetector::new().with_decay(0.5);
        detector.set_bpm(60.0, 0.0);

        assert!(detector.predict_beat(0.0));
        assert!(!detector.predict_beat(0.3));
        assert_eq!(detector.envelope(), 0.5);
        assert!(!detector.predict_beat_with_decay(0.4, 0.9));
        assert!((detector.envelope() - 0.45).abs() < 1e-6);

        detector.decay();
        assert!((detector.envelope() - 0.225).abs() < 1e-6);
    }

    #[test]
    fn test_zero_bpm_never_fires() {
        let mut detector = BeatDetector::new();
        assert!((0..100).all(|i| !detector.predict_beat(i as f64 * 0.01)));
    }

    #[test]
    fn test_offset_shifts_grid() {
        let mut detector = BeatDetector::new();
        detector.set_bpm(120.0, 0.2);
        assert!(!detector.predict_beat(0.1));
        assert!(detector.predict_beat(0.21));
        assert!(detector.predict_beat(0.72));
    }

    #[test]
    fn test_failed_analysis_resets() {
        let mut detector = BeatDetector::new();
        detector.set_bpm(128.0, 0.1);
        let result = detector.apply(Err(Error::AnalysisUnavailable("no model".into())));

        assert!(!result.success);
        assert_eq!(detector.bpm(), 0.0);
        assert_eq!(detector.beat_offset(), 0.0);
    }

    #[test]
    fn test_analyze_click_track() {
        let mut detector = BeatDetector::new();
        let result = detector.analyze(&click_track(120.0, 0.1, 15.0, 44100));
        assert!(result.success);
        assert_eq!(result.bpm, 120.0);
        assert_eq!(detector.bpm(), 120.0);
    }

    fn wait_for_job(worker: &mut BeatAnalysisWorker) -> BeatJob {
        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            if let Some(job) = worker.poll() {
                return job;
            }
            assert!(Instant::now() < deadline, "analysis never finished");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_worker_uses_its_tempo_range() {
        let rt = runtime();
        let buffer = Arc::new(click_track(120.0, 0.1, 15.0, 44100));

        let mut wide = BeatAnalysisWorker::new(rt.handle().clone());
        wide.request(PathBuf::from("a.wav"), Arc::clone(&buffer));
        assert_eq!(wait_for_job(&mut wide).result.unwrap().bpm, 120.0);

        // A single-tempo window leaves no room for the autocorrelation peak.
        let narrow = TempoConfig {
            min_bpm: 200.0,
            max_bpm: 200.0,
            ..TempoConfig::default()
        };
        let mut worker = BeatAnalysisWorker::new(rt.handle().clone()).with_config(narrow);
        worker.request(PathBuf::from("a.wav"), buffer);
        assert!(matches!(
            wait_for_job(&mut worker).result,
            Err(Error::AnalysisUnavailable(_))
        ));
    }

    #[test]
    fn test_detector_config_carries_to_worker() {
        let rt = runtime();
        let config = TempoConfig {
            min_bpm: 80.0,
            max_bpm: 160.0,
            ..TempoConfig::default()
        };
        let detector = BeatDetector::new().with_tempo_config(config);
        let worker = BeatAnalysisWorker::new(rt.handle().clone()).with_config(*detector.tempo_config());
        assert_eq!(worker.config().min_bpm, 80.0);
        assert_eq!(worker.config().max_bpm, 160.0);
    }

    #[test]
    fn test_worker_drops_superseded_jobs() {
        let rt = runtime();
        let mut worker = BeatAnalysisWorker::new(rt.handle().clone());
        let buffer = Arc::new(click_track(120.0, 0.1, 10.0, 22050));

        worker.request(PathBuf::from("a.wav"), Arc::clone(&buffer));
        let current = worker.request(PathBuf::from("b.wav"), buffer);

        let deadline = Instant::now() + Duration::from_secs(30);
        let job = loop {
            if let Some(job) = worker.poll() {
                break job;
            }
            assert!(Instant::now() < deadline, "analysis never finished");
            std::thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(job.generation, current);
        assert_eq!(job.path, PathBuf::from("b.wav"));
    }
}
