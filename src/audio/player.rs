use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use super::{
    AudioGraph, EventBus, FileSource, LocalFileSource, PcmBuffer, PlayerEvent, RodioDecoder,
    SourceId, TrackDecoder,
};
use crate::error::{Error, Result};
use crate::integrations::ExternalStream;
use crate::library::Track;

pub const MIN_INTENSITY_DB: f32 = -24.0;
pub const MAX_INTENSITY_DB: f32 = 12.0;
pub const MIN_PLAYBACK_RATE: f64 = 0.25;
pub const MAX_PLAYBACK_RATE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Empty,
    Loading,
    Loaded,
    Playing,
    Paused,
    Stopped,
}

struct LoadOutcome {
    generation: u64,
    index: usize,
    track: Arc<Track>,
    result: Result<PcmBuffer>,
}

/// Queue-aware playback over the fixed [`AudioGraph`].
///
/// Loading is asynchronous: `load_file` hands the read and decode to the tokio
/// runtime and returns immediately. Results come back through [`poll`](Self::poll),
/// which also notices when the active source runs out. Every load bumps a
/// generation counter so a slow decode that was superseded is dropped on arrival.
pub struct AudioPlayer {
    graph: AudioGraph,
    runtime: Handle,
    files: Arc<dyn FileSource>,
    decoder: Arc<dyn TrackDecoder>,

    tracks: Vec<Arc<Track>>,
    state: PlayerState,
    state_before_load: PlayerState,
    current_index: Option<usize>,
    current_track: Option<Arc<Track>>,
    buffer: Option<Arc<PcmBuffer>>,
    source: Option<SourceId>,

    // Track position = anchor_offset + (graph clock - start_clock) * rate
    start_clock: f64,
    anchor_offset: f64,
    pause_offset: f64,

    volume: f32,
    intensity_db: f32,
    rate: f64,

    generation: u64,
    pending_load: Option<u64>,
    load_tx: Sender<LoadOutcome>,
    load_rx: Receiver<LoadOutcome>,

    events: EventBus,
    external: Option<Box<dyn ExternalStream>>,
    external_active: bool,
}

impl AudioPlayer {
    pub fn new(
        graph: AudioGraph,
        runtime: Handle,
        files: Arc<dyn FileSource>,
        decoder: Arc<dyn TrackDecoder>,
    ) -> Self {
        let (load_tx, load_rx) = crossbeam_channel::unbounded();

        Self {
            graph,
            runtime,
            files,
            decoder,
            tracks: Vec::new(),
            state: PlayerState::Empty,
            state_before_load: PlayerState::Empty,
            current_index: None,
            current_track: None,
            buffer: None,
            source: None,
            start_clock: 0.0,
            anchor_offset: 0.0,
            pause_offset: 0.0,
            volume: 1.0,
            intensity_db: 0.0,
            rate: 1.0,
            generation: 0,
            pending_load: None,
            load_tx,
            load_rx,
            events: EventBus::new(),
            external: None,
            external_active: false,
        }
    }

    /// Player reading from disk and decoding through rodio.
    pub fn with_defaults(graph: AudioGraph, runtime: Handle) -> Self {
        Self::new(graph, runtime, Arc::new(LocalFileSource), Arc::new(RodioDecoder))
    }

    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    /// Replaces the queue. The loaded buffer survives; its index is re-resolved by path.
    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks.into_iter().map(Arc::new).collect();
        self.current_index = self.current_track.as_ref().and_then(|current| {
            self.tracks.iter().position(|t| t.path == current.path)
        });
        info!("📂 Queue holds {} tracks", self.tracks.len());
    }

    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_track(&self) -> Option<&Arc<Track>> {
        self.current_track.as_ref()
    }

    pub fn buffer(&self) -> Option<&Arc<PcmBuffer>> {
        self.buffer.as_ref()
    }

    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration())
    }

    /// Position within the loaded track, in track seconds.
    pub fn current_time(&self) -> f64 {
        if self.state != PlayerState::Playing {
            return self.pause_offset;
        }
        let elapsed = (self.graph.current_time() - self.start_clock).max(0.0);
        (self.anchor_offset + elapsed * self.rate).min(self.duration())
    }

    /// Starts reading and decoding track `index`. Completion arrives through `poll`.
    pub fn load_file(&mut self, index: usize) -> Result<()> {
        let track = self
            .tracks
            .get(index)
            .cloned()
            .ok_or(Error::InvalidIndex {
                index,
                count: self.tracks.len(),
            })?;

        self.stop();

        self.generation += 1;
        let generation = self.generation;
        self.state_before_load = self.state;
        self.state = PlayerState::Loading;
        self.pending_load = Some(generation);

        info!("Loading track {}: {}", index, track.name);

        let files = Arc::clone(&self.files);
        let decoder = Arc::clone(&self.decoder);
        let tx = self.load_tx.clone();
        self.runtime.spawn(async move {
            let result = match files.read_bytes(&track.path).await {
                Ok(bytes) => tokio::task::spawn_blocking(move || decoder.decode(bytes))
                    .await
                    .unwrap_or_else(|e| Err(Error::Decode(format!("decoder task failed: {e}")))),
                Err(e) => Err(e),
            };
            // The receiver only disappears when the player is dropped.
            let _ = tx.send(LoadOutcome {
                generation,
                index,
                track,
                result,
            });
        });

        Ok(())
    }

    /// Applies finished loads and detects natural end of playback. Call once per tick.
    pub fn poll(&mut self) {
        while let Ok(outcome) = self.load_rx.try_recv() {
            self.apply_load(outcome);
        }

        let ended = self.graph.take_ended();
        if let Some(id) = self.source {
            if ended.contains(&id) {
                self.finish_naturally();
            }
        }
    }

    /// Blocks until the pending load resolves. Returns false on timeout.
    pub fn wait_for_load(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending_load.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.load_rx.recv_timeout(remaining) {
                Ok(outcome) => self.apply_load(outcome),
                Err(_) => return false,
            }
        }
        true
    }

    fn apply_load(&mut self, outcome: LoadOutcome) {
        if self.pending_load != Some(outcome.generation) {
            debug!(
                "Discarding stale decode of track {} (generation {}, current {})",
                outcome.index, outcome.generation, self.generation
            );
            return;
        }
        self.pending_load = None;

        match outcome.result {
            Ok(buffer) => {
                let buffer = Arc::new(buffer);
                let duration = buffer.duration();
                info!(
                    "✅ Loaded {} ({:.1}s, {} Hz, {} ch)",
                    outcome.track.name,
                    duration,
                    buffer.sample_rate,
                    buffer.channel_count()
                );

                self.buffer = Some(Arc::clone(&buffer));
                self.current_index = Some(outcome.index);
                self.current_track = Some(Arc::clone(&outcome.track));
                self.pause_offset = 0.0;
                self.state = PlayerState::Loaded;
                self.events.emit(PlayerEvent::FileLoaded {
                    track: outcome.track,
                    index: outcome.index,
                    duration,
                    buffer,
                });
            }
            Err(e) => {
                warn!("⚠️  Failed to load {}: {}", outcome.track.name, e);
                self.state = self.state_before_load;
                self.events.emit(PlayerEvent::Error(e));
            }
        }
    }

    pub fn play(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Loading => return Err(Error::NotReady("a track is still loading")),
            PlayerState::Playing => return Err(Error::NotReady("already playing")),
            _ => {}
        }
        let buffer = self
            .buffer
            .clone()
            .ok_or(Error::NotReady("no track loaded"))?;
        let track = self
            .current_track
            .clone()
            .ok_or(Error::NotReady("no track loaded"))?;

        self.silence_external();
        self.start_at(buffer, self.pause_offset)?;
        self.state = PlayerState::Playing;
        info!("▶️  Playing {} from {:.2}s", track.name, self.pause_offset);
        self.events.emit(PlayerEvent::Play { track });
        Ok(())
    }

    fn start_at(&mut self, buffer: Arc<PcmBuffer>, offset: f64) -> Result<()> {
        let clock = self.graph.current_time();
        let id = self.graph.start_source(buffer, offset, self.rate)?;
        self.source = Some(id);
        self.start_clock = clock;
        self.anchor_offset = offset;
        Ok(())
    }

    pub fn pause(&mut self) -> bool {
        if self.state != PlayerState::Playing {
            return false;
        }
        self.pause_offset = self.current_time();
        self.graph.stop_source();
        self.source = None;
        self.state = PlayerState::Paused;
        info!("⏸️  Paused at {:.2}s", self.pause_offset);
        self.events.emit(PlayerEvent::Pause);
        true
    }

    /// Tears playback down from any state. Also abandons a pending load.
    pub fn stop(&mut self) -> bool {
        if self.pending_load.take().is_some() {
            self.generation += 1;
            self.state = self.state_before_load;
        }
        if self.source.take().is_some() {
            self.graph.stop_source();
        }
        self.pause_offset = 0.0;

        let next = if self.buffer.is_some() {
            PlayerState::Stopped
        } else {
            PlayerState::Empty
        };
        let changed = self.state != next;
        self.state = next;
        if changed {
            info!("⏹️  Stopped");
            self.events.emit(PlayerEvent::Stop);
        }
        changed
    }

    /// Moves to `time` (clamped to the track) and keeps playing if it was.
    pub fn seek_to(&mut self, time: f64) -> f64 {
        let time = if time.is_finite() {
            time.clamp(0.0, self.duration())
        } else {
            0.0
        };

        if self.state == PlayerState::Playing {
            if let Some(buffer) = self.buffer.clone() {
                self.graph.stop_source();
                if let Err(e) = self.start_at(buffer, time) {
                    warn!("⚠️  Seek restart failed: {}", e);
                    self.source = None;
                    self.pause_offset = time;
                    self.state = PlayerState::Paused;
                    self.events.emit(PlayerEvent::Error(e));
                    self.events.emit(PlayerEvent::Pause);
                }
            }
        } else {
            self.pause_offset = time;
        }

        debug!("Seek to {:.3}s", time);
        self.events.emit(PlayerEvent::Seek { time });
        time
    }

    fn finish_naturally(&mut self) {
        let index = self.current_index.unwrap_or(0);
        self.source = None;
        self.pause_offset = 0.0;
        self.state = PlayerState::Paused;
        info!("Track {} finished", index);
        self.events.emit(PlayerEvent::Pause);
        self.events.emit(PlayerEvent::Ended { index });
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        if volume.is_nan() {
            return self.volume;
        }
        self.volume = volume.clamp(0.0, 1.0);
        self.graph.set_volume_gain(self.volume);
        if let Some(external) = self.external.as_mut() {
            external.set_volume(self.volume);
        }
        self.events.emit(PlayerEvent::VolumeChange(self.volume));
        self.volume
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Gain actually applied after the analysis tap.
    pub fn output_gain(&self) -> f32 {
        self.graph.volume_gain()
    }

    /// Sets the pre-analysis gain in dB; only the visuals react to it.
    pub fn set_intensity(&mut self, db: f32) -> f32 {
        if db.is_nan() {
            return self.intensity_db;
        }
        self.intensity_db = db.clamp(MIN_INTENSITY_DB, MAX_INTENSITY_DB);
        self.graph.set_intensity_gain(10f32.powf(self.intensity_db / 20.0));
        self.events.emit(PlayerEvent::IntensityChange(self.intensity_db));
        self.intensity_db
    }

    pub fn intensity_db(&self) -> f32 {
        self.intensity_db
    }

    pub fn intensity_gain(&self) -> f32 {
        self.graph.intensity_gain()
    }

    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        if rate.is_nan() {
            return self.rate;
        }
        let rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        if self.state == PlayerState::Playing {
            // Re-anchor so the position so far keeps the old rate.
            self.anchor_offset = self.current_time();
            self.start_clock = self.graph.current_time();
            self.graph.set_source_rate(rate);
        }
        self.rate = rate;
        self.events.emit(PlayerEvent::PlaybackRateChange(rate));
        rate
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    pub fn attach_external(&mut self, stream: Box<dyn ExternalStream>) {
        if self.external_active {
            self.silence_external();
        }
        self.external = Some(stream);
    }

    /// Hands the output to the external stream, pausing local playback.
    pub fn start_external(&mut self) -> Result<()> {
        if self.external.is_none() {
            return Err(Error::NotReady("no external stream attached"));
        }
        self.pause();

        let volume = self.volume;
        if let Some(external) = self.external.as_mut() {
            external.set_volume(volume);
            external.play().map_err(|e| Error::External(e.to_string()))?;
        }
        self.external_active = true;
        info!("External stream took over the output");
        self.events.emit(PlayerEvent::ExternalStarted);
        Ok(())
    }

    pub fn stop_external(&mut self) {
        self.silence_external();
    }

    pub fn is_external_active(&self) -> bool {
        self.external_active
    }

    pub fn external_time(&self) -> Option<f64> {
        self.external
            .as_ref()
            .filter(|_| self.external_active)
            .map(|external| external.current_time())
    }

    fn silence_external(&mut self) {
        if !self.external_active {
            return;
        }
        if let Some(external) = self.external.as_mut() {
            if let Err(e) = external.pause() {
                warn!("⚠️  External stream refused to pause: {}", e);
            }
        }
        self.external_active = false;
    }

    pub fn track_path(&self, index: usize) -> Option<PathBuf> {
        self.tracks.get(index).map(|t| t.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::DetachedStream;
    use crate::test_support::{constant_buffer, runtime, write_sine_wav};
    use std::path::Path;

    const WAIT: Duration = Duration::from_secs(10);

    fn player_with(rt: &tokio::runtime::Runtime, paths: &[&Path]) -> AudioPlayer {
        let graph = AudioGraph::new(8000, 1, 256);
        let mut player = AudioPlayer::with_defaults(graph, rt.handle().clone());
        player.set_tracks(paths.iter().map(|p| Track::from_path(p)).collect());
        player
    }

    fn drain(rx: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        rx.try_iter().collect()
    }

    /// A player with a one-second constant buffer installed, bypassing the decoder.
    fn loaded_player(rt: &tokio::runtime::Runtime) -> AudioPlayer {
        let mut player = player_with(rt, &[]);
        player.buffer = Some(Arc::new(constant_buffer(0.2, 1.0, 8000)));
        player.current_track = Some(Arc::new(Track::from_path(Path::new("/tmp/fixture.wav"))));
        player.current_index = Some(0);
        player.state = PlayerState::Loaded;
        player
    }

    #[test]
    fn test_volume_clamps_and_reads_back() {
        let rt = runtime();
        let mut player = player_with(&rt, &[]);

        for v in [0.0, 0.33, 1.0] {
            assert_eq!(player.set_volume(v), v);
            assert_eq!(player.output_gain(), v);
        }
        assert_eq!(player.set_volume(1.7), 1.0);
        assert_eq!(player.set_volume(-0.2), 0.0);
        assert_eq!(player.output_gain(), 0.0);
        // The analysis side is untouched by volume.
        assert_eq!(player.intensity_gain(), 1.0);
    }

    #[test]
    fn test_intensity_clamps_and_converts() {
        let rt = runtime();
        let mut player = player_with(&rt, &[]);

        assert_eq!(player.set_intensity(6.0), 6.0);
        assert!((player.intensity_gain() - 10f32.powf(6.0 / 20.0)).abs() < 1e-6);
        assert_eq!(player.set_intensity(40.0), MAX_INTENSITY_DB);
        assert_eq!(player.set_intensity(-99.0), MIN_INTENSITY_DB);
        assert!((player.intensity_gain() - 10f32.powf(-24.0 / 20.0)).abs() < 1e-6);
        assert_eq!(player.output_gain(), 1.0);
    }

    #[test]
    fn test_playback_rate_clamps() {
        let rt = runtime();
        let mut player = player_with(&rt, &[]);
        assert_eq!(player.set_playback_rate(10.0), MAX_PLAYBACK_RATE);
        assert_eq!(player.set_playback_rate(0.0), MIN_PLAYBACK_RATE);
        assert_eq!(player.set_playback_rate(1.5), 1.5);
    }

    #[test]
    fn test_corrupt_file_does_not_poison_later_loads() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("01 broken.mp3");
        std::fs::write(&bad, b"this is not an mp3 stream at all").unwrap();
        let good = dir.path().join("02 tone.wav");
        write_sine_wav(&good, 220.0, 0.25, 8000, 1);
        let other = dir.path().join("03 tone.wav");
        write_sine_wav(&other, 330.0, 0.25, 8000, 1);

        let mut player = player_with(&rt, &[&bad, &good, &other]);
        let events = player.subscribe();

        player.load_file(0).unwrap();
        assert!(player.wait_for_load(WAIT));
        assert_eq!(player.state(), PlayerState::Empty);
        assert!(player.buffer().is_none());
        assert!(drain(&events)
            .iter()
            .any(|e| matches!(e, PlayerEvent::Error(Error::Decode(_)))));

        player.load_file(1).unwrap();
        assert!(player.wait_for_load(WAIT));
        assert_eq!(player.state(), PlayerState::Loaded);
        assert_eq!(player.current_index(), Some(1));
        assert!((player.duration() - 0.25).abs() < 0.01);
        assert!(drain(&events)
            .iter()
            .any(|e| matches!(e, PlayerEvent::FileLoaded { index: 1, .. })));
    }

    #[test]
    fn test_failed_load_keeps_previous_track() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        write_sine_wav(&good, 220.0, 0.25, 8000, 1);
        let missing = dir.path().join("missing.wav");

        let mut player = player_with(&rt, &[&good, &missing]);
        player.load_file(0).unwrap();
        assert!(player.wait_for_load(WAIT));

        player.load_file(1).unwrap();
        assert!(player.wait_for_load(WAIT));
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(player.current_index(), Some(0));
        assert!(player.play().is_ok());
    }

    #[test]
    fn test_invalid_index_is_rejected() {
        let rt = runtime();
        let mut player = player_with(&rt, &[]);
        assert_eq!(
            player.load_file(3),
            Err(Error::InvalidIndex { index: 3, count: 0 })
        );
        assert_eq!(player.state(), PlayerState::Empty);
    }

    #[test]
    fn test_play_is_gated_while_loading_and_stop_supersedes() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("tone.wav");
        write_sine_wav(&good, 220.0, 0.25, 8000, 1);

        let mut player = player_with(&rt, &[&good]);
        let events = player.subscribe();
        player.load_file(0).unwrap();
        assert_eq!(player.state(), PlayerState::Loading);
        assert!(matches!(player.play(), Err(Error::NotReady(_))));

        player.stop();
        assert!(!player.is_loading());
        std::thread::sleep(Duration::from_millis(300));
        player.poll();
        assert_eq!(player.state(), PlayerState::Empty);
        assert!(!drain(&events)
            .iter()
            .any(|e| matches!(e, PlayerEvent::FileLoaded { .. })));
    }

    /// Serves files from disk, holding one path back for `delay`.
    struct SlowFiles {
        slow: PathBuf,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl FileSource for SlowFiles {
        async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
            if path == self.slow.as_path() {
                tokio::time::sleep(self.delay).await;
            }
            LocalFileSource.read_bytes(path).await
        }
    }

    #[test]
    fn test_newer_load_supersedes_pending() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("01 slow.wav");
        write_sine_wav(&first, 220.0, 0.25, 8000, 1);
        let second = dir.path().join("02 fast.wav");
        write_sine_wav(&second, 330.0, 0.5, 8000, 1);

        let files = SlowFiles {
            slow: first.clone(),
            delay: Duration::from_millis(300),
        };
        let graph = AudioGraph::new(8000, 1, 256);
        let mut player = AudioPlayer::new(graph, rt.handle().clone(), Arc::new(files), Arc::new(RodioDecoder));
        player.set_tracks(vec![Track::from_path(&first), Track::from_path(&second)]);
        let events = player.subscribe();

        player.load_file(0).unwrap();
        player.load_file(1).unwrap();
        assert!(player.wait_for_load(WAIT));

        // Let the slow decode of track 0 land, then make sure it is ignored.
        std::thread::sleep(Duration::from_millis(600));
        player.poll();

        assert_eq!(player.state(), PlayerState::Loaded);
        assert_eq!(player.current_index(), Some(1));
        assert!((player.duration() - 0.5).abs() < 0.01);
        let loaded: Vec<usize> = drain(&events)
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::FileLoaded { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(loaded, vec![1]);
    }

    #[test]
    fn test_play_without_buffer_fails() {
        let rt = runtime();
        let mut player = player_with(&rt, &[]);
        assert_eq!(player.play(), Err(Error::NotReady("no track loaded")));
        assert!(!player.pause());
    }

    #[test]
    fn test_seek_is_idempotent_when_stationary() {
        let rt = runtime();
        let mut player = loaded_player(&rt);

        player.seek_to(0.4);
        let first = player.current_time();
        player.seek_to(0.4);
        assert_eq!(player.current_time(), first);
        assert_eq!(first, 0.4);

        assert_eq!(player.seek_to(5.0), 1.0);
        assert_eq!(player.seek_to(-1.0), 0.0);
    }

    #[test]
    fn test_pause_play_round_trip_keeps_position() {
        let rt = runtime();
        let mut player = loaded_player(&rt);
        let graph = player.graph().clone();

        player.play().unwrap();
        graph.render_offline(2000);
        assert!((player.current_time() - 0.25).abs() < 1e-9);

        assert!(player.pause());
        let paused_at = player.current_time();
        graph.render_offline(4000);
        assert_eq!(player.current_time(), paused_at);

        player.play().unwrap();
        assert!((player.current_time() - paused_at).abs() < 1e-9);
        graph.render_offline(800);
        assert!((player.current_time() - (paused_at + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_seek_while_playing_keeps_playing() {
        let rt = runtime();
        let mut player = loaded_player(&rt);
        let graph = player.graph().clone();

        player.play().unwrap();
        graph.render_offline(800);
        player.seek_to(0.6);
        assert!(player.is_playing());
        assert!((player.current_time() - 0.6).abs() < 1e-9);
        graph.render_offline(400);
        assert!((player.current_time() - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_rate_change_rebases_clock() {
        let rt = runtime();
        let mut player = loaded_player(&rt);
        let graph = player.graph().clone();

        player.play().unwrap();
        graph.render_offline(800);
        player.set_playback_rate(2.0);
        graph.render_offline(800);
        assert!((player.current_time() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_natural_end_parks_at_zero() {
        let rt = runtime();
        let mut player = loaded_player(&rt);
        let events = player.subscribe();
        let graph = player.graph().clone();

        player.play().unwrap();
        graph.render_offline(8000 + 16);
        player.poll();

        assert_eq!(player.state(), PlayerState::Paused);
        assert_eq!(player.current_time(), 0.0);
        let events = drain(&events);
        let pause = events.iter().position(|e| matches!(e, PlayerEvent::Pause));
        let ended = events.iter().position(|e| matches!(e, PlayerEvent::Ended { index: 0 }));
        assert!(pause.is_some() && ended.is_some() && pause < ended);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let rt = runtime();
        let mut player = loaded_player(&rt);
        player.play().unwrap();
        assert!(player.stop());
        assert!(!player.stop());
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(player.current_time(), 0.0);
    }

    #[test]
    fn test_latest_start_wins_between_local_and_external() {
        let rt = runtime();
        let mut player = loaded_player(&rt);
        player.attach_external(Box::new(DetachedStream::new()));

        player.play().unwrap();
        player.start_external().unwrap();
        assert!(!player.is_playing());
        assert!(player.is_external_active());

        player.play().unwrap();
        assert!(player.is_playing());
        assert!(!player.is_external_active());
    }
}
