//! Application context: owns the player, the render pipeline and the
//! collaborators, and applies the queue policy on top of player events.

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tiny_skia::Pixmap;
use tokio::runtime::Handle;

use crate::audio::{
    AudioGraph, AudioPlayer, BeatAnalysisWorker, BeatDetector, GraphAnalysis, PlayerEvent, PlayerState,
};
use crate::effects::PresetManager;
use crate::integrations::{MetadataCache, PresenceReporter, PresenceSnapshot, PresenceTracker};
use crate::library::{scan_folder, Track};
use crate::render_loop::{FrameContext, FrameScheduler, FrameToken, PlaybackClock, RenderLoop, TickOutcome};
use crate::settings::SettingsStore;
use crate::visualizers::{default_registry, SettingValue, SurfaceDescriptor, VisualizerRegistry};

/// Collaborators handed to [`App::new`].
pub struct Services {
    pub settings: SettingsStore,
    pub presence: Box<dyn PresenceReporter>,
    pub metadata: Arc<dyn MetadataCache>,
}

pub struct App {
    player: AudioPlayer,
    events: Receiver<PlayerEvent>,
    analysis: GraphAnalysis,
    registry: VisualizerRegistry,
    render: RenderLoop,
    beat: BeatDetector,
    beat_worker: BeatAnalysisWorker,
    presets: PresetManager,
    settings: SettingsStore,
    presence: PresenceTracker,
    metadata: Arc<dyn MetadataCache>,
    pixmap: Pixmap,
    autoplay: bool,
}

impl App {
    pub fn new(graph: AudioGraph, runtime: Handle, services: Services, width: u32, height: u32) -> Result<Self> {
        let Services {
            settings,
            presence,
            metadata,
        } = services;
        let saved = settings.get().clone();

        let analysis = GraphAnalysis::new(graph.clone());
        let mut player = AudioPlayer::with_defaults(graph, runtime.clone());
        // Restored before subscribing so the restore is not echoed back into the file.
        player.set_volume(saved.volume);
        player.set_intensity(saved.intensity_gain_db);
        player.set_playback_rate(saved.playback_rate);
        let events = player.subscribe();

        let mut presets = PresetManager::new();
        if let Some(name) = &saved.theme_preset {
            if !presets.select(name) {
                warn!("⚠️  Unknown theme preset '{}'. Falling back to {}", name, presets.current().name);
            }
        }

        let (width, height) = (width.max(1), height.max(1));
        let mut registry = default_registry();
        registry.init(SurfaceDescriptor::new(width, height, presets.current().theme));

        for (visualizer, values) in &saved.visualizers {
            for (key, value) in values {
                if let Err(e) = registry.apply_setting(visualizer, key, value) {
                    warn!("⚠️  Ignoring saved setting {}.{}: {}", visualizer, key, e);
                }
            }
        }
        if let Some(name) = &saved.active_visualizer {
            if let Err(e) = registry.activate(name) {
                warn!("⚠️  {}. Falling back to {}", e, registry.current_name().unwrap_or("none"));
            }
        }

        let mut render = RenderLoop::new(analysis.bin_count(), saved.fps_cap);
        render.set_flash_decay(Some(saved.beat_flash_decay));

        let pixmap = Pixmap::new(width, height).context("Failed to allocate frame buffer")?;
        let beat = BeatDetector::new();

        info!(
            "✅ App initialized: {}x{}, visualizer {}, theme {}",
            width,
            height,
            registry.current_name().unwrap_or("none"),
            presets.current().name
        );

        Ok(Self {
            player,
            events,
            analysis,
            registry,
            render,
            beat_worker: BeatAnalysisWorker::new(runtime).with_config(*beat.tempo_config()),
            beat,
            presets,
            presence: PresenceTracker::new(presence, saved.presence_enabled),
            settings,
            metadata,
            pixmap,
            autoplay: false,
        })
    }

    pub fn player(&self) -> &AudioPlayer {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut AudioPlayer {
        &mut self.player
    }

    pub fn registry(&self) -> &VisualizerRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn beat_detector(&self) -> &BeatDetector {
        &self.beat
    }

    pub fn presets(&self) -> &PresetManager {
        &self.presets
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render
    }

    /// Scans `folder` and replaces the queue with what was found.
    pub fn open_folder(&mut self, folder: &Path, include_subfolders: bool) -> Result<usize> {
        let tracks = scan_folder(folder, include_subfolders)
            .with_context(|| format!("Failed to open folder {}", folder.display()))?;
        for track in &tracks {
            self.remember_tags(track);
        }

        let count = tracks.len();
        self.player.set_tracks(tracks);
        self.settings.update(|s| {
            s.last_opened_folder = Some(folder.to_path_buf());
            s.include_subfolders = include_subfolders;
        });
        Ok(count)
    }

    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.player.set_tracks(tracks);
    }

    fn remember_tags(&self, track: &Track) {
        if track.title.is_none() && track.artist.is_none() && track.album.is_none() {
            return;
        }
        let mut entry = self.metadata.get(&track.path).unwrap_or_default();
        entry.title = track.title.clone();
        entry.artist = track.artist.clone();
        entry.album = track.album.clone();
        self.metadata.put(&track.path, entry);
    }

    /// Loads track `index` and starts it once decoded.
    ///
    /// The beat grid of the current track stays in place until the new one
    /// has actually loaded; a failed load leaves it untouched.
    pub fn play_track(&mut self, index: usize) -> Result<()> {
        self.player.load_file(index)?;
        self.autoplay = true;
        Ok(())
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        match self.player.state() {
            PlayerState::Playing => {
                self.player.pause();
            }
            PlayerState::Loaded | PlayerState::Paused | PlayerState::Stopped => self.player.play()?,
            PlayerState::Loading => self.autoplay = !self.autoplay,
            PlayerState::Empty => {
                if self.player.track_count() > 0 {
                    self.play_track(0)?;
                }
            }
        }
        Ok(())
    }

    /// Advances the queue; does nothing on the last track.
    pub fn next_track(&mut self) -> Result<bool> {
        let next = self.player.current_index().map_or(0, |i| i + 1);
        if next >= self.player.track_count() {
            return Ok(false);
        }
        self.play_track(next)?;
        Ok(true)
    }

    /// Goes back one track, or rewinds when already on the first.
    pub fn previous_track(&mut self) -> Result<bool> {
        match self.player.current_index() {
            Some(i) if i > 0 => {
                self.play_track(i - 1)?;
                Ok(true)
            }
            Some(_) => {
                self.player.seek_to(0.0);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    pub fn seek_by(&mut self, delta: f64) -> f64 {
        let target = self.player.current_time() + delta;
        self.player.seek_to(target)
    }

    pub fn select_visualizer(&mut self, name: &str) -> Result<()> {
        self.registry.activate(name)?;
        let active = self.registry.current_name().map(str::to_string);
        self.settings.update(|s| s.active_visualizer = active);
        self.refresh_presence();
        Ok(())
    }

    /// Selects by menu position, zero-based.
    pub fn select_visualizer_index(&mut self, index: usize) -> Result<()> {
        let name = self
            .registry
            .list()
            .get(index)
            .copied()
            .with_context(|| format!("No visualizer at position {}", index + 1))?;
        self.select_visualizer(name)
    }

    /// Validates, applies and persists one visualizer setting.
    pub fn apply_visualizer_setting(&mut self, visualizer: &str, key: &str, value: SettingValue) -> Result<SettingValue> {
        let applied = self.registry.apply_setting(visualizer, key, &value)?;
        let stored = applied.clone();
        self.settings
            .update(|s| s.set_visualizer_setting(visualizer, key, stored));
        Ok(applied)
    }

    pub fn cycle_theme(&mut self) -> &str {
        let preset = self.presets.next().clone();
        self.registry.set_theme(preset.theme);
        info!("🎨 Theme: {}", preset.name);
        let name = preset.name.clone();
        self.settings.update(|s| s.theme_preset = Some(name));
        &self.presets.current().name
    }

    pub fn toggle_beat_detection(&mut self) -> bool {
        let enabled = !self.settings.get().beat_detection;
        self.settings.update(|s| s.beat_detection = enabled);
        info!("🥁 Beat detection {}", if enabled { "on" } else { "off" });

        if enabled && self.beat.bpm() <= 0.0 {
            self.analyze_current();
        }
        enabled
    }

    pub fn set_fps_cap(&mut self, fps: Option<u32>) {
        self.render.set_fps_cap(fps);
        self.settings.update(|s| s.fps_cap = fps);
    }

    pub fn set_presence_enabled(&mut self, enabled: bool) {
        self.presence.set_enabled(enabled);
        self.settings.update(|s| s.presence_enabled = enabled);
        self.refresh_presence();
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        if self.pixmap.width() == width && self.pixmap.height() == height {
            return Ok(());
        }
        self.pixmap = Pixmap::new(width, height).context("Failed to allocate frame buffer")?;
        self.registry.resize(width, height);
        debug!("Resized to {}x{}", width, height);
        Ok(())
    }

    pub fn start_rendering(&mut self, scheduler: &mut dyn FrameScheduler) -> bool {
        self.render.start(scheduler)
    }

    pub fn stop_rendering(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.render.stop(scheduler);
    }

    /// Drives one frame of the render loop into the app's pixmap.
    pub fn frame(&mut self, token: FrameToken, now: Instant, scheduler: &mut dyn FrameScheduler) -> TickOutcome {
        let beat = if self.settings.get().beat_detection {
            Some((&mut self.beat, &self.player as &dyn PlaybackClock))
        } else {
            None
        };
        let ctx = FrameContext {
            analysis: &mut self.analysis,
            registry: &mut self.registry,
            beat,
            pixmap: &mut self.pixmap,
        };
        self.render.on_frame(token, now, scheduler, ctx)
    }

    /// Applies player events and finished background work. Call once per tick.
    pub fn pump(&mut self) {
        self.player.poll();

        let events: Vec<PlayerEvent> = self.events.try_iter().collect();
        for event in events {
            self.handle_event(event);
        }

        if let Some(job) = self.beat_worker.poll() {
            let current = self.player.current_track().map(|t| t.path.clone());
            if current.as_deref() != Some(job.path.as_path()) {
                debug!("Dropping tempo for {} (no longer current)", job.path.display());
                return;
            }
            let analysis = self.beat.apply(job.result);
            if analysis.success {
                let mut entry = self.metadata.get(&job.path).unwrap_or_default();
                entry.bpm = Some(analysis.bpm);
                entry.beat_offset = Some(analysis.beat_offset);
                self.metadata.put(&job.path, entry);
            }
        }
    }

    fn handle_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::FileLoaded { track, .. } => {
                self.beat_worker.cancel();
                self.beat.reset();
                let cached = self.metadata.get(&track.path).and_then(|m| m.tempo());
                match cached {
                    Some((bpm, offset)) => {
                        info!("🥁 Cached tempo for {}: {} BPM", track.name, bpm);
                        self.beat.set_bpm(bpm, offset);
                    }
                    None => self.analyze_current(),
                }
                if std::mem::take(&mut self.autoplay) {
                    if let Err(e) = self.player.play() {
                        warn!("⚠️  Autoplay failed: {}", e);
                    }
                }
                self.refresh_presence();
            }
            PlayerEvent::Ended { index } => {
                if index + 1 < self.player.track_count() {
                    if let Err(e) = self.play_track(index + 1) {
                        warn!("⚠️  Could not advance the queue: {}", e);
                    }
                } else {
                    info!("Reached the end of the queue");
                    self.refresh_presence();
                }
            }
            PlayerEvent::VolumeChange(volume) => self.settings.update(|s| s.volume = volume),
            PlayerEvent::IntensityChange(db) => self.settings.update(|s| s.intensity_gain_db = db),
            PlayerEvent::PlaybackRateChange(rate) => {
                self.settings.update(|s| s.playback_rate = rate);
                self.refresh_presence();
            }
            PlayerEvent::Play { .. } | PlayerEvent::Pause | PlayerEvent::Stop | PlayerEvent::Seek { .. } => {
                self.refresh_presence()
            }
            PlayerEvent::ExternalStarted => {
                self.beat_worker.cancel();
                self.beat.reset();
            }
            PlayerEvent::Error(e) => {
                warn!("⚠️  Player error: {}", e);
                self.autoplay = false;
            }
        }
    }

    fn analyze_current(&mut self) {
        if !self.settings.get().beat_detection {
            return;
        }
        let (Some(track), Some(buffer)) = (self.player.current_track(), self.player.buffer()) else {
            return;
        };
        let path = track.path.clone();
        let buffer = Arc::clone(buffer);
        debug!("Analysing tempo of {}", path.display());
        self.beat_worker.request(path, buffer);
    }

    fn refresh_presence(&mut self) {
        if !self.presence.is_enabled() {
            return;
        }
        let duration = self.player.duration();
        let remaining = (duration > 0.0)
            .then(|| (duration - self.player.current_time()) / self.player.playback_rate());
        self.presence.update(PresenceSnapshot {
            visualizer: self.registry.current_name().unwrap_or("nothing"),
            track: self.player.current_track().map(|t| &**t),
            is_playing: self.player.is_playing(),
            remaining,
        });
    }
}
