//! Per-frame driver: sample the analysis tap, advance the beat grid, then
//! update and draw the active visualizer.
//!
//! The loop never blocks. Each call to [`RenderLoop::on_frame`] first asks the
//! scheduler for the next frame and then does this frame's work, so a slow or
//! failing draw cannot stall the cadence.

use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiny_skia::Pixmap;
use winit::window::Window;

use crate::audio::{AnalysisSource, AudioPlayer, BeatDetector, SpectralFrame};
use crate::visualizers::VisualizerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

/// Source of display-frame callbacks.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameToken;
    fn cancel_frame(&mut self, token: FrameToken);
}

/// Frames requested through winit redraws.
///
/// The event loop calls [`take_pending`](Self::take_pending) on
/// `RedrawRequested` and hands the token to the render loop.
pub struct WindowScheduler {
    window: Arc<Window>,
    next_id: u64,
    pending: Option<FrameToken>,
}

impl WindowScheduler {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            next_id: 0,
            pending: None,
        }
    }

    pub fn take_pending(&mut self) -> Option<FrameToken> {
        self.pending.take()
    }
}

impl FrameScheduler for WindowScheduler {
    fn request_frame(&mut self) -> FrameToken {
        self.next_id += 1;
        let token = FrameToken(self.next_id);
        self.pending = Some(token);
        self.window.request_redraw();
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        if self.pending == Some(token) {
            self.pending = None;
        }
    }
}

/// Scheduler driven by hand, for headless rendering and tests.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    pending: Option<FrameToken>,
    requested: usize,
    cancelled: usize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<FrameToken> {
        self.pending
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameToken {
        self.next_id += 1;
        self.requested += 1;
        let token = FrameToken(self.next_id);
        self.pending = Some(token);
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        if self.pending == Some(token) {
            self.pending = None;
            self.cancelled += 1;
        }
    }
}

/// Drops frames that arrive faster than the cap.
///
/// After a rendered frame the reference time is pulled back by the overshoot
/// modulo the interval, so the average rate stays on the cap instead of
/// drifting below it.
#[derive(Debug, Clone, Default)]
pub struct FpsCap {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl FpsCap {
    pub fn new(fps: Option<u32>) -> Self {
        let mut cap = Self::default();
        cap.set(fps);
        cap
    }

    /// `None` or zero removes the cap.
    pub fn set(&mut self, fps: Option<u32>) {
        self.interval = fps
            .filter(|&f| f > 0)
            .map(|f| Duration::from_nanos(1_000_000_000 / f as u64));
        self.last = None;
    }

    pub fn fps(&self) -> Option<u32> {
        self.interval
            .map(|i| (1_000_000_000 / i.as_nanos().max(1)) as u32)
    }

    pub fn should_render(&mut self, now: Instant) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };
        let Some(last) = self.last else {
            self.last = Some(now);
            return true;
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed < interval {
            return false;
        }
        let overshoot = (elapsed.as_nanos() % interval.as_nanos()) as u64;
        self.last = Some(now - Duration::from_nanos(overshoot));
        true
    }
}

/// Read-only view of the playback position used for beat prediction.
pub trait PlaybackClock {
    /// Track position in seconds.
    fn current_time(&self) -> f64;
    fn is_playing(&self) -> bool;
}

impl PlaybackClock for AudioPlayer {
    fn current_time(&self) -> f64 {
        AudioPlayer::current_time(self)
    }

    fn is_playing(&self) -> bool {
        AudioPlayer::is_playing(self)
    }
}

/// Everything a frame touches, borrowed for the duration of one tick.
pub struct FrameContext<'a> {
    pub analysis: &'a mut dyn AnalysisSource,
    pub registry: &'a mut VisualizerRegistry,
    /// `None` when beat detection is switched off.
    pub beat: Option<(&'a mut BeatDetector, &'a dyn PlaybackClock)>,
    pub pixmap: &'a mut Pixmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The token was cancelled or superseded; nothing ran.
    Stale,
    /// Held back by the FPS cap.
    Skipped,
    Rendered { drew: bool, beat: bool },
}

pub struct RenderLoop {
    running: bool,
    pending: Option<FrameToken>,
    fps_cap: FpsCap,
    frame: SpectralFrame,
    flash_decay: Option<f32>,
    frames: u64,
}

impl RenderLoop {
    pub fn new(bin_count: usize, fps_cap: Option<u32>) -> Self {
        Self {
            running: false,
            pending: None,
            fps_cap: FpsCap::new(fps_cap),
            frame: SpectralFrame::new(bin_count),
            flash_decay: None,
            frames: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn frame(&self) -> &SpectralFrame {
        &self.frame
    }

    /// Starts requesting frames. Returns false when already running.
    pub fn start(&mut self, scheduler: &mut dyn FrameScheduler) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.pending = Some(scheduler.request_frame());
        info!("🎬 Render loop started");
        true
    }

    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let Some(token) = self.pending.take() {
            scheduler.cancel_frame(token);
        }
        if self.running {
            self.running = false;
            info!("Render loop stopped after {} frames", self.frames);
        }
    }

    pub fn set_fps_cap(&mut self, fps: Option<u32>) {
        self.fps_cap.set(fps);
    }

    pub fn fps_cap(&self) -> Option<u32> {
        self.fps_cap.fps()
    }

    /// Envelope decay used instead of the detector's own on beat ticks.
    pub fn set_flash_decay(&mut self, decay: Option<f32>) {
        self.flash_decay = decay.map(|d| d.clamp(0.0, 1.0));
    }

    pub fn on_frame(
        &mut self,
        token: FrameToken,
        now: Instant,
        scheduler: &mut dyn FrameScheduler,
        ctx: FrameContext<'_>,
    ) -> TickOutcome {
        if !self.running || self.pending != Some(token) {
            debug!("Ignoring stale frame {:?}", token);
            return TickOutcome::Stale;
        }
        self.pending = Some(scheduler.request_frame());

        if !self.fps_cap.should_render(now) {
            return TickOutcome::Skipped;
        }

        ctx.analysis.sample(&mut self.frame);

        // Beat runs before draw so this frame already shows the flash.
        let mut fired = false;
        match ctx.beat {
            Some((detector, clock)) => {
                if clock.is_playing() {
                    let position = clock.current_time();
                    fired = match self.flash_decay {
                        Some(decay) => detector.predict_beat_with_decay(position, decay),
                        None => detector.predict_beat(position),
                    };
                } else {
                    detector.decay();
                }
                ctx.registry.set_beat(detector.envelope());
            }
            None => ctx.registry.set_beat(0.0),
        }

        ctx.registry.update(&self.frame.time_domain, &self.frame.frequency);
        let drew = ctx.registry.draw(ctx.pixmap);
        self.frames += 1;

        TickOutcome::Rendered { drew, beat: fired }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Theme;
    use crate::error::Result;
    use crate::visualizers::{SurfaceDescriptor, Visualizer};
    use std::sync::{Arc, Mutex};

    struct ConstantAnalysis(u8);

    impl AnalysisSource for ConstantAnalysis {
        fn sample(&mut self, frame: &mut SpectralFrame) {
            frame.time_domain.fill(128);
            frame.frequency.fill(self.0);
        }
    }

    struct FixedClock {
        time: f64,
        playing: bool,
    }

    impl PlaybackClock for FixedClock {
        fn current_time(&self) -> f64 {
            self.time
        }

        fn is_playing(&self) -> bool {
            self.playing
        }
    }

    #[derive(Default)]
    struct Seen {
        frequency: Vec<u8>,
        beat_at_draw: f32,
        draws: usize,
    }

    struct Recorder {
        seen: Arc<Mutex<Seen>>,
        beat: f32,
    }

    impl Visualizer for Recorder {
        fn name(&self) -> &'static str {
            "Recorder"
        }

        fn init(&mut self, _surface: &SurfaceDescriptor) {}

        fn update(&mut self, _time_domain: &[u8], frequency: &[u8]) {
            let mut seen = self.seen.lock().unwrap();
            seen.frequency.clear();
            seen.frequency.extend_from_slice(frequency);
        }

        fn draw(&mut self, _pixmap: &mut Pixmap) -> Result<()> {
            let mut seen = self.seen.lock().unwrap();
            seen.beat_at_draw = self.beat;
            seen.draws += 1;
            Ok(())
        }

        fn set_beat(&mut self, envelope: f32) {
            self.beat = envelope;
        }
    }

    fn registry() -> (VisualizerRegistry, Arc<Mutex<Seen>>) {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let mut registry = VisualizerRegistry::new();
        registry
            .register(Box::new(Recorder {
                seen: Arc::clone(&seen),
                beat: 0.0,
            }))
            .unwrap();
        registry.init(SurfaceDescriptor::new(8, 8, Theme::default()));
        (registry, seen)
    }

    #[test]
    fn test_start_never_double_schedules() {
        let mut scheduler = ManualScheduler::new();
        let mut render = RenderLoop::new(16, None);
        assert!(render.start(&mut scheduler));
        assert!(!render.start(&mut scheduler));
        assert_eq!(scheduler.requested(), 1);
    }

    #[test]
    fn test_stop_cancels_and_stale_tokens_are_ignored() {
        let mut scheduler = ManualScheduler::new();
        let mut render = RenderLoop::new(16, None);
        let (mut registry, seen) = registry();
        let mut pixmap = Pixmap::new(8, 8).unwrap();
        let mut analysis = ConstantAnalysis(10);

        render.start(&mut scheduler);
        let token = scheduler.pending().unwrap();
        render.stop(&mut scheduler);
        assert_eq!(scheduler.cancelled(), 1);
        assert_eq!(scheduler.pending(), None);

        let ctx = FrameContext {
            analysis: &mut analysis,
            registry: &mut registry,
            beat: None,
            pixmap: &mut pixmap,
        };
        assert_eq!(render.on_frame(token, Instant::now(), &mut scheduler, ctx), TickOutcome::Stale);
        assert_eq!(seen.lock().unwrap().draws, 0);
        assert_eq!(scheduler.requested(), 1);
    }

    #[test]
    fn test_frame_samples_then_updates_and_reschedules() {
        let mut scheduler = ManualScheduler::new();
        let mut render = RenderLoop::new(16, None);
        let (mut registry, seen) = registry();
        let mut pixmap = Pixmap::new(8, 8).unwrap();
        let mut analysis = ConstantAnalysis(42);

        render.start(&mut scheduler);
        let first = scheduler.pending().unwrap();
        let ctx = FrameContext {
            analysis: &mut analysis,
            registry: &mut registry,
            beat: None,
            pixmap: &mut pixmap,
        };
        let outcome = render.on_frame(first, Instant::now(), &mut scheduler, ctx);

        assert_eq!(outcome, TickOutcome::Rendered { drew: true, beat: false });
        assert_eq!(seen.lock().unwrap().frequency, vec![42; 16]);
        assert_ne!(scheduler.pending(), Some(first));
        assert_eq!(render.frames_rendered(), 1);

        // The consumed token is stale now.
        let ctx = FrameContext {
            analysis: &mut analysis,
            registry: &mut registry,
            beat: None,
            pixmap: &mut pixmap,
        };
        assert_eq!(render.on_frame(first, Instant::now(), &mut scheduler, ctx), TickOutcome::Stale);
    }

    #[test]
    fn test_fps_cap_with_phase_correction() {
        let start = Instant::now();
        let at = |ms: u64| start + Duration::from_millis(ms);
        let mut cap = FpsCap::new(Some(50));

        assert!(cap.should_render(at(0)));
        assert!(!cap.should_render(at(10)));
        assert!(cap.should_render(at(25)));
        // Reference moved back to 20ms, so 40ms is due even though only 15ms passed.
        assert!(cap.should_render(at(40)));
        assert!(!cap.should_render(at(45)));

        cap.set(None);
        assert!(cap.should_render(at(46)));
        assert!(cap.should_render(at(46)));
        assert_eq!(FpsCap::new(Some(0)).fps(), None);
        assert_eq!(FpsCap::new(Some(60)).fps(), Some(60));
    }

    #[test]
    fn test_beat_envelope_reaches_draw_in_the_same_frame() {
        let mut scheduler = ManualScheduler::new();
        let mut render = RenderLoop::new(16, None);
        let (mut registry, seen) = registry();
        let mut pixmap = Pixmap::new(8, 8).unwrap();
        let mut analysis = ConstantAnalysis(0);
        let mut detector = BeatDetector::new();
        detector.set_bpm(120.0, 0.0);
        let clock = FixedClock {
            time: 1.01,
            playing: true,
        };

        render.start(&mut scheduler);
        let token = scheduler.pending().unwrap();
        let ctx = FrameContext {
            analysis: &mut analysis,
            registry: &mut registry,
            beat: Some((&mut detector, &clock as &dyn PlaybackClock)),
            pixmap: &mut pixmap,
        };
        let outcome = render.on_frame(token, Instant::now(), &mut scheduler, ctx);

        assert_eq!(outcome, TickOutcome::Rendered { drew: true, beat: true });
        assert_eq!(seen.lock().unwrap().beat_at_draw, 1.0);
    }

    #[test]
    fn test_paused_clock_only_decays() {
        let mut scheduler = ManualScheduler::new();
        let mut render = RenderLoop::new(16, None);
        let (mut registry, _) = registry();
        let mut pixmap = Pixmap::new(8, 8).unwrap();
        let mut analysis = ConstantAnalysis(0);
        let mut detector = BeatDetector::new();
        detector.set_bpm(120.0, 0.0);
        detector.predict_beat(0.0);
        let clock = FixedClock {
            time: 1.0,
            playing: false,
        };

        render.start(&mut scheduler);
        let token = scheduler.pending().unwrap();
        let ctx = FrameContext {
            analysis: &mut analysis,
            registry: &mut registry,
            beat: Some((&mut detector, &clock as &dyn PlaybackClock)),
            pixmap: &mut pixmap,
        };
        let outcome = render.on_frame(token, Instant::now(), &mut scheduler, ctx);

        assert_eq!(outcome, TickOutcome::Rendered { drew: true, beat: false });
        assert!((detector.envelope() - 0.95).abs() < 1e-6);
        assert!((registry.beat() - 0.95).abs() < 1e-6);
    }
}
