use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    event::{ElementState, Event, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

use spectra::app::{App, Services};
use spectra::audio::{open_output, DEFAULT_FFT_SIZE};
use spectra::graphics::Presenter;
use spectra::integrations::{InMemoryMetadataCache, LogPresenceReporter};
use spectra::render_loop::{TickOutcome, WindowScheduler};
use spectra::settings::{default_settings_path, SettingsStore};
use spectra::visualizers::default_registry;

const SEEK_STEP: f64 = 5.0;
const VOLUME_STEP: f32 = 0.05;
const INTENSITY_STEP: f32 = 1.0;
const RATE_STEP: f64 = 0.05;

#[derive(Parser)]
#[command(name = "spectra")]
#[command(about = "Audio player with real-time visualizers")]
struct Cli {
    /// Folder of audio files to queue (defaults to the last one opened)
    folder: Option<PathBuf>,

    /// Visualizer to start with, e.g. "Starfield"
    #[arg(short, long)]
    visualizer: Option<String>,

    /// Frame rate cap; 0 renders at the display rate
    #[arg(long)]
    fps_cap: Option<u32>,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Include audio files in subfolders
    #[arg(short = 'r', long)]
    subfolders: bool,

    #[arg(long, default_value_t = 1200)]
    width: u32,

    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Print the available visualizers and exit
    #[arg(long)]
    list_visualizers: bool,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if cli.list_visualizers {
        for (i, name) in default_registry().list().iter().enumerate() {
            println!("{}. {}", i + 1, name);
        }
        return Ok(());
    }

    info!("🎵 Starting Spectra");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let settings = SettingsStore::open(cli.settings.clone().unwrap_or_else(default_settings_path));
    let saved = settings.get().clone();

    let (graph, output) = open_output(DEFAULT_FFT_SIZE);
    if output.is_silent() {
        warn!("⚠️  No audio device; visuals will follow a silent clock");
    }

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Spectra")
            .with_inner_size(winit::dpi::LogicalSize::new(cli.width, cli.height))
            .build(&event_loop)?,
    );
    let mut presenter = Presenter::new(Arc::clone(&window))?;
    let mut scheduler = WindowScheduler::new(Arc::clone(&window));

    let size = window.inner_size();
    let services = Services {
        settings,
        presence: Box::new(LogPresenceReporter),
        metadata: Arc::new(InMemoryMetadataCache::new()),
    };
    let mut app = App::new(graph, runtime.handle().clone(), services, size.width, size.height)?;

    if let Some(fps) = cli.fps_cap {
        app.set_fps_cap((fps > 0).then_some(fps));
    }
    if let Some(name) = &cli.visualizer {
        if let Err(e) = app.select_visualizer(name) {
            warn!("⚠️  {}", e);
        }
    }

    let folder = cli.folder.clone().or(saved.last_opened_folder.clone());
    if let Some(folder) = folder {
        let subfolders = cli.subfolders || saved.include_subfolders;
        match app.open_folder(&folder, subfolders) {
            Ok(0) => warn!("⚠️  No audio files in {}", folder.display()),
            Ok(_) => {
                if let Err(e) = app.play_track(0) {
                    warn!("⚠️  {:#}", e);
                }
            }
            Err(e) => warn!("⚠️  {:#}", e),
        }
    } else {
        info!("No folder given; pass one on the command line to start playing");
    }

    app.start_rendering(&mut scheduler);
    info!("✅ Spectra initialized");

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                app.stop_rendering(&mut scheduler);
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                if key == KeyCode::Escape {
                    info!("Escape pressed");
                    app.stop_rendering(&mut scheduler);
                    elwt.exit();
                    return;
                }
                if let Err(e) = handle_key(&mut app, key, event.repeat) {
                    warn!("⚠️  {:#}", e);
                }
            }
            WindowEvent::Resized(physical_size) => {
                if let Err(e) = presenter.resize(physical_size.width, physical_size.height) {
                    error!("Resize error: {:#}", e);
                }
                if let Err(e) = app.resize(physical_size.width, physical_size.height) {
                    error!("Resize error: {:#}", e);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(token) = scheduler.take_pending() else {
                    return;
                };
                let outcome = app.frame(token, Instant::now(), &mut scheduler);
                if matches!(outcome, TickOutcome::Rendered { .. }) {
                    if let Err(e) = presenter.present(app.pixmap()) {
                        error!("Render error: {:#}", e);
                    }
                }
            }
            _ => {}
        },
        Event::AboutToWait => app.pump(),
        _ => {}
    })?;

    Ok(())
}

fn handle_key(app: &mut App, key: KeyCode, repeat: bool) -> Result<()> {
    match key {
        KeyCode::Space if !repeat => app.toggle_play()?,
        KeyCode::ArrowLeft => {
            app.seek_by(-SEEK_STEP);
        }
        KeyCode::ArrowRight => {
            app.seek_by(SEEK_STEP);
        }
        KeyCode::KeyN if !repeat => {
            app.next_track()?;
        }
        KeyCode::KeyP if !repeat => {
            app.previous_track()?;
        }
        KeyCode::ArrowUp | KeyCode::ArrowDown => {
            let step = if key == KeyCode::ArrowUp { VOLUME_STEP } else { -VOLUME_STEP };
            let player = app.player_mut();
            let volume = player.set_volume(player.volume() + step);
            info!("🔊 Volume {:.0}%", volume * 100.0);
        }
        KeyCode::Equal | KeyCode::NumpadAdd | KeyCode::Minus | KeyCode::NumpadSubtract => {
            let step = if matches!(key, KeyCode::Equal | KeyCode::NumpadAdd) {
                INTENSITY_STEP
            } else {
                -INTENSITY_STEP
            };
            let player = app.player_mut();
            let db = player.set_intensity(player.intensity_db() + step);
            info!("Intensity {:+.0} dB", db);
        }
        KeyCode::BracketLeft | KeyCode::BracketRight => {
            let step = if key == KeyCode::BracketRight { RATE_STEP } else { -RATE_STEP };
            let player = app.player_mut();
            let rate = player.set_playback_rate(player.playback_rate() + step);
            info!("Playback rate {:.2}x", rate);
        }
        KeyCode::KeyT if !repeat => {
            app.cycle_theme();
        }
        KeyCode::KeyB if !repeat => {
            app.toggle_beat_detection();
        }
        _ => {
            if let Some(index) = digit(key) {
                app.select_visualizer_index(index)?;
            }
        }
    }
    Ok(())
}

/// Zero-based menu position for the digit keys 1 through 9 and 0 (tenth).
fn digit(key: KeyCode) -> Option<usize> {
    let index = match key {
        KeyCode::Digit1 => 0,
        KeyCode::Digit2 => 1,
        KeyCode::Digit3 => 2,
        KeyCode::Digit4 => 3,
        KeyCode::Digit5 => 4,
        KeyCode::Digit6 => 5,
        KeyCode::Digit7 => 6,
        KeyCode::Digit8 => 7,
        KeyCode::Digit9 => 8,
        KeyCode::Digit0 => 9,
        _ => return None,
    };
    Some(index)
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
