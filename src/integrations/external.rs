use anyhow::Result;
use log::info;

/// A remote audio source (for example a streamed video's soundtrack) that
/// competes with local playback for the output. The player keeps at most one
/// of the two audible: whichever was started last wins.
pub trait ExternalStream: Send {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn set_volume(&mut self, volume: f32);
    fn current_time(&self) -> f64;
    fn is_playing(&self) -> bool;
}

/// Stand-in stream that only tracks its own state. Used when no streaming
/// backend is configured and in tests.
#[derive(Debug, Default)]
pub struct DetachedStream {
    playing: bool,
    volume: f32,
    position: f64,
}

impl DetachedStream {
    pub fn new() -> Self {
        Self {
            playing: false,
            volume: 1.0,
            position: 0.0,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn advance(&mut self, seconds: f64) {
        if self.playing {
            self.position += seconds;
        }
    }
}

impl ExternalStream for DetachedStream {
    fn play(&mut self) -> Result<()> {
        info!("External stream playing");
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.playing = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}
