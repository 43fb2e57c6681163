use anyhow::Result;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::library::{parse_file_name, Track};

const LARGE_IMAGE: &str = "icon";

/// What a rich-presence service is asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub details: String,
    pub state: String,
    /// Unix milliseconds at which the current song will end.
    pub end_timestamp: Option<u64>,
    pub large_image: Option<String>,
    pub small_image: Option<String>,
}

/// Sink for presence updates. Failures are reported but never fatal.
pub trait PresenceReporter: Send {
    fn update(&mut self, presence: &Presence) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

/// Reporter that only logs; used when no presence service is connected.
#[derive(Debug, Default)]
pub struct LogPresenceReporter;

impl PresenceReporter for LogPresenceReporter {
    fn update(&mut self, presence: &Presence) -> Result<()> {
        debug!("Presence: {} | {}", presence.details, presence.state);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        debug!("Presence cleared");
        Ok(())
    }
}

/// Player state the tracker needs for one update.
#[derive(Debug, Clone, Copy)]
pub struct PresenceSnapshot<'a> {
    pub visualizer: &'a str,
    pub track: Option<&'a Track>,
    pub is_playing: bool,
    /// Seconds left in the current track, when known.
    pub remaining: Option<f64>,
}

/// Turns player state into presence updates.
///
/// The end timestamp is computed once per song and play state so that the
/// countdown shown remotely does not jitter on every refresh.
pub struct PresenceTracker {
    reporter: Box<dyn PresenceReporter>,
    enabled: bool,
    last_song: Option<PathBuf>,
    last_playing: bool,
    cached_end: Option<u64>,
}

impl PresenceTracker {
    pub fn new(reporter: Box<dyn PresenceReporter>, enabled: bool) -> Self {
        Self {
            reporter,
            enabled,
            last_song: None,
            last_playing: false,
            cached_end: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.clear();
        }
        info!("Presence {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn update(&mut self, snapshot: PresenceSnapshot<'_>) -> Option<Presence> {
        self.update_at(snapshot, unix_millis())
    }

    /// Same as [`update`](Self::update) with an explicit wall-clock time.
    pub fn update_at(&mut self, snapshot: PresenceSnapshot<'_>, now_ms: u64) -> Option<Presence> {
        if !self.enabled {
            return None;
        }

        let state = format!("Using {}", snapshot.visualizer);
        let Some(track) = snapshot.track else {
            self.last_song = None;
            self.last_playing = false;
            self.cached_end = None;
            let presence = Presence {
                details: "No song playing".to_string(),
                state,
                end_timestamp: None,
                large_image: Some(LARGE_IMAGE.to_string()),
                small_image: None,
            };
            self.send(&presence);
            return Some(presence);
        };

        let song = parse_file_name(&track.name).display_name();
        let details = if snapshot.is_playing {
            format!("Listening to {}", song)
        } else {
            "Paused".to_string()
        };

        let song_changed = self.last_song.as_deref() != Some(track.path.as_path());
        let play_changed = self.last_playing != snapshot.is_playing;

        match (snapshot.is_playing, snapshot.remaining) {
            (true, Some(remaining)) => {
                if song_changed || play_changed || self.cached_end.is_none() {
                    let remaining_ms = (remaining.max(0.0) * 1000.0) as u64;
                    self.cached_end = Some(now_ms + remaining_ms);
                }
            }
            _ => self.cached_end = None,
        }

        self.last_song = Some(track.path.clone());
        self.last_playing = snapshot.is_playing;

        let presence = Presence {
            details,
            state,
            end_timestamp: self.cached_end,
            large_image: Some(LARGE_IMAGE.to_string()),
            small_image: Some(if snapshot.is_playing { "play" } else { "pause" }.to_string()),
        };
        self.send(&presence);
        Some(presence)
    }

    pub fn clear(&mut self) {
        self.last_song = None;
        self.last_playing = false;
        self.cached_end = None;
        if let Err(e) = self.reporter.clear() {
            warn!("⚠️  Presence service unavailable: {}", e);
        }
    }

    fn send(&mut self, presence: &Presence) {
        if let Err(e) = self.reporter.update(presence) {
            warn!("⚠️  Presence service unavailable: {}", e);
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recording {
        sent: Arc<Mutex<Vec<Presence>>>,
        cleared: Arc<Mutex<usize>>,
        fail: bool,
    }

    impl PresenceReporter for Recording {
        fn update(&mut self, presence: &Presence) -> Result<()> {
            if self.fail {
                return Err(anyhow!("not connected"));
            }
            self.sent.lock().unwrap().push(presence.clone());
            Ok(())
        }

        fn clear(&mut self) -> Result<()> {
            *self.cleared.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn snapshot<'a>(track: Option<&'a Track>, playing: bool, remaining: f64) -> PresenceSnapshot<'a> {
        PresenceSnapshot {
            visualizer: "Starfield",
            track,
            is_playing: playing,
            remaining: Some(remaining),
        }
    }

    #[test]
    fn test_details_and_state() {
        let recording = Recording::default();
        let mut tracker = PresenceTracker::new(Box::new(recording.clone()), true);
        let track = Track::from_path(Path::new("/music/01. Air - La Femme d'Argent.flac"));

        let playing = tracker.update_at(snapshot(Some(&track), true, 60.0), 1_000).unwrap();
        assert_eq!(playing.details, "Listening to Air - La Femme d'Argent");
        assert_eq!(playing.state, "Using Starfield");

        let paused = tracker.update_at(snapshot(Some(&track), false, 60.0), 2_000).unwrap();
        assert_eq!(paused.details, "Paused");
        assert_eq!(paused.end_timestamp, None);

        let idle = tracker.update_at(snapshot(None, false, 0.0), 3_000).unwrap();
        assert_eq!(idle.details, "No song playing");
        assert_eq!(recording.sent.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_end_timestamp_cached_until_song_or_state_changes() {
        let mut tracker = PresenceTracker::new(Box::new(LogPresenceReporter), true);
        let a = Track::from_path(Path::new("/music/a.mp3"));
        let b = Track::from_path(Path::new("/music/b.mp3"));

        let first = tracker.update_at(snapshot(Some(&a), true, 100.0), 1_000).unwrap();
        assert_eq!(first.end_timestamp, Some(101_000));

        let again = tracker.update_at(snapshot(Some(&a), true, 95.0), 6_000).unwrap();
        assert_eq!(again.end_timestamp, Some(101_000));

        let other = tracker.update_at(snapshot(Some(&b), true, 10.0), 7_000).unwrap();
        assert_eq!(other.end_timestamp, Some(17_000));
    }

    #[test]
    fn test_disabled_tracker_sends_nothing_and_clears() {
        let recording = Recording::default();
        let mut tracker = PresenceTracker::new(Box::new(recording.clone()), true);
        tracker.set_enabled(false);
        assert_eq!(*recording.cleared.lock().unwrap(), 1);

        let track = Track::from_path(Path::new("/music/a.mp3"));
        assert!(tracker.update_at(snapshot(Some(&track), true, 1.0), 0).is_none());
        assert!(recording.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reporter_failure_is_tolerated() {
        let recording = Recording {
            fail: true,
            ..Default::default()
        };
        let mut tracker = PresenceTracker::new(Box::new(recording), true);
        let track = Track::from_path(Path::new("/music/a.mp3"));
        assert!(tracker.update_at(snapshot(Some(&track), true, 1.0), 0).is_some());
    }
}
