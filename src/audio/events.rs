use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

use super::PcmBuffer;
use crate::error::Error;
use crate::library::Track;

/// Lifecycle notifications published by [`AudioPlayer`](super::AudioPlayer).
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    FileLoaded {
        track: Arc<Track>,
        index: usize,
        duration: f64,
        buffer: Arc<PcmBuffer>,
    },
    Play { track: Arc<Track> },
    Pause,
    /// The buffer ran out on its own; the player is parked at offset 0.
    Ended { index: usize },
    Stop,
    Seek { time: f64 },
    VolumeChange(f32),
    IntensityChange(f32),
    PlaybackRateChange(f64),
    /// An external stream took over the output.
    ExternalStarted,
    Error(Error),
}

/// Fan-out of player events to any number of subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Sender<PlayerEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<PlayerEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Delivers to every live subscriber and forgets dropped ones.
    pub fn emit(&mut self, event: PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        bus.emit(PlayerEvent::Pause);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(matches!(kept.try_recv(), Ok(PlayerEvent::Pause)));
    }
}
