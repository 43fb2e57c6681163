use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Everything worth remembering about a file between loads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub bpm: Option<f32>,
    pub beat_offset: Option<f64>,
}

impl TrackMetadata {
    /// Cached tempo, if one was analysed and is usable.
    pub fn tempo(&self) -> Option<(f32, f64)> {
        match self.bpm {
            Some(bpm) if bpm > 0.0 => Some((bpm, self.beat_offset.unwrap_or(0.0))),
            _ => None,
        }
    }
}

/// Opportunistic store; a miss only means the work is redone.
pub trait MetadataCache: Send + Sync {
    fn get(&self, path: &Path) -> Option<TrackMetadata>;
    fn put(&self, path: &Path, metadata: TrackMetadata);
}

#[derive(Debug, Default)]
pub struct InMemoryMetadataCache {
    entries: RwLock<HashMap<PathBuf, TrackMetadata>>,
}

impl InMemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataCache for InMemoryMetadataCache {
    fn get(&self, path: &Path) -> Option<TrackMetadata> {
        self.entries.read().ok()?.get(path).cloned()
    }

    fn put(&self, path: &Path, metadata: TrackMetadata) {
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(path.to_path_buf(), metadata);
            }
            Err(_) => debug!("Metadata cache poisoned; dropping entry for {}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let cache = InMemoryMetadataCache::new();
        let path = Path::new("/music/a.flac");
        assert!(cache.get(path).is_none());

        cache.put(
            path,
            TrackMetadata {
                bpm: Some(128.0),
                beat_offset: Some(0.25),
                ..Default::default()
            },
        );
        assert_eq!(cache.get(path).and_then(|m| m.tempo()), Some((128.0, 0.25)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_bpm_is_not_a_tempo() {
        let meta = TrackMetadata {
            bpm: Some(0.0),
            ..Default::default()
        };
        assert_eq!(meta.tempo(), None);
    }
}
