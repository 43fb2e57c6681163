use std::path::PathBuf;

/// Errors raised by the player, the analysis pipeline and the visualizer registry.
///
/// Variants carry owned strings rather than source errors so they can be cloned
/// into [`PlayerEvent::Error`](crate::audio::PlayerEvent) and compared in tests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("track index {index} is out of range (queue holds {count} tracks)")]
    InvalidIndex { index: usize, count: usize },

    #[error("cannot read {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("audio graph error: {0}")]
    Graph(String),

    #[error("beat analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("visualizer '{0}' not found")]
    NotFound(String),

    #[error("visualizer '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("visualizer '{name}' failed: {reason}")]
    Visualizer { name: String, reason: String },

    #[error("setting '{key}' rejected: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("external stream error: {0}")]
    External(String),

    #[error("player not ready: {0}")]
    NotReady(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn visualizer(name: &str, reason: impl Into<String>) -> Self {
        Error::Visualizer {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_setting(key: &str, reason: impl Into<String>) -> Self {
        Error::InvalidSetting {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
