pub mod analysis;
pub mod beat_detector;
pub mod buffer;
pub mod decode;
pub mod events;
pub mod graph;
pub mod output;
pub mod player;
pub mod tempo;

pub use analysis::{AnalysisSource, GraphAnalysis, SpectralFrame, SpectrumSampler, DEFAULT_FFT_SIZE};
pub use beat_detector::{BeatAnalysis, BeatAnalysisWorker, BeatDetector, BeatJob, DEFAULT_BEAT_DECAY};
pub use buffer::PcmBuffer;
pub use decode::{FileSource, LocalFileSource, RodioDecoder, TrackDecoder};
pub use events::{EventBus, PlayerEvent};
pub use graph::{AudioGraph, SourceId};
pub use output::{open_output, AudioOutput};
pub use player::{AudioPlayer, PlayerState};
pub use tempo::{estimate_tempo, TempoConfig, TempoEstimate};
