use async_trait::async_trait;
use log::debug;
use rodio::{Decoder, Source};
use std::io::Cursor;
use std::path::Path;

use super::PcmBuffer;
use crate::error::{Error, Result};

/// Byte access to track files.
///
/// The player never touches the file system directly; it asks a `FileSource`
/// for the raw bytes of a track and hands them to a [`TrackDecoder`]. Swapping
/// the source lets tests serve fixtures from memory and lets hosts read from
/// sandboxed locations.
///
/// # Errors
/// Implementations report missing or unreadable files as [`Error::InvalidFile`].
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Reads tracks from the local file system with `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSource;

#[async_trait]
impl FileSource for LocalFileSource {
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| Error::InvalidFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Turns encoded bytes into planar PCM.
///
/// Decoding is CPU-bound and runs on a blocking worker, so implementations
/// must be `Send + Sync`. The returned buffer must be non-empty; a stream that
/// yields no frames is a [`Error::Decode`].
pub trait TrackDecoder: Send + Sync {
    fn decode(&self, bytes: Vec<u8>) -> Result<PcmBuffer>;
}

/// Decodes through `rodio`, which dispatches to symphonia for every container
/// it recognises (MP3, FLAC, Ogg Vorbis, WAV, AAC/M4A).
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioDecoder;

impl TrackDecoder for RodioDecoder {
    fn decode(&self, bytes: Vec<u8>) -> Result<PcmBuffer> {
        let source = Decoder::new(Cursor::new(bytes)).map_err(|e| Error::Decode(e.to_string()))?;

        let sample_rate = source.sample_rate();
        let channels = source.channels() as usize;
        if sample_rate == 0 || channels == 0 {
            return Err(Error::Decode("stream reports no channels or sample rate".into()));
        }

        let interleaved: Vec<f32> = source.convert_samples::<f32>().collect();
        let buffer = PcmBuffer::from_interleaved(&interleaved, channels, sample_rate);
        if buffer.is_empty() {
            return Err(Error::Decode("stream contains no audio frames".into()));
        }

        debug!(
            "Decoded {} frames ({} ch @ {} Hz, {:.2}s)",
            buffer.frames(),
            channels,
            sample_rate,
            buffer.duration()
        );
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{runtime, write_sine_wav};

    #[test]
    fn test_decodes_wav_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 440.0, 0.5, 22050, 2);

        let bytes = runtime().block_on(LocalFileSource.read_bytes(&path)).unwrap();
        let buffer = RodioDecoder.decode(bytes).unwrap();

        assert_eq!(buffer.sample_rate, 22050);
        assert_eq!(buffer.channel_count(), 2);
        assert!((buffer.duration() - 0.5).abs() < 0.01);
        assert!(buffer.channels[0].iter().any(|s| s.abs() > 0.4));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let result = RodioDecoder.decode(b"definitely not an audio file".to_vec());
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_missing_file_is_invalid_file() {
        let result = runtime().block_on(LocalFileSource.read_bytes(Path::new("/nonexistent/track.mp3")));
        assert!(matches!(result, Err(Error::InvalidFile { .. })));
    }
}
