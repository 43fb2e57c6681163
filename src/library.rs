use log::{debug, info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;

use crate::error::{Error, Result};

pub const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "ogg", "m4a", "flac", "aac", "wma"];
const COVER_NAMES: [&str; 4] = ["cover", "folder", "front", "album"];
const COVER_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// One playable file. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub name: String,
    pub path: PathBuf,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_art: Option<PathBuf>,
}

impl Track {
    /// A track with no tags; name is the file name.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            name,
            path: path.to_path_buf(),
            title: None,
            artist: None,
            album: None,
            album_art: None,
        }
    }

    /// "Artist - Title" from tags when present, otherwise from the file name.
    pub fn display_name(&self) -> String {
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => format!("{artist} - {title}"),
            (None, Some(title)) => title.clone(),
            _ => parse_file_name(&self.name).display_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub artist: Option<String>,
    pub title: String,
}

impl ParsedName {
    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

/// Splits a file name like `03. Artist - Title.flac` into artist and title.
///
/// The extension and any leading track number are dropped, then the first of
/// `" - "`, `" – "` or `" — "` found separates artist from title.
pub fn parse_file_name(file_name: &str) -> ParsedName {
    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 && !file_name[dot + 1..].contains('/') => &file_name[..dot],
        _ => file_name,
    };

    let cleaned = if stem.starts_with(|c: char| c.is_ascii_digit()) {
        stem.trim_start_matches(|c: char| c.is_ascii_digit())
            .trim_start_matches(|c: char| c.is_whitespace() || c == '.' || c == '-')
    } else {
        stem
    };

    for separator in [" - ", " – ", " — "] {
        if let Some((artist, title)) = cleaned.split_once(separator) {
            return ParsedName {
                artist: Some(artist.trim().to_string()),
                title: title.trim().to_string(),
            };
        }
    }

    ParsedName {
        artist: None,
        title: cleaned.trim().to_string(),
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lists the audio files under `folder`, sorted by path.
///
/// Tags are read where the container carries them. Unreadable sub-entries are
/// skipped with a warning; an unreadable `folder` itself is an error.
pub fn scan_folder(folder: &Path, include_subfolders: bool) -> Result<Vec<Track>> {
    let mut paths = Vec::new();
    collect_audio_files(folder, include_subfolders, &mut paths).map_err(|e| Error::InvalidFile {
        path: folder.to_path_buf(),
        reason: e.to_string(),
    })?;
    paths.sort();

    let tracks: Vec<Track> = paths.iter().map(|p| load_track(p)).collect();
    info!(
        "📂 Found {} audio files in {}{}",
        tracks.len(),
        folder.display(),
        if include_subfolders { " (with subfolders)" } else { "" }
    );
    Ok(tracks)
}

fn collect_audio_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️  Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                if let Err(e) = collect_audio_files(&path, true, out) {
                    warn!("⚠️  Skipping folder {}: {}", path.display(), e);
                }
            }
        } else if is_audio_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Builds a track with whatever tags and cover art can be found.
pub fn load_track(path: &Path) -> Track {
    let mut track = Track::from_path(path);
    match read_tags(path) {
        Ok(tags) => {
            track.title = tags.title;
            track.artist = tags.artist;
            track.album = tags.album;
        }
        Err(e) => debug!("No tags for {}: {}", path.display(), e),
    }
    track.album_art = find_album_art(path);
    track
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// Reads title, artist and album through symphonia's probe.
pub fn read_tags(path: &Path) -> std::result::Result<TrackTags, symphonia::core::errors::Error> {
    let file = File::open(path)?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut tags = TrackTags::default();
    // Container-level tags (ID3v2 ahead of the stream) first, then in-stream tags.
    if let Some(metadata) = probed.metadata.get() {
        if let Some(revision) = metadata.current() {
            apply_revision(&mut tags, revision);
        }
    }
    if let Some(revision) = probed.format.metadata().current() {
        apply_revision(&mut tags, revision);
    }
    Ok(tags)
}

fn apply_revision(tags: &mut TrackTags, revision: &MetadataRevision) {
    for tag in revision.tags() {
        let value = tag.value.to_string();
        if value.trim().is_empty() {
            continue;
        }
        let slot = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => &mut tags.title,
            Some(StandardTagKey::Artist) => &mut tags.artist,
            Some(StandardTagKey::Album) => &mut tags.album,
            _ => continue,
        };
        slot.get_or_insert(value.trim().to_string());
    }
}

/// Looks for a cover image next to the track.
pub fn find_album_art(track_path: &Path) -> Option<PathBuf> {
    let dir = track_path.parent()?;
    COVER_NAMES.iter().find_map(|name| {
        COVER_EXTENSIONS.iter().find_map(|ext| {
            [ext.to_string(), ext.to_ascii_uppercase()]
                .into_iter()
                .map(|e| dir.join(format!("{name}.{e}")))
                .find(|candidate| candidate.is_file())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_artist_and_title() {
        let parsed = parse_file_name("03. Daft Punk - One More Time.mp3");
        assert_eq!(parsed.artist.as_deref(), Some("Daft Punk"));
        assert_eq!(parsed.title, "One More Time");
    }

    #[test]
    fn test_parse_dash_variants_and_extra_separators() {
        let en = parse_file_name("Boards of Canada – Roygbiv.flac");
        assert_eq!(en.artist.as_deref(), Some("Boards of Canada"));

        let em = parse_file_name("A — B — C.ogg");
        assert_eq!(em.artist.as_deref(), Some("A"));
        assert_eq!(em.title, "B — C");
    }

    #[test]
    fn test_parse_title_only() {
        let parsed = parse_file_name("12-interlude.wav");
        assert_eq!(parsed.artist, None);
        assert_eq!(parsed.title, "interlude");
        assert_eq!(parse_file_name("no_extension").title, "no_extension");
    }

    #[test]
    fn test_scan_folder_filters_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("disc 2");
        std::fs::create_dir(&nested).unwrap();
        for name in ["b.mp3", "a.WAV", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::write(nested.join("c.flac"), b"x").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"x").unwrap();

        let flat = scan_folder(dir.path(), false).unwrap();
        let names: Vec<&str> = flat.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a.WAV", "b.mp3"]);
        assert_eq!(flat[0].album_art, Some(dir.path().join("cover.jpg")));

        let deep = scan_folder(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.iter().any(|t| t.name == "c.flac"));
    }

    #[test]
    fn test_scan_missing_folder_fails() {
        assert!(matches!(
            scan_folder(Path::new("/definitely/not/here"), false),
            Err(Error::InvalidFile { .. })
        ));
    }
}
