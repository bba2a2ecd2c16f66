use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::filename;
use super::AudioFormat;

/// A single music track, as stored in the catalog.
///
/// `id` is the SQLite rowid and is `None` until the track has been written
/// to the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<i64>,
    pub file_path: PathBuf,
    pub metadata: TrackMetadata,
    pub format: AudioFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
}

impl Track {
    pub fn new(file_path: PathBuf) -> Self {
        let format = file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(AudioFormat::from_extension)
            .unwrap_or(AudioFormat::Unknown);

        Self {
            id: None,
            file_path,
            metadata: TrackMetadata::default(),
            format,
        }
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Fill title/artist from the filename when tags left them empty.
    /// Downloaded files commonly carry "Artist - Title" names and nothing else.
    pub fn fill_from_filename(&mut self) {
        if self.metadata.title.is_none() {
            self.metadata.title = Some(filename::title_from_path(&self.file_path));
        }
        if self.metadata.artist.is_none() {
            self.metadata.artist = filename::artist_from_path(&self.file_path);
        }
    }

    pub fn display_title(&self) -> String {
        self.metadata
            .title
            .clone()
            .unwrap_or_else(|| filename::title_from_path(&self.file_path))
    }

    pub fn display_artist(&self) -> String {
        self.metadata
            .artist
            .clone()
            .or_else(|| filename::artist_from_path(&self.file_path))
            .unwrap_or_else(|| "Unknown Artist".to_string())
    }

    pub fn display_album(&self) -> String {
        self.metadata
            .album
            .clone()
            .unwrap_or_else(|| "Unknown Album".to_string())
    }

    pub fn display_duration(&self) -> String {
        match self.metadata.duration_ms {
            Some(ms) => {
                let secs = ms / 1000;
                format!("{}:{:02}", secs / 60, secs % 60)
            }
            None => "0:00".to_string(),
        }
    }

    pub fn is_playable(&self) -> bool {
        self.format.is_supported() && self.file_path.exists()
    }
}

impl TrackMetadata {
    pub fn from_id3_tag(tag: &id3::Tag) -> Self {
        use id3::TagLike;

        Self {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            genre: tag.genre().map(|s| s.to_string()),
            year: tag.year().map(|y| y as u32),
            track_number: tag.track(),
            duration_ms: tag.duration().map(|d| d as u64),
        }
    }

    pub fn from_mp4_tag(tag: &mp4ameta::Tag) -> Self {
        Self {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            genre: tag.genre().map(|s| s.to_string()),
            year: tag.year().and_then(|y| y.parse().ok()),
            track_number: tag.track_number().map(|t| t as u32),
            duration_ms: tag.duration().map(|d| d.as_millis() as u64),
        }
    }
}

/// Squash an arbitrary display string into something safe as a filename.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_falls_back_to_filename() {
        let track = Track::new(PathBuf::from("/music/Linkin Park - Numb.mp3"));
        assert_eq!(track.display_title(), "Numb");
        assert_eq!(track.display_artist(), "Linkin Park");
    }

    #[test]
    fn test_display_prefers_tags() {
        let mut track = Track::new(PathBuf::from("/music/01 - whatever.mp3"));
        track.metadata.title = Some("Numb".to_string());
        track.metadata.artist = Some("Linkin Park".to_string());
        assert_eq!(track.display_title(), "Numb");
        assert_eq!(track.display_artist(), "Linkin Park");
    }

    #[test]
    fn test_display_duration() {
        let mut track = Track::new(PathBuf::from("/music/a.mp3"));
        track.metadata.duration_ms = Some(245_000);
        assert_eq!(track.display_duration(), "4:05");
        track.metadata.duration_ms = None;
        assert_eq!(track.display_duration(), "0:00");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            Track::new(PathBuf::from("x.M4A")).format,
            AudioFormat::Mp4
        );
        assert_eq!(
            Track::new(PathBuf::from("x.txt")).format,
            AudioFormat::Unknown
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("AC/DC: Back in Black?"),
            "AC-DC- Back in Black-"
        );
    }
}
