// Library management - file scanning, tag extraction, and the SQLite catalog

pub mod filename;
pub mod scanner;
pub mod store;
pub mod track;

pub use scanner::{MusicScanner, ScanProgress};
pub use store::{Library, Playlist};
pub use track::{Track, TrackMetadata};

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Ogg,
    Mp4,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            "mp4" | "m4a" | "m4b" | "aac" => AudioFormat::Mp4,
            "wav" => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, AudioFormat::Unknown)
    }
}

/// Read-only lookup from a track id to its playable file and display
/// metadata. The playback controller depends on this seam, not on the
/// concrete catalog, so tests can swap in a canned store.
pub trait TrackStore {
    fn resolve(&self, track_id: i64) -> Option<ResolvedTrack>;
}

/// What the playback side needs to know about a track.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub id: i64,
    pub file_path: PathBuf,
    pub title: String,
    pub artist: String,
    pub duration_ms: Option<u64>,
}

impl ResolvedTrack {
    pub fn display_duration(&self) -> String {
        match self.duration_ms {
            Some(ms) => {
                let secs = ms / 1000;
                format!("{}:{:02}", secs / 60, secs % 60)
            }
            None => "0:00".to_string(),
        }
    }
}
