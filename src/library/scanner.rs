use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::store::Library;
use super::track::{Track, TrackMetadata};
use super::AudioFormat;

// Empty files and anything over 1GB are junk as far as we're concerned
const MAX_FILE_SIZE: u64 = 1_000_000_000;

#[derive(Clone)]
pub struct MusicScanner {
    supported_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { total_directories: usize },
    DirectoryStarted { path: PathBuf },
    TrackFound { path: PathBuf, tracks_so_far: usize },
    DirectoryCompleted { path: PathBuf, tracks_found: usize },
    Completed { total_tracks: usize, removed: usize },
    Error { path: PathBuf, error: String },
}

impl MusicScanner {
    pub fn new() -> Self {
        Self {
            supported_extensions: vec![
                "mp3".to_string(),
                "flac".to_string(),
                "ogg".to_string(),
                "oga".to_string(),
                "mp4".to_string(),
                "m4a".to_string(),
                "m4b".to_string(),
                "aac".to_string(),
                "wav".to_string(),
            ],
        }
    }

    /// Walk the directories and return everything playable, without
    /// touching the catalog.
    pub fn scan_directories(&self, paths: &[PathBuf]) -> Result<Vec<Track>> {
        let mut all_tracks = Vec::new();
        for path in paths {
            if !path.is_dir() {
                warn!("skipping missing music directory: {}", path.display());
                continue;
            }
            self.walk_directory(path, &mut all_tracks, None)?;
        }
        Ok(all_tracks)
    }

    /// Full library sync: scan, upsert every track, then prune catalog rows
    /// whose files are gone. Progress lands on `progress` as it happens.
    pub fn sync_library(
        &self,
        library: &Library,
        paths: &[PathBuf],
        progress: Option<&mpsc::UnboundedSender<ScanProgress>>,
    ) -> Result<usize> {
        send(progress, ScanProgress::Started {
            total_directories: paths.len(),
        });

        let mut seen_paths = Vec::new();
        let mut total = 0usize;

        for path in paths {
            if !path.is_dir() {
                send(progress, ScanProgress::Error {
                    path: path.clone(),
                    error: "directory does not exist".to_string(),
                });
                continue;
            }
            send(progress, ScanProgress::DirectoryStarted { path: path.clone() });

            let mut tracks = Vec::new();
            self.walk_directory(path, &mut tracks, progress)?;

            let found = tracks.len();
            for track in &tracks {
                library.add_or_update_track(track)?;
                seen_paths.push(track.file_path.clone());
            }
            total += found;

            send(progress, ScanProgress::DirectoryCompleted {
                path: path.clone(),
                tracks_found: found,
            });
        }

        let removed = library.remove_missing(&seen_paths)?;
        info!("scan finished: {} tracks, {} stale rows removed", total, removed);
        send(progress, ScanProgress::Completed {
            total_tracks: total,
            removed,
        });
        Ok(total)
    }

    fn walk_directory(
        &self,
        path: &Path,
        tracks: &mut Vec<Track>,
        progress: Option<&mpsc::UnboundedSender<ScanProgress>>,
    ) -> Result<()> {
        for entry in WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
        {
            let entry_path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            // Skip hidden files (dotfiles)
            if entry_path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with('.'))
            {
                continue;
            }
            if let Ok(metadata) = fs::metadata(entry_path) {
                if metadata.len() == 0 || metadata.len() > MAX_FILE_SIZE {
                    continue;
                }
            }
            if !self.is_supported_file(entry_path) {
                continue;
            }

            match self.scan_file(entry_path) {
                Ok(track) => {
                    tracks.push(track);
                    send(progress, ScanProgress::TrackFound {
                        path: entry_path.to_path_buf(),
                        tracks_so_far: tracks.len(),
                    });
                }
                Err(e) => {
                    send(progress, ScanProgress::Error {
                        path: entry_path.to_path_buf(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn is_supported_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let normalized = ext.to_ascii_lowercase();
                self.supported_extensions.contains(&normalized)
            })
            .unwrap_or(false)
    }

    /// Build a Track for one file: read what tags we can, fall back to the
    /// filename for the rest. Also used to register downloaded files.
    pub fn scan_file(&self, path: &Path) -> Result<Track> {
        let mut track = Track::new(path.to_path_buf());

        match track.format {
            AudioFormat::Mp3 => match self.extract_id3_metadata(path) {
                Ok(metadata) => track = track.with_metadata(metadata),
                Err(e) => debug!("no usable id3 tags in {}: {}", path.display(), e),
            },
            AudioFormat::Mp4 => match self.extract_mp4_metadata(path) {
                Ok(metadata) => track = track.with_metadata(metadata),
                Err(e) => debug!("no usable mp4 tags in {}: {}", path.display(), e),
            },
            // flac/ogg/wav: nothing cheap to read, the filename carries it
            _ => {}
        }

        track.fill_from_filename();

        #[cfg(feature = "probe")]
        {
            if track.metadata.duration_ms.is_none() {
                if let Ok(duration) = self.probe_duration_with_symphonia(path) {
                    track.metadata.duration_ms = Some(duration.as_millis() as u64);
                }
            }
        }

        Ok(track)
    }

    fn extract_id3_metadata(&self, path: &Path) -> Result<TrackMetadata> {
        let tag = id3::Tag::read_from_path(path)?;
        Ok(TrackMetadata::from_id3_tag(&tag))
    }

    fn extract_mp4_metadata(&self, path: &Path) -> Result<TrackMetadata> {
        let tag = mp4ameta::Tag::read_from_path(path)?;
        Ok(TrackMetadata::from_mp4_tag(&tag))
    }

    /// Feature-gated duration probing using symphonia
    #[cfg(feature = "probe")]
    fn probe_duration_with_symphonia(&self, path: &Path) -> Result<std::time::Duration> {
        use std::fs::File;
        use std::time::Duration;
        use symphonia::core::formats::FormatOptions;
        use symphonia::core::io::MediaSourceStream;
        use symphonia::core::meta::MetadataOptions;
        use symphonia::core::probe::Hint;

        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow::anyhow!("no supported audio tracks found"))?;

        if let (Some(time_base), Some(n_frames)) =
            (track.codec_params.time_base, track.codec_params.n_frames)
        {
            let time = time_base.calc_time(n_frames);
            return Ok(Duration::from_secs_f64(
                time.seconds as f64 + time.frac,
            ));
        }

        Err(anyhow::anyhow!("could not determine duration"))
    }
}

impl Default for MusicScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn send(progress: Option<&mpsc::UnboundedSender<ScanProgress>>, event: ScanProgress) {
    if let Some(sender) = progress {
        let _ = sender.send(event);
    }
}
