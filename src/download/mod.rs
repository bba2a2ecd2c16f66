// YouTube-to-MP3 fetching, delegated to an external downloader binary.
// Tries yt-dlp first, then youtube-dl, scraping progress off stdout.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::library::filename;
use crate::library::track::sanitize_filename;

const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("not a YouTube URL: {0}")]
    InvalidUrl(String),
    #[error("no downloader found on PATH; install yt-dlp or youtube-dl")]
    ToolNotFound,
    #[error("download cancelled")]
    Cancelled,
    #[error("downloader failed: {0}")]
    ToolFailed(String),
    #[error("downloaded file not found at {0}")]
    OutputMissing(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Started { url: String },
    Status(String),
    /// Percentage, 0.0..=100.0
    Progress(f32),
    Finished { url: String, path: PathBuf },
    Failed { url: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadTool {
    YtDlp,
    YoutubeDl,
}

impl DownloadTool {
    fn binary(self) -> &'static str {
        match self {
            DownloadTool::YtDlp => "yt-dlp",
            DownloadTool::YoutubeDl => "youtube-dl",
        }
    }
}

const TOOL_CHAIN: [DownloadTool; 2] = [DownloadTool::YtDlp, DownloadTool::YoutubeDl];

#[derive(Debug, Clone, Default)]
struct VideoMetadata {
    title: String,
    uploader: Option<String>,
}

pub struct YoutubeDownloader {
    output_dir: PathBuf,
    custom_filename: Option<String>,
    events: Option<mpsc::UnboundedSender<DownloadEvent>>,
    cancelled: Arc<AtomicBool>,
}

impl YoutubeDownloader {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            custom_filename: None,
            events: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use this name (sans extension) instead of deriving one from the
    /// video title.
    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        self.custom_filename = Some(name.into());
        self
    }

    pub fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<DownloadEvent>) {
        self.events = Some(sender);
    }

    /// Flip the returned flag from anywhere to abort a running download.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_valid_url(url: &str) -> bool {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"^(https?://)?(www\.)?(youtube|youtu|youtube-nocookie)\.(com|be)/").unwrap()
        })
        .is_match(url)
    }

    /// Fetch `url` as an MP3 into the output directory and return the final
    /// path. Blocks until the subprocess finishes; run it off the playback
    /// thread.
    pub fn download(&self, url: &str) -> Result<PathBuf, DownloadError> {
        if !Self::is_valid_url(url) {
            let err = DownloadError::InvalidUrl(url.to_string());
            self.emit(DownloadEvent::Failed {
                url: url.to_string(),
                message: err.to_string(),
            });
            return Err(err);
        }

        self.emit(DownloadEvent::Started {
            url: url.to_string(),
        });

        let mut last_error = DownloadError::ToolNotFound;
        for tool in TOOL_CHAIN {
            let Some(binary) = find_in_path(tool.binary()) else {
                debug!("{} not on PATH", tool.binary());
                continue;
            };
            self.emit(DownloadEvent::Status(format!(
                "using {}",
                binary.display()
            )));

            match self.run_tool(&binary, url) {
                Ok(path) => {
                    info!("downloaded {} -> {}", url, path.display());
                    self.emit(DownloadEvent::Finished {
                        url: url.to_string(),
                        path: path.clone(),
                    });
                    return Ok(path);
                }
                Err(DownloadError::Cancelled) => {
                    self.emit(DownloadEvent::Failed {
                        url: url.to_string(),
                        message: "cancelled".to_string(),
                    });
                    return Err(DownloadError::Cancelled);
                }
                Err(e) => {
                    warn!("{} failed: {}", tool.binary(), e);
                    last_error = e;
                }
            }
        }

        self.emit(DownloadEvent::Failed {
            url: url.to_string(),
            message: last_error.to_string(),
        });
        Err(last_error)
    }

    fn run_tool(&self, binary: &Path, url: &str) -> Result<PathBuf, DownloadError> {
        let name = match &self.custom_filename {
            Some(name) => sanitize_filename(name),
            None => {
                self.emit(DownloadEvent::Status("fetching video title".to_string()));
                let metadata = self.fetch_metadata(binary, url)?;
                derive_output_name(&metadata.title, metadata.uploader.as_deref())
            }
        };

        std::fs::create_dir_all(&self.output_dir)?;
        let final_path = self.output_dir.join(format!("{}.mp3", name));
        if final_path.exists() {
            info!("already downloaded: {}", final_path.display());
            return Ok(final_path);
        }
        let template = self.output_dir.join(format!("{}.%(ext)s", name));

        let mut child = Command::new(binary)
            .args([
                "--no-playlist",
                "--newline",
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "0",
                "-o",
            ])
            .arg(&template)
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                if self.cancelled.load(Ordering::Relaxed) {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(DownloadError::Cancelled);
                }
                let line = line.unwrap_or_default();
                if let Some(percent) = parse_progress(&line) {
                    self.emit(DownloadEvent::Progress(percent));
                } else if !line.trim().is_empty() {
                    debug!("{}", line.trim());
                }
            }
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(DownloadError::ToolFailed(format!("exit status {}", status)));
        }
        if !final_path.exists() {
            return Err(DownloadError::OutputMissing(final_path));
        }
        Ok(final_path)
    }

    /// One `-j` invocation gets title and uploader without downloading.
    fn fetch_metadata(&self, binary: &Path, url: &str) -> Result<VideoMetadata, DownloadError> {
        let output = Command::new(binary)
            .args(["--no-playlist", "--skip-download", "-j"])
            .arg(url)
            .output()?;
        if !output.status.success() {
            return Err(DownloadError::ToolFailed(
                "could not read video metadata".to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| DownloadError::ToolFailed("no metadata in output".to_string()))?;
        let json: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| DownloadError::ToolFailed(format!("bad metadata json: {}", e)))?;

        Ok(VideoMetadata {
            title: json["title"].as_str().unwrap_or_default().to_string(),
            uploader: json["uploader"]
                .as_str()
                .or_else(|| json["channel"].as_str())
                .map(|s| s.to_string()),
        })
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let candidate = dir.join(format!("{}.exe", binary));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Build the output file stem from video metadata: "Artist - Title" when
/// recognizable, with the channel name as artist fallback, capped in length
/// and stripped of characters filesystems reject.
fn derive_output_name(title: &str, uploader: Option<&str>) -> String {
    let mut formatted = filename::format_artist_title(title);
    if !formatted.contains(" - ") {
        if let Some(uploader) = uploader {
            let artist = uploader.trim_end_matches(" - Topic").trim();
            if !artist.is_empty() && !formatted.is_empty() {
                formatted = format!("{} - {}", artist, formatted);
            }
        }
    }

    let mut name = sanitize_filename(&formatted);
    if name.chars().count() > MAX_NAME_CHARS {
        name = name.chars().take(MAX_NAME_CHARS - 3).collect::<String>();
        name.push_str("...");
    }
    if name.is_empty() {
        name = format!("download-{}", Uuid::new_v4());
    }
    name
}

fn parse_progress(line: &str) -> Option<f32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\[download\]\s+([\d.]+)%").unwrap());
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(YoutubeDownloader::is_valid_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YoutubeDownloader::is_valid_url("http://youtu.be/abc123"));
        assert!(YoutubeDownloader::is_valid_url(
            "youtube.com/watch?v=abc123"
        ));
        assert!(!YoutubeDownloader::is_valid_url(
            "https://vimeo.com/12345"
        ));
        assert!(!YoutubeDownloader::is_valid_url("not a url"));
    }

    #[test]
    fn test_parse_progress_lines() {
        assert_eq!(
            parse_progress("[download]  42.3% of 3.50MiB at 1.2MiB/s ETA 00:02"),
            Some(42.3)
        );
        assert_eq!(parse_progress("[download] 100% of 3.50MiB"), Some(100.0));
        assert_eq!(parse_progress("[ffmpeg] Destination: out.mp3"), None);
        assert_eq!(parse_progress(""), None);
    }

    #[test]
    fn test_derive_output_name_from_title() {
        assert_eq!(
            derive_output_name("Linkin Park - Numb (Official Video)", Some("Whoever")),
            "Linkin Park - Numb"
        );
    }

    #[test]
    fn test_derive_output_name_uses_uploader_fallback() {
        assert_eq!(
            derive_output_name("Numb", Some("Linkin Park - Topic")),
            "Linkin Park - Numb"
        );
        // no uploader, no pattern: just the cleaned title
        assert_eq!(derive_output_name("Numb", None), "Numb");
    }

    #[test]
    fn test_derive_output_name_sanitizes_and_truncates() {
        let name = derive_output_name("AC/DC - T.N.T?", None);
        assert_eq!(name, "AC-DC - T.N.T-");

        let long = "x".repeat(300);
        let name = derive_output_name(&long, None);
        assert_eq!(name.chars().count(), MAX_NAME_CHARS);
        assert!(name.ends_with("..."));
    }

    #[test]
    fn test_invalid_url_is_rejected_before_spawning() {
        let downloader = YoutubeDownloader::new(std::env::temp_dir());
        let result = downloader.download("https://example.com/nope");
        assert!(matches!(result, Err(DownloadError::InvalidUrl(_))));
    }
}
