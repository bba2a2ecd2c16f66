// Filename metadata parsing. Files fetched from YouTube usually have no
// tags at all, just an "Artist - Title" style name, so both the scanner and
// the downloader lean on these helpers.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

fn artist_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // dash variants and colon, with surrounding whitespace
    RE.get_or_init(|| Regex::new(r"^(.*?)\s*[-\u{2013}\u{2014}:]\s+(.*)$").unwrap())
}

fn title_by_artist_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.*\S)\s+by\s+(\S.*)$").unwrap())
}

fn noise_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // trailing "(Official Video)", "[Lyrics]" and friends
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*[(\[](?:official|lyric|lyrics|audio|video|visualizer|hd|hq)[^)\]]*[)\]]\s*$")
            .unwrap()
    })
}

/// Split a file stem of the form "Artist - Title" into its two halves.
/// Returns `None` when no separator is present.
pub fn split_artist_title(stem: &str) -> Option<(String, String)> {
    let caps = artist_title_re().captures(stem)?;
    let artist = caps.get(1)?.as_str().trim();
    let title = caps.get(2)?.as_str().trim();
    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((artist.to_string(), title.to_string()))
}

/// Best-effort title from a path: the title half of "Artist - Title", or
/// the whole stem.
pub fn title_from_path(path: &Path) -> String {
    let stem = stem_of(path);
    match split_artist_title(&stem) {
        Some((_, title)) => title,
        None if stem.is_empty() => "Unknown Title".to_string(),
        None => stem,
    }
}

/// Best-effort artist from a path; `None` when the name carries no artist.
pub fn artist_from_path(path: &Path) -> Option<String> {
    split_artist_title(&stem_of(path)).map(|(artist, _)| artist)
}

/// Strip "(Official Video)"-style suffixes that video titles accumulate.
pub fn clean_video_title(title: &str) -> String {
    let mut cleaned = title.trim().to_string();
    // suffixes can stack ("... (Official Video) [HD]"), peel until stable
    loop {
        let next = noise_suffix_re().replace(&cleaned, "").trim().to_string();
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    cleaned
}

/// Turn a raw video title into an "Artist - Title" display name.
/// Recognizes "Artist - Title", "Artist: Title" and "Title by Artist";
/// anything else is returned cleaned but unchanged.
pub fn format_artist_title(video_title: &str) -> String {
    let cleaned = clean_video_title(video_title);
    if let Some((artist, title)) = split_artist_title(&cleaned) {
        return format!("{} - {}", artist, clean_video_title(&title));
    }
    if let Some(caps) = title_by_artist_re().captures(&cleaned) {
        let title = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let artist = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if !title.is_empty() && !artist.is_empty() {
            return format!("{} - {}", artist, title);
        }
    }
    cleaned
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("")
        .trim()
        .to_string()
}
