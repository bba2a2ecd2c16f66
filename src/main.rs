// ocarina - music player with a terminal shell
// scan a library, play it with shuffle/repeat, pull new tracks off YouTube

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tokio::sync::mpsc;

use ocarina::audio::PlaybackMode;
use ocarina::config::Config;
use ocarina::download::{DownloadEvent, YoutubeDownloader};
use ocarina::library::{Library, MusicScanner, ScanProgress};
use ocarina::ui::App;

#[derive(Parser)]
#[command(name = "ocarina", version, about = "Desktop music player core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the music directories into the library
    Scan {
        /// Extra directories to scan besides the configured ones
        #[arg(value_name = "DIR")]
        directories: Vec<PathBuf>,
    },
    /// List library tracks, optionally fuzzy-filtered
    List {
        /// Match against artist, title and album
        filter: Option<String>,
    },
    /// Play the library (or one playlist)
    Play {
        #[arg(long, value_enum, default_value_t = ModeArg::Sequential)]
        mode: ModeArg,
        /// Track id to start from
        #[arg(long)]
        start: Option<i64>,
        /// Play a named playlist instead of the whole library
        #[arg(long)]
        playlist: Option<String>,
    },
    /// Download a YouTube video as MP3 and add it to the library
    Download {
        url: String,
        /// Output filename, without extension
        #[arg(long)]
        filename: Option<String>,
    },
    /// Manage playlists
    Playlist {
        #[command(subcommand)]
        action: PlaylistCommand,
    },
}

#[derive(Subcommand)]
enum PlaylistCommand {
    Create { name: String },
    List,
    Show { name: String },
    Add { name: String, track_id: i64 },
    Remove { name: String, track_id: i64 },
    Delete { name: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Sequential,
    RepeatOne,
    RepeatAll,
    Shuffle,
}

impl From<ModeArg> for PlaybackMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => PlaybackMode::Sequential,
            ModeArg::RepeatOne => PlaybackMode::RepeatOne,
            ModeArg::RepeatAll => PlaybackMode::RepeatAll,
            ModeArg::Shuffle => PlaybackMode::Shuffle,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing();
    let config = Config::load()?;

    match cli.command {
        Command::Scan { directories } => scan(&config, directories).await,
        Command::List { filter } => list(&config, filter),
        Command::Play {
            mode,
            start,
            playlist,
        } => play(&config, mode.into(), start, playlist).await,
        Command::Download { url, filename } => download(&config, url, filename).await,
        Command::Playlist { action } => playlist_command(&config, action),
    }
}

async fn scan(config: &Config, extra: Vec<PathBuf>) -> Result<()> {
    let library = Library::new(&config.database_path)?;
    let scanner = MusicScanner::new();
    let mut directories = config.music_directories.clone();
    directories.extend(extra);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::task::spawn_blocking(move || {
        scanner.sync_library(&library, &directories, Some(&tx))
    });

    while let Some(event) = rx.recv().await {
        match event {
            ScanProgress::DirectoryStarted { path } => {
                println!("scanning {}", path.display());
            }
            ScanProgress::TrackFound { tracks_so_far, .. } => {
                if tracks_so_far % 100 == 0 {
                    println!("  {} tracks...", tracks_so_far);
                }
            }
            ScanProgress::DirectoryCompleted { path, tracks_found } => {
                println!("  {} tracks in {}", tracks_found, path.display());
            }
            ScanProgress::Completed { total_tracks, removed } => {
                println!("done: {} tracks ({} stale entries removed)", total_tracks, removed);
            }
            ScanProgress::Error { path, error } => {
                eprintln!("  ! {}: {}", path.display(), error);
            }
            ScanProgress::Started { .. } => {}
        }
    }

    handle.await??;
    Ok(())
}

fn list(config: &Config, filter: Option<String>) -> Result<()> {
    let library = Library::new(&config.database_path)?;
    let matcher = SkimMatcherV2::default();
    let mut shown = 0usize;

    for track in library.all_tracks()? {
        if let Some(filter) = &filter {
            let haystack = format!(
                "{} {} {}",
                track.display_artist(),
                track.display_title(),
                track.display_album()
            );
            if matcher.fuzzy_match(&haystack, filter).is_none() {
                continue;
            }
        }
        println!(
            "{:>5}  {} - {}  [{}]",
            track.id.unwrap_or_default(),
            track.display_artist(),
            track.display_title(),
            track.display_duration()
        );
        shown += 1;
    }

    if shown == 0 {
        println!("no tracks found - run `ocarina scan` first");
    }
    Ok(())
}

async fn play(
    config: &Config,
    mode: PlaybackMode,
    start: Option<i64>,
    playlist: Option<String>,
) -> Result<()> {
    let library = Library::new(&config.database_path)?;

    let track_ids: Vec<i64> = match &playlist {
        Some(name) => {
            let playlist_id = library
                .playlist_by_name(name)?
                .ok_or_else(|| anyhow!("no playlist named '{}'", name))?;
            library
                .playlist_tracks(playlist_id)?
                .iter()
                .filter_map(|t| t.id)
                .collect()
        }
        None => library.all_tracks()?.iter().filter_map(|t| t.id).collect(),
    };

    if track_ids.is_empty() {
        println!("nothing to play - run `ocarina scan` first");
        return Ok(());
    }

    let mut app = App::new(config, library)?;
    app.run(&track_ids, mode, start).await
}

async fn download(config: &Config, url: String, filename: Option<String>) -> Result<()> {
    let mut downloader = YoutubeDownloader::new(config.download_directory.clone());
    if let Some(name) = filename {
        downloader = downloader.with_filename(name);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    downloader.set_event_sender(tx);

    let target = url.clone();
    let handle = tokio::task::spawn_blocking(move || downloader.download(&target));

    while let Some(event) = rx.recv().await {
        match event {
            DownloadEvent::Started { url } => println!("downloading {}", url),
            DownloadEvent::Status(status) => println!("{}", status),
            DownloadEvent::Progress(percent) => {
                print!("\r{:>5.1}%", percent);
                let _ = std::io::stdout().flush();
            }
            DownloadEvent::Finished { path, .. } => {
                println!("\rsaved {}", path.display());
            }
            DownloadEvent::Failed { message, .. } => {
                println!("\rfailed: {}", message);
            }
        }
    }

    let path = handle.await??;

    // register it so it's playable right away
    let library = Library::new(&config.database_path)?;
    let track = MusicScanner::new().scan_file(&path)?;
    let id = library.add_or_update_track(&track)?;
    println!("added to library as track {}", id);
    Ok(())
}

fn playlist_command(config: &Config, action: PlaylistCommand) -> Result<()> {
    let library = Library::new(&config.database_path)?;

    match action {
        PlaylistCommand::Create { name } => {
            library.create_playlist(&name)?;
            println!("created playlist '{}'", name);
        }
        PlaylistCommand::List => {
            let playlists = library.playlists()?;
            if playlists.is_empty() {
                println!("no playlists");
            }
            for playlist in playlists {
                println!(
                    "{:>5}  {} ({} tracks)",
                    playlist.id, playlist.name, playlist.track_count
                );
            }
        }
        PlaylistCommand::Show { name } => {
            let playlist_id = require_playlist(&library, &name)?;
            for track in library.playlist_tracks(playlist_id)? {
                println!(
                    "{:>5}  {} - {}",
                    track.id.unwrap_or_default(),
                    track.display_artist(),
                    track.display_title()
                );
            }
        }
        PlaylistCommand::Add { name, track_id } => {
            let playlist_id = require_playlist(&library, &name)?;
            if library.track_by_id(track_id)?.is_none() {
                return Err(anyhow!("no track with id {}", track_id));
            }
            library.add_track_to_playlist(playlist_id, track_id)?;
            println!("added track {} to '{}'", track_id, name);
        }
        PlaylistCommand::Remove { name, track_id } => {
            let playlist_id = require_playlist(&library, &name)?;
            if library.remove_track_from_playlist(playlist_id, track_id)? {
                println!("removed track {} from '{}'", track_id, name);
            } else {
                println!("track {} is not in '{}'", track_id, name);
            }
        }
        PlaylistCommand::Delete { name } => {
            let playlist_id = require_playlist(&library, &name)?;
            library.delete_playlist(playlist_id)?;
            println!("deleted playlist '{}'", name);
        }
    }
    Ok(())
}

fn require_playlist(library: &Library, name: &str) -> Result<i64> {
    library
        .playlist_by_name(name)?
        .ok_or_else(|| anyhow!("no playlist named '{}'", name))
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ocarina=warn"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match Config::log_dir() {
        Some(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, "ocarina.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}
