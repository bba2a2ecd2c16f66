// Ocarina - desktop music player core
// The GUI-less subsystems a desktop shell sits on: catalog, scanner,
// playback queue, audio engine, and the YouTube fetcher.

pub mod audio;     // playback engine + queue controller
pub mod config;    // settings and paths
pub mod download;  // YouTube-to-MP3 fetching
pub mod library;   // scanner, tags, SQLite catalog
pub mod ui;        // terminal playback shell

// Export the types most hosts actually touch
pub use audio::{PlaybackController, PlaybackMode, PlaybackState, PlayerEvent};
pub use config::Config;
pub use library::{Library, MusicScanner, Track, TrackStore};
