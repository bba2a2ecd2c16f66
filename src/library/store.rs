use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use super::track::{Track, TrackMetadata};
use super::{AudioFormat, ResolvedTrack, TrackStore};

/// SQLite-backed track catalog. One connection, owned by the caller;
/// everything here is plain single-threaded CRUD.
pub struct Library {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub track_count: usize,
}

impl Library {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let library = Self { conn };
        library.initialize_tables()?;
        Ok(library)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filepath TEXT UNIQUE NOT NULL,
                title TEXT,
                artist TEXT,
                album TEXT,
                genre TEXT,
                year INTEGER,
                track_number INTEGER,
                duration_ms INTEGER,
                format TEXT NOT NULL DEFAULT 'Unknown',
                added_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS playlists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS playlist_tracks (
                playlist_id INTEGER NOT NULL,
                track_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (playlist_id, track_id),
                FOREIGN KEY (playlist_id) REFERENCES playlists (id) ON DELETE CASCADE,
                FOREIGN KEY (track_id) REFERENCES tracks (id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks (artist)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks (album)",
            [],
        )?;

        Ok(())
    }

    /// Insert a track, or update the existing row with the same filepath.
    /// Returns the track's id either way.
    pub fn add_or_update_track(&self, track: &Track) -> Result<i64> {
        let filepath = path_to_text(&track.file_path);
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM tracks WHERE filepath = ?1",
                params![filepath],
                |row| row.get(0),
            )
            .optional()?;

        let m = &track.metadata;
        match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE tracks SET
                        title = ?1, artist = ?2, album = ?3, genre = ?4,
                        year = ?5, track_number = ?6, duration_ms = ?7, format = ?8
                     WHERE id = ?9",
                    params![
                        m.title,
                        m.artist,
                        m.album,
                        m.genre,
                        m.year,
                        m.track_number,
                        m.duration_ms.map(|d| d as i64),
                        format_to_text(track.format),
                        id,
                    ],
                )?;
                Ok(id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO tracks
                        (filepath, title, artist, album, genre, year, track_number,
                         duration_ms, format, added_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        filepath,
                        m.title,
                        m.artist,
                        m.album,
                        m.genre,
                        m.year,
                        m.track_number,
                        m.duration_ms.map(|d| d as i64),
                        format_to_text(track.format),
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    pub fn all_tracks(&self) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, filepath, title, artist, album, genre, year, track_number,
                    duration_ms, format
             FROM tracks ORDER BY artist, album, track_number, title",
        )?;
        let tracks = stmt
            .query_map([], row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    pub fn track_by_id(&self, track_id: i64) -> Result<Option<Track>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, filepath, title, artist, album, genre, year, track_number,
                    duration_ms, format
             FROM tracks WHERE id = ?1",
        )?;
        let track = stmt
            .query_row(params![track_id], row_to_track)
            .optional()?;
        Ok(track)
    }

    pub fn tracks_by_ids(&self, track_ids: &[i64]) -> Result<Vec<Track>> {
        let mut tracks = Vec::with_capacity(track_ids.len());
        for &id in track_ids {
            if let Some(track) = self.track_by_id(id)? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    /// Drop catalog rows whose files are gone from disk. `valid_paths` is
    /// the full set the scanner just saw; an empty set is refused so a
    /// botched scan cannot wipe the catalog.
    pub fn remove_missing(&self, valid_paths: &[PathBuf]) -> Result<usize> {
        if valid_paths.is_empty() {
            warn!("remove_missing called with no valid paths, skipping delete");
            return Ok(0);
        }

        self.conn
            .execute("CREATE TEMP TABLE valid_files (path TEXT PRIMARY KEY)", [])?;
        let mut insert = self
            .conn
            .prepare("INSERT OR IGNORE INTO valid_files (path) VALUES (?1)")?;
        for path in valid_paths {
            insert.execute(params![path_to_text(path)])?;
        }
        drop(insert);

        let removed = self.conn.execute(
            "DELETE FROM tracks
             WHERE filepath NOT IN (SELECT path FROM valid_files)",
            [],
        )?;
        self.conn.execute("DROP TABLE valid_files", [])?;

        if removed > 0 {
            info!("removed {} tracks whose files no longer exist", removed);
        }
        Ok(removed)
    }

    pub fn create_playlist(&self, name: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO playlists (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().to_rfc3339()],
        )?;
        info!("created playlist '{}'", name);
        Ok(self.conn.last_insert_rowid())
    }

    pub fn delete_playlist(&self, playlist_id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM playlists WHERE id = ?1", params![playlist_id])?;
        Ok(removed > 0)
    }

    pub fn playlists(&self) -> Result<Vec<Playlist>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, COUNT(pt.track_id)
             FROM playlists p
             LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.id
             GROUP BY p.id ORDER BY p.name",
        )?;
        let playlists = stmt
            .query_map([], |row| {
                Ok(Playlist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    track_count: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    pub fn playlist_by_name(&self, name: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM playlists WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Append a track to a playlist. Re-adding an existing track moves it
    /// to the end.
    pub fn add_track_to_playlist(&self, playlist_id: i64, track_id: i64) -> Result<()> {
        let next_position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1
             FROM playlist_tracks WHERE playlist_id = ?1",
            params![playlist_id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO playlist_tracks (playlist_id, track_id, position)
             VALUES (?1, ?2, ?3)",
            params![playlist_id, track_id, next_position],
        )?;
        Ok(())
    }

    pub fn remove_track_from_playlist(&self, playlist_id: i64, track_id: i64) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM playlist_tracks WHERE playlist_id = ?1 AND track_id = ?2",
            params![playlist_id, track_id],
        )?;
        Ok(removed > 0)
    }

    pub fn playlist_tracks(&self, playlist_id: i64) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.filepath, t.title, t.artist, t.album, t.genre, t.year,
                    t.track_number, t.duration_ms, t.format
             FROM tracks t
             JOIN playlist_tracks pt ON t.id = pt.track_id
             WHERE pt.playlist_id = ?1
             ORDER BY pt.position",
        )?;
        let tracks = stmt
            .query_map(params![playlist_id], row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }
}

impl TrackStore for Library {
    fn resolve(&self, track_id: i64) -> Option<ResolvedTrack> {
        let track = self.track_by_id(track_id).ok().flatten()?;
        Some(ResolvedTrack {
            id: track_id,
            title: track.display_title(),
            artist: track.display_artist(),
            duration_ms: track.metadata.duration_ms,
            file_path: track.file_path,
        })
    }
}

fn row_to_track(row: &Row) -> rusqlite::Result<Track> {
    let filepath: String = row.get(1)?;
    let format_text: String = row.get(9)?;
    Ok(Track {
        id: Some(row.get(0)?),
        file_path: PathBuf::from(filepath),
        metadata: TrackMetadata {
            title: row.get(2)?,
            artist: row.get(3)?,
            album: row.get(4)?,
            genre: row.get(5)?,
            year: row.get(6)?,
            track_number: row.get(7)?,
            duration_ms: row.get::<_, Option<i64>>(8)?.map(|d| d as u64),
        },
        format: text_to_format(&format_text),
    })
}

fn path_to_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn format_to_text(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Mp3 => "Mp3",
        AudioFormat::Flac => "Flac",
        AudioFormat::Ogg => "Ogg",
        AudioFormat::Mp4 => "Mp4",
        AudioFormat::Wav => "Wav",
        AudioFormat::Unknown => "Unknown",
    }
}

fn text_to_format(text: &str) -> AudioFormat {
    match text {
        "Mp3" => AudioFormat::Mp3,
        "Flac" => AudioFormat::Flac,
        "Ogg" => AudioFormat::Ogg,
        "Mp4" => AudioFormat::Mp4,
        "Wav" => AudioFormat::Wav,
        _ => AudioFormat::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track(path: &str, title: &str, artist: &str) -> Track {
        let mut track = Track::new(PathBuf::from(path));
        track.metadata.title = Some(title.to_string());
        track.metadata.artist = Some(artist.to_string());
        track.metadata.duration_ms = Some(180_000);
        track
    }

    #[test]
    fn test_add_then_update_keeps_id() {
        let library = Library::open_in_memory().unwrap();
        let track = sample_track("/music/a.mp3", "First", "Someone");
        let id = library.add_or_update_track(&track).unwrap();

        let mut updated = track.clone();
        updated.metadata.title = Some("Renamed".to_string());
        let id_again = library.add_or_update_track(&updated).unwrap();

        assert_eq!(id, id_again);
        let stored = library.track_by_id(id).unwrap().unwrap();
        assert_eq!(stored.metadata.title.as_deref(), Some("Renamed"));
        assert_eq!(library.all_tracks().unwrap().len(), 1);
    }

    #[test]
    fn test_track_by_id_missing() {
        let library = Library::open_in_memory().unwrap();
        assert!(library.track_by_id(42).unwrap().is_none());
    }

    #[test]
    fn test_tracks_by_ids_preserves_order() {
        let library = Library::open_in_memory().unwrap();
        let a = library
            .add_or_update_track(&sample_track("/m/a.mp3", "A", "X"))
            .unwrap();
        let b = library
            .add_or_update_track(&sample_track("/m/b.mp3", "B", "X"))
            .unwrap();
        let tracks = library.tracks_by_ids(&[b, a]).unwrap();
        let titles: Vec<_> = tracks.iter().map(|t| t.display_title()).collect();
        assert_eq!(titles, vec!["B", "A"]);
    }

    #[test]
    fn test_remove_missing_prunes_stale_rows() {
        let library = Library::open_in_memory().unwrap();
        library
            .add_or_update_track(&sample_track("/m/keep.mp3", "Keep", "X"))
            .unwrap();
        library
            .add_or_update_track(&sample_track("/m/gone.mp3", "Gone", "X"))
            .unwrap();

        let removed = library
            .remove_missing(&[PathBuf::from("/m/keep.mp3")])
            .unwrap();
        assert_eq!(removed, 1);

        let remaining = library.all_tracks().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].display_title(), "Keep");
    }

    #[test]
    fn test_remove_missing_refuses_empty_set() {
        let library = Library::open_in_memory().unwrap();
        library
            .add_or_update_track(&sample_track("/m/a.mp3", "A", "X"))
            .unwrap();
        assert_eq!(library.remove_missing(&[]).unwrap(), 0);
        assert_eq!(library.all_tracks().unwrap().len(), 1);
    }

    #[test]
    fn test_playlist_membership_is_ordered() {
        let library = Library::open_in_memory().unwrap();
        let a = library
            .add_or_update_track(&sample_track("/m/a.mp3", "A", "X"))
            .unwrap();
        let b = library
            .add_or_update_track(&sample_track("/m/b.mp3", "B", "X"))
            .unwrap();
        let c = library
            .add_or_update_track(&sample_track("/m/c.mp3", "C", "X"))
            .unwrap();

        let playlist = library.create_playlist("road trip").unwrap();
        library.add_track_to_playlist(playlist, c).unwrap();
        library.add_track_to_playlist(playlist, a).unwrap();
        library.add_track_to_playlist(playlist, b).unwrap();

        let titles: Vec<_> = library
            .playlist_tracks(playlist)
            .unwrap()
            .iter()
            .map(|t| t.display_title())
            .collect();
        assert_eq!(titles, vec!["C", "A", "B"]);

        assert!(library.remove_track_from_playlist(playlist, a).unwrap());
        assert_eq!(library.playlist_tracks(playlist).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_playlist_cascades() {
        let library = Library::open_in_memory().unwrap();
        let a = library
            .add_or_update_track(&sample_track("/m/a.mp3", "A", "X"))
            .unwrap();
        let playlist = library.create_playlist("temp").unwrap();
        library.add_track_to_playlist(playlist, a).unwrap();

        assert!(library.delete_playlist(playlist).unwrap());
        assert!(library.playlists().unwrap().is_empty());
        // the track itself stays
        assert_eq!(library.all_tracks().unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_uses_display_fallbacks() {
        let library = Library::open_in_memory().unwrap();
        // no tags at all, YouTube-style filename
        let track = Track::new(PathBuf::from("/m/Linkin Park - Numb.mp3"));
        let id = library.add_or_update_track(&track).unwrap();

        let resolved = library.resolve(id).unwrap();
        assert_eq!(resolved.title, "Numb");
        assert_eq!(resolved.artist, "Linkin Park");
        assert!(library.resolve(id + 1).is_none());
    }
}
