// The playback queue controller. Owns the queue, the position, and the
// playback mode; decides what plays next on every transition (track end,
// skip, error, mode change) and drives the media engine accordingly.
//
// Single-threaded by design: the host serializes commands and engine
// notifications, so queue/position are never observed mid-update.

use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::engine::{EngineEvent, MediaEngine};
use super::{PlaybackMode, PlaybackState};
use crate::library::{ResolvedTrack, TrackStore};

pub const DEFAULT_VOLUME: u8 = 50;

/// Hitting "previous" deeper than this into a track restarts it instead of
/// moving back through the queue.
const RESTART_THRESHOLD_MS: u64 = 3000;

/// Notifications for the host application. Emitted in the order the
/// transitions happen; the host renders them however it likes.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// The selected track changed; `None` means nothing is selected.
    TrackChanged(Option<ResolvedTrack>),
    QueueChanged(Vec<i64>),
    ModeChanged(PlaybackMode),
    StateChanged(PlaybackState),
    PositionChanged(u64),
    DurationChanged(u64),
    VolumeChanged(u8),
    PlaybackError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Next,
    Previous,
}

pub struct PlaybackController<E: MediaEngine, S: TrackStore> {
    engine: E,
    store: S,
    /// Play order. Rebuilt wholesale on mode change or a new playlist,
    /// never edited element by element.
    queue: Vec<i64>,
    /// The order the caller supplied, kept so leaving shuffle can restore it.
    original_order: Vec<i64>,
    position: Option<usize>,
    mode: PlaybackMode,
    state: PlaybackState,
    current: Option<ResolvedTrack>,
    volume: u8,
    events: Option<mpsc::UnboundedSender<PlayerEvent>>,
}

impl<E: MediaEngine, S: TrackStore> PlaybackController<E, S> {
    pub fn new(engine: E, store: S) -> Self {
        let mut engine = engine;
        engine.set_volume(DEFAULT_VOLUME as f32 / 100.0);
        Self {
            engine,
            store,
            queue: Vec::new(),
            original_order: Vec::new(),
            position: None,
            mode: PlaybackMode::default(),
            state: PlaybackState::Stopped,
            current: None,
            volume: DEFAULT_VOLUME,
            events: None,
        }
    }

    pub fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<PlayerEvent>) {
        self.events = Some(sender);
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn queue(&self) -> &[i64] {
        &self.queue
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn current_track(&self) -> Option<&ResolvedTrack> {
        self.current.as_ref()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Load a new play queue and start playback.
    ///
    /// An empty `track_ids` is rejected outright: no state is touched and
    /// no notification fires. With `start_track_id` set, playback starts at
    /// that track's index in the (possibly shuffled) queue; otherwise at 0.
    pub fn set_playlist(
        &mut self,
        track_ids: &[i64],
        mode: PlaybackMode,
        start_track_id: Option<i64>,
    ) {
        if track_ids.is_empty() {
            warn!("ignoring empty playlist");
            return;
        }

        self.original_order = track_ids.to_vec();
        self.queue = track_ids.to_vec();
        self.mode = mode;
        if mode == PlaybackMode::Shuffle {
            let mut rng = rand::thread_rng();
            self.queue.shuffle(&mut rng);
        }

        let start = match start_track_id {
            Some(id) => match self.queue.iter().position(|&t| t == id) {
                Some(index) => index,
                None => {
                    warn!("start track {} not in playlist, starting from the top", id);
                    0
                }
            },
            None => 0,
        };

        info!(
            "playlist loaded: {} tracks, mode {}, starting at index {}",
            self.queue.len(),
            mode.label(),
            start
        );
        self.start_playback_at(start);
    }

    /// Play the track at a queue index. An out-of-range index logs, reports
    /// and degrades to a stop.
    pub fn play_at(&mut self, index: usize) {
        if index >= self.queue.len() {
            warn!("invalid playback index: {}", index);
            self.emit(PlayerEvent::PlaybackError(format!(
                "invalid queue index {}",
                index
            )));
            self.stop();
            return;
        }
        self.start_playback_at(index);
    }

    /// Start or resume playback.
    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Paused => {
                debug!("resuming");
                self.engine.play();
                self.set_state(PlaybackState::Playing);
            }
            PlaybackState::Playing => {}
            PlaybackState::Stopped => {
                if let Some(position) = self.position {
                    self.start_playback_at(position);
                } else if !self.queue.is_empty() {
                    self.start_playback_at(0);
                } else {
                    debug!("play requested with no queue loaded");
                }
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.engine.pause();
            self.set_state(PlaybackState::Paused);
        }
    }

    pub fn toggle_play_pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Stop playback and clear the selection. The queue itself survives.
    pub fn stop(&mut self) {
        debug!("playback stopped");
        self.engine.stop();
        self.position = None;
        self.current = None;
        self.set_state(PlaybackState::Stopped);
        self.emit(PlayerEvent::TrackChanged(None));
    }

    pub fn next(&mut self) {
        self.advance(Direction::Next, false);
    }

    pub fn previous(&mut self) {
        self.advance(Direction::Previous, false);
    }

    pub fn seek(&mut self, position_ms: u64) {
        if self.current.is_some() {
            self.engine.seek(position_ms);
        }
    }

    /// Volume in 0..=100, clamped, passed straight through to the engine.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        self.engine.set_volume(self.volume as f32 / 100.0);
        self.emit(PlayerEvent::VolumeChanged(self.volume));
    }

    /// Switch playback mode, rebuilding the queue as needed.
    ///
    /// Entering shuffle reshuffles the original order and swaps the playing
    /// track to the front so the audible track doesn't jump; leaving it
    /// restores the original order and re-finds the playing track. Playback
    /// state is untouched either way.
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        if mode == self.mode {
            return;
        }
        info!("playback mode set to {}", mode.label());

        let current_id = self.position.map(|p| self.queue[p]);
        self.queue = self.original_order.clone();

        if mode == PlaybackMode::Shuffle {
            self.shuffle_queue(current_id);
        } else {
            self.position = match current_id.and_then(|id| self.queue.iter().position(|&t| t == id))
            {
                Some(index) => Some(index),
                None if self.queue.is_empty() => None,
                None => Some(0),
            };
        }

        self.mode = mode;
        self.emit(PlayerEvent::QueueChanged(self.queue.clone()));
        self.emit(PlayerEvent::ModeChanged(mode));
    }

    /// Feed one engine notification through the state machine.
    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::EndOfMedia => {
                if self.state == PlaybackState::Playing {
                    debug!("track finished, advancing");
                    self.advance(Direction::Next, true);
                }
            }
            EngineEvent::Error(message) => {
                warn!("engine error: {}", message);
                self.emit(PlayerEvent::PlaybackError(message));
                if self.queue.is_empty() {
                    self.stop();
                } else {
                    self.advance(Direction::Next, true);
                }
            }
            EngineEvent::PositionChanged(ms) => self.emit(PlayerEvent::PositionChanged(ms)),
            EngineEvent::DurationChanged(ms) => self.emit(PlayerEvent::DurationChanged(ms)),
        }
    }

    /// Poll the engine and process whatever it reports. The host calls this
    /// on its event-loop tick.
    pub fn tick(&mut self) {
        for event in self.engine.poll() {
            self.handle_engine_event(event);
        }
    }

    fn advance(&mut self, direction: Direction, implicit: bool) {
        if self.queue.is_empty() {
            self.stop();
            return;
        }
        let len = self.queue.len();

        let position = match self.position {
            Some(p) => p,
            None => {
                // nothing selected: next starts the queue, previous enters
                // from the end on wrapping modes
                let start = match direction {
                    Direction::Next => 0,
                    Direction::Previous => match self.mode {
                        PlaybackMode::RepeatAll | PlaybackMode::Shuffle => len - 1,
                        _ => 0,
                    },
                };
                self.start_playback_at(start);
                return;
            }
        };

        if self.mode == PlaybackMode::RepeatOne {
            debug!("repeat-one: replaying current track");
            self.start_playback_at(position);
            return;
        }

        match direction {
            Direction::Next => {
                if position + 1 < len {
                    self.start_playback_at(position + 1);
                } else {
                    match self.mode {
                        PlaybackMode::Sequential => {
                            info!(
                                "end of queue reached{}",
                                if implicit { " after track finished" } else { "" }
                            );
                            self.stop();
                        }
                        _ => {
                            debug!("end of queue, wrapping to start");
                            self.start_playback_at(0);
                        }
                    }
                }
            }
            Direction::Previous => {
                if position == 0 {
                    match self.mode {
                        PlaybackMode::RepeatAll | PlaybackMode::Shuffle => {
                            self.start_playback_at(len - 1);
                        }
                        // start of the queue: restart the first track
                        _ => self.start_playback_at(0),
                    }
                } else if self.engine.position_ms() > RESTART_THRESHOLD_MS {
                    // deep enough into the track that "previous" means
                    // "from the top"
                    self.engine.seek(0);
                } else {
                    self.start_playback_at(position - 1);
                }
            }
        }
    }

    /// Resolve and start the track at `start`, sweeping forward past
    /// unplayable entries. At most one `PlaybackError` fires per call: the
    /// first failure when something later plays, or a single terminal one
    /// when every index has been tried without success.
    fn start_playback_at(&mut self, start: usize) {
        let len = self.queue.len();
        let mut index = start;
        let mut first_failure: Option<String> = None;

        for _ in 0..len {
            match self.try_play(index) {
                Ok(track) => {
                    self.position = Some(index);
                    info!(
                        "playing [{}/{}]: {} - {}",
                        index + 1,
                        len,
                        track.artist,
                        track.title
                    );
                    if let Some(message) = first_failure.take() {
                        self.emit(PlayerEvent::PlaybackError(message));
                    }
                    self.current = Some(track.clone());
                    self.set_state(PlaybackState::Playing);
                    self.emit(PlayerEvent::TrackChanged(Some(track)));
                    return;
                }
                Err(message) => {
                    warn!("{}", message);
                    first_failure.get_or_insert(message);
                    index = match self.skip_target(index) {
                        Some(next) => next,
                        None => break,
                    };
                }
            }
        }

        let message =
            first_failure.unwrap_or_else(|| "no playable tracks in queue".to_string());
        self.stop();
        self.emit(PlayerEvent::PlaybackError(message));
    }

    /// Forward neighbor for the unplayable-track sweep. `None` once a
    /// non-wrapping queue runs off the end.
    fn skip_target(&self, index: usize) -> Option<usize> {
        if index + 1 < self.queue.len() {
            Some(index + 1)
        } else {
            match self.mode {
                PlaybackMode::Sequential => None,
                _ => Some(0),
            }
        }
    }

    fn try_play(&mut self, index: usize) -> Result<ResolvedTrack, String> {
        let track_id = self.queue[index];
        let track = self
            .store
            .resolve(track_id)
            .ok_or_else(|| format!("track {} not found in library", track_id))?;
        if !track.file_path.exists() {
            return Err(format!(
                "file missing for track {}: {}",
                track_id,
                track.file_path.display()
            ));
        }
        self.engine
            .load(&track.file_path)
            .map_err(|e| format!("cannot play track {}: {}", track_id, e))?;
        self.engine.play();
        Ok(track)
    }

    /// Uniform shuffle of the whole queue, then swap the playing track to
    /// the front so exactly one other element trades places with it.
    fn shuffle_queue(&mut self, current_id: Option<i64>) {
        let mut rng = rand::thread_rng();
        self.queue.shuffle(&mut rng);

        match current_id {
            Some(id) => {
                if let Some(index) = self.queue.iter().position(|&t| t == id) {
                    self.queue.swap(0, index);
                }
                self.position = Some(0);
            }
            None => {
                self.position = if self.queue.is_empty() { None } else { Some(0) };
            }
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            self.state = state;
            self.emit(PlayerEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ResolvedTrack;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    #[derive(Default)]
    struct EngineProbe {
        commands: Vec<String>,
        position_ms: u64,
    }

    /// Engine double that records every command and serves a scripted
    /// playback position.
    struct FakeEngine {
        probe: Rc<RefCell<EngineProbe>>,
    }

    impl MediaEngine for FakeEngine {
        fn load(&mut self, path: &Path) -> anyhow::Result<()> {
            self.probe
                .borrow_mut()
                .commands
                .push(format!("load {}", path.display()));
            Ok(())
        }

        fn play(&mut self) {
            self.probe.borrow_mut().commands.push("play".to_string());
        }

        fn pause(&mut self) {
            self.probe.borrow_mut().commands.push("pause".to_string());
        }

        fn stop(&mut self) {
            self.probe.borrow_mut().commands.push("stop".to_string());
        }

        fn seek(&mut self, position_ms: u64) {
            let mut probe = self.probe.borrow_mut();
            probe.commands.push(format!("seek {}", position_ms));
            probe.position_ms = position_ms;
        }

        fn position_ms(&self) -> u64 {
            self.probe.borrow().position_ms
        }

        fn set_volume(&mut self, volume: f32) {
            self.probe
                .borrow_mut()
                .commands
                .push(format!("volume {:.2}", volume));
        }

        fn poll(&mut self) -> Vec<EngineEvent> {
            Vec::new()
        }
    }

    struct FakeStore {
        tracks: HashMap<i64, ResolvedTrack>,
    }

    impl TrackStore for FakeStore {
        fn resolve(&self, track_id: i64) -> Option<ResolvedTrack> {
            self.tracks.get(&track_id).cloned()
        }
    }

    struct Fixture {
        controller: PlaybackController<FakeEngine, FakeStore>,
        probe: Rc<RefCell<EngineProbe>>,
        events: mpsc::UnboundedReceiver<PlayerEvent>,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        /// Build a controller over tracks 1..=count; ids listed in
        /// `missing` resolve to files that don't exist on disk.
        fn new(count: i64, missing: &[i64]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut tracks = HashMap::new();
            for id in 1..=count {
                let file_path: PathBuf = if missing.contains(&id) {
                    dir.path().join(format!("gone-{}.mp3", id))
                } else {
                    let path = dir.path().join(format!("track-{}.mp3", id));
                    std::fs::write(&path, b"audio").unwrap();
                    path
                };
                tracks.insert(
                    id,
                    ResolvedTrack {
                        id,
                        file_path,
                        title: format!("Track {}", id),
                        artist: "Tester".to_string(),
                        duration_ms: Some(180_000),
                    },
                );
            }

            let probe = Rc::new(RefCell::new(EngineProbe::default()));
            let engine = FakeEngine { probe: probe.clone() };
            let mut controller = PlaybackController::new(engine, FakeStore { tracks });
            let (tx, rx) = mpsc::unbounded_channel();
            controller.set_event_sender(tx);
            Fixture {
                controller,
                probe,
                events: rx,
                _dir: dir,
            }
        }

        fn drain_events(&mut self) -> Vec<PlayerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }

        fn error_count(&mut self) -> usize {
            self.drain_events()
                .iter()
                .filter(|e| matches!(e, PlayerEvent::PlaybackError(_)))
                .count()
        }

        fn current_id(&self) -> Option<i64> {
            self.controller.current_track().map(|t| t.id)
        }

        fn set_engine_position(&self, ms: u64) {
            self.probe.borrow_mut().position_ms = ms;
        }

        fn last_command(&self) -> String {
            self.probe
                .borrow()
                .commands
                .last()
                .cloned()
                .unwrap_or_default()
        }
    }

    fn ids(n: i64) -> Vec<i64> {
        (1..=n).collect()
    }

    #[test]
    fn test_load_starts_at_requested_track() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, Some(2));
        assert_eq!(fx.controller.position(), Some(1));
        assert_eq!(fx.current_id(), Some(2));
        assert_eq!(fx.controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_load_with_unknown_start_track_starts_at_zero() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, Some(99));
        assert_eq!(fx.controller.position(), Some(0));
        assert_eq!(fx.current_id(), Some(1));
    }

    #[test]
    fn test_empty_playlist_is_rejected() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::RepeatAll, None);
        fx.drain_events();

        fx.controller.set_playlist(&[], PlaybackMode::Shuffle, None);

        // nothing changed, nothing emitted
        assert!(fx.drain_events().is_empty());
        assert_eq!(fx.controller.queue(), ids(3).as_slice());
        assert_eq!(fx.controller.mode(), PlaybackMode::RepeatAll);
        assert_eq!(fx.controller.position(), Some(0));
    }

    #[test]
    fn test_sequential_walkthrough_ends_in_stop() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, Some(2));
        assert_eq!(fx.controller.position(), Some(1));

        fx.controller.next();
        assert_eq!(fx.controller.position(), Some(2));
        assert_eq!(fx.current_id(), Some(3));

        fx.controller.next();
        assert_eq!(fx.controller.state(), PlaybackState::Stopped);
        assert_eq!(fx.controller.position(), None);
        assert!(fx.controller.current_track().is_none());
    }

    #[test]
    fn test_sequential_next_terminates_within_queue_len() {
        let mut fx = Fixture::new(5, &[]);
        fx.controller
            .set_playlist(&ids(5), PlaybackMode::Sequential, None);
        for _ in 0..5 {
            fx.controller.next();
        }
        assert_eq!(fx.controller.state(), PlaybackState::Stopped);
        assert_eq!(fx.controller.position(), None);
    }

    #[test]
    fn test_repeat_all_wraps_forward_and_backward() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::RepeatAll, Some(3));
        assert_eq!(fx.controller.position(), Some(2));

        fx.controller.next();
        assert_eq!(fx.controller.position(), Some(0));

        fx.controller.previous();
        assert_eq!(fx.controller.position(), Some(2));
        assert_eq!(fx.current_id(), Some(3));
    }

    #[test]
    fn test_repeat_all_previous_from_queue_start() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::RepeatAll, None);
        fx.controller.previous();
        assert_eq!(fx.controller.position(), Some(2));
        assert_eq!(fx.current_id(), Some(3));
    }

    #[test]
    fn test_shuffled_load_points_at_start_track() {
        let mut fx = Fixture::new(8, &[]);
        fx.controller
            .set_playlist(&ids(8), PlaybackMode::Shuffle, Some(5));

        let position = fx.controller.position().unwrap();
        assert_eq!(fx.controller.queue()[position], 5);
        assert_eq!(fx.current_id(), Some(5));

        let mut sorted = fx.controller.queue().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, ids(8));
    }

    #[test]
    fn test_repeat_one_never_moves() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::RepeatOne, Some(2));
        fx.controller.next();
        assert_eq!(fx.controller.position(), Some(1));
        fx.controller.previous();
        assert_eq!(fx.controller.position(), Some(1));
        assert_eq!(fx.current_id(), Some(2));
    }

    #[test]
    fn test_repeat_one_replays_on_track_end() {
        let mut fx = Fixture::new(2, &[]);
        fx.controller
            .set_playlist(&ids(2), PlaybackMode::RepeatOne, None);
        fx.controller.handle_engine_event(EngineEvent::EndOfMedia);
        assert_eq!(fx.controller.position(), Some(0));
        assert_eq!(fx.controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_end_of_media_advances() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, None);
        fx.controller.handle_engine_event(EngineEvent::EndOfMedia);
        assert_eq!(fx.controller.position(), Some(1));
        assert_eq!(fx.controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_end_of_media_at_queue_end_stops_sequential() {
        let mut fx = Fixture::new(2, &[]);
        fx.controller
            .set_playlist(&ids(2), PlaybackMode::Sequential, Some(2));
        fx.controller.handle_engine_event(EngineEvent::EndOfMedia);
        assert_eq!(fx.controller.state(), PlaybackState::Stopped);
        assert_eq!(fx.controller.position(), None);
    }

    #[test]
    fn test_end_of_media_wraps_repeat_all() {
        let mut fx = Fixture::new(2, &[]);
        fx.controller
            .set_playlist(&ids(2), PlaybackMode::RepeatAll, Some(2));
        fx.controller.handle_engine_event(EngineEvent::EndOfMedia);
        assert_eq!(fx.controller.position(), Some(0));
        assert_eq!(fx.controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_previous_restarts_when_deep_into_track() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, Some(2));
        fx.set_engine_position(5000);

        fx.controller.previous();

        assert_eq!(fx.controller.position(), Some(1));
        assert_eq!(fx.current_id(), Some(2));
        assert_eq!(fx.last_command(), "seek 0");
    }

    #[test]
    fn test_previous_moves_back_early_in_track() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, Some(2));
        fx.set_engine_position(1500);

        fx.controller.previous();

        assert_eq!(fx.controller.position(), Some(0));
        assert_eq!(fx.current_id(), Some(1));
    }

    #[test]
    fn test_previous_at_queue_start_restarts_in_sequential() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, None);
        fx.controller.previous();
        assert_eq!(fx.controller.position(), Some(0));
        assert_eq!(fx.current_id(), Some(1));
        assert_eq!(fx.controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_pause_resume_round_trip() {
        let mut fx = Fixture::new(2, &[]);
        fx.controller
            .set_playlist(&ids(2), PlaybackMode::Sequential, None);

        fx.controller.pause();
        assert_eq!(fx.controller.state(), PlaybackState::Paused);
        let loads_before = fx.probe.borrow().commands.len();

        fx.controller.play();
        assert_eq!(fx.controller.state(), PlaybackState::Playing);
        // resume must not reload the source
        let probe = fx.probe.borrow();
        assert!(!probe.commands[loads_before..]
            .iter()
            .any(|c| c.starts_with("load")));
    }

    #[test]
    fn test_stop_keeps_queue_and_play_restarts() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, Some(3));
        fx.controller.stop();
        assert_eq!(fx.controller.position(), None);
        assert_eq!(fx.controller.queue().len(), 3);

        fx.controller.play();
        assert_eq!(fx.controller.position(), Some(0));
        assert_eq!(fx.current_id(), Some(1));
    }

    #[test]
    fn test_play_at_out_of_range_degrades_to_stop() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, None);
        fx.drain_events();

        fx.controller.play_at(7);

        assert_eq!(fx.controller.state(), PlaybackState::Stopped);
        assert_eq!(fx.controller.position(), None);
        assert_eq!(fx.error_count(), 1);
    }

    #[test]
    fn test_missing_track_is_skipped_with_one_error() {
        let mut fx = Fixture::new(3, &[2]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, None);
        fx.drain_events();

        fx.controller.play_at(1);

        assert_eq!(fx.controller.position(), Some(2));
        assert_eq!(fx.current_id(), Some(3));
        assert_eq!(fx.error_count(), 1);
    }

    #[test]
    fn test_all_missing_sweeps_once_then_stops() {
        let mut fx = Fixture::new(3, &[1, 2, 3]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::RepeatAll, None);

        assert_eq!(fx.controller.state(), PlaybackState::Stopped);
        assert_eq!(fx.controller.position(), None);
        // one terminal error, not one per track
        assert_eq!(fx.error_count(), 1);
        // the engine never got a load command
        assert!(!fx
            .probe
            .borrow()
            .commands
            .iter()
            .any(|c| c.starts_with("load")));
    }

    #[test]
    fn test_engine_error_skips_to_next_track() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, None);
        fx.drain_events();

        fx.controller
            .handle_engine_event(EngineEvent::Error("decoder blew up".to_string()));

        assert_eq!(fx.controller.position(), Some(1));
        assert_eq!(fx.controller.state(), PlaybackState::Playing);
        assert_eq!(fx.error_count(), 1);
    }

    #[test]
    fn test_shuffle_keeps_current_track_first() {
        let mut fx = Fixture::new(10, &[]);
        fx.controller
            .set_playlist(&ids(10), PlaybackMode::Sequential, Some(6));
        fx.controller.set_mode(PlaybackMode::Shuffle);

        assert_eq!(fx.controller.queue()[0], 6);
        assert_eq!(fx.controller.position(), Some(0));
        assert_eq!(fx.current_id(), Some(6));

        let mut sorted = fx.controller.queue().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, ids(10));
    }

    #[test]
    fn test_leaving_shuffle_restores_original_order() {
        let mut fx = Fixture::new(10, &[]);
        fx.controller
            .set_playlist(&ids(10), PlaybackMode::Sequential, Some(4));
        fx.controller.set_mode(PlaybackMode::Shuffle);
        fx.controller.set_mode(PlaybackMode::Shuffle.cycled());

        assert_eq!(fx.controller.queue(), ids(10).as_slice());
        // still pointing at the track that was playing
        assert_eq!(fx.controller.position(), Some(3));
        assert_eq!(fx.current_id(), Some(4));
    }

    #[test]
    fn test_mode_change_does_not_touch_playback_state() {
        let mut fx = Fixture::new(4, &[]);
        fx.controller
            .set_playlist(&ids(4), PlaybackMode::Sequential, None);
        fx.controller.pause();
        let commands_before = fx.probe.borrow().commands.len();

        fx.controller.set_mode(PlaybackMode::Shuffle);

        assert_eq!(fx.controller.state(), PlaybackState::Paused);
        // no engine commands issued by a mode change
        assert_eq!(fx.probe.borrow().commands.len(), commands_before);
    }

    #[test]
    fn test_mode_change_emits_queue_and_mode_events() {
        let mut fx = Fixture::new(3, &[]);
        fx.controller
            .set_playlist(&ids(3), PlaybackMode::Sequential, None);
        fx.drain_events();

        fx.controller.set_mode(PlaybackMode::RepeatAll);
        let events = fx.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::QueueChanged(q) if q == &ids(3))));
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::ModeChanged(PlaybackMode::RepeatAll))));

        // setting the same mode again is a no-op
        fx.controller.set_mode(PlaybackMode::RepeatAll);
        assert!(fx.drain_events().is_empty());
    }

    #[test]
    fn test_set_volume_clamps_and_reports() {
        let mut fx = Fixture::new(1, &[]);
        fx.controller.set_volume(150);
        assert_eq!(fx.controller.volume(), 100);
        assert!(fx
            .drain_events()
            .iter()
            .any(|e| matches!(e, PlayerEvent::VolumeChanged(100))));
    }

    #[test]
    fn test_next_on_empty_queue_just_stops() {
        let mut fx = Fixture::new(0, &[]);
        fx.controller.next();
        assert_eq!(fx.controller.state(), PlaybackState::Stopped);
        assert_eq!(fx.controller.position(), None);
    }

    #[test]
    fn test_duplicate_ids_are_kept() {
        let mut fx = Fixture::new(2, &[]);
        fx.controller
            .set_playlist(&[1, 2, 1], PlaybackMode::Sequential, None);
        assert_eq!(fx.controller.queue(), &[1, 2, 1]);
        fx.controller.next();
        fx.controller.next();
        assert_eq!(fx.controller.position(), Some(2));
        assert_eq!(fx.current_id(), Some(1));
    }
}
