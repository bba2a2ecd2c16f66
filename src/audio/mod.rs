// Playback - the engine seam and the queue controller that drives it

pub mod controller;
pub mod engine;

pub use controller::{PlaybackController, PlayerEvent};
pub use engine::{EngineEvent, MediaEngine, RodioEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// How the queue position moves when a track ends or the user skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Play in order, stop after the last track
    #[default]
    Sequential,
    RepeatOne,
    /// Wrap back to the start after the last track
    RepeatAll,
    /// Random order, wraps; the order is fixed until shuffle is re-entered
    Shuffle,
}

impl PlaybackMode {
    pub fn label(self) -> &'static str {
        match self {
            PlaybackMode::Sequential => "sequential",
            PlaybackMode::RepeatOne => "repeat-one",
            PlaybackMode::RepeatAll => "repeat-all",
            PlaybackMode::Shuffle => "shuffle",
        }
    }

    /// The order the mode key cycles through in the shell.
    pub fn cycled(self) -> Self {
        match self {
            PlaybackMode::Sequential => PlaybackMode::RepeatAll,
            PlaybackMode::RepeatAll => PlaybackMode::RepeatOne,
            PlaybackMode::RepeatOne => PlaybackMode::Shuffle,
            PlaybackMode::Shuffle => PlaybackMode::Sequential,
        }
    }
}
