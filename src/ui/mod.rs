// Terminal playback shell. One loop handles key presses, polls the engine,
// and drains controller notifications - strictly one event at a time, which
// is the serialization the controller expects from its host.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;

use crate::audio::{
    PlaybackController, PlaybackMode, PlaybackState, PlayerEvent, RodioEngine,
};
use crate::config::Config;
use crate::library::Library;

const VOLUME_STEP: u8 = 10;

pub struct App {
    controller: PlaybackController<RodioEngine, Library>,
    events: mpsc::UnboundedReceiver<PlayerEvent>,
    tick_interval: Duration,
}

impl App {
    pub fn new(config: &Config, library: Library) -> Result<Self> {
        let engine = RodioEngine::new()?;
        let mut controller = PlaybackController::new(engine, library);
        let (tx, rx) = mpsc::unbounded_channel();
        controller.set_event_sender(tx);
        controller.set_volume(config.playback.volume);

        Ok(Self {
            controller,
            events: rx,
            tick_interval: Duration::from_millis(config.playback.tick_interval_ms.max(10)),
        })
    }

    /// Load the queue and run the interactive loop until the user quits or
    /// playback runs out.
    pub async fn run(
        &mut self,
        track_ids: &[i64],
        mode: PlaybackMode,
        start_track_id: Option<i64>,
    ) -> Result<()> {
        say("space pause/resume | n next | b previous | m mode | +/- volume | s stop | q quit");
        self.controller.set_playlist(track_ids, mode, start_track_id);

        enable_raw_mode()?;
        let result = self.event_loop().await;
        disable_raw_mode()?;
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            while event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && !self.handle_key(key.code) {
                        self.controller.stop();
                        self.drain_player_events();
                        return Ok(());
                    }
                }
            }

            self.controller.tick();
            self.drain_player_events();

            if self.controller.state() == PlaybackState::Stopped
                && self.controller.position().is_none()
            {
                say("playback finished");
                return Ok(());
            }

            tokio::time::sleep(self.tick_interval).await;
        }
    }

    /// Returns false when the user wants out.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char(' ') => self.controller.toggle_play_pause(),
            KeyCode::Char('n') | KeyCode::Right => self.controller.next(),
            KeyCode::Char('b') | KeyCode::Left => self.controller.previous(),
            KeyCode::Char('s') => self.controller.stop(),
            KeyCode::Char('m') => {
                let next = self.controller.mode().cycled();
                self.controller.set_mode(next);
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let volume = self.controller.volume().saturating_add(VOLUME_STEP);
                self.controller.set_volume(volume);
            }
            KeyCode::Char('-') => {
                let volume = self.controller.volume().saturating_sub(VOLUME_STEP);
                self.controller.set_volume(volume);
            }
            _ => {}
        }
        true
    }

    fn drain_player_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                PlayerEvent::TrackChanged(Some(track)) => {
                    say(&format!(
                        "> {} - {} [{}]",
                        track.artist,
                        track.title,
                        track.display_duration()
                    ));
                }
                PlayerEvent::TrackChanged(None) => say("stopped"),
                PlayerEvent::StateChanged(PlaybackState::Paused) => say("paused"),
                PlayerEvent::ModeChanged(mode) => say(&format!("mode: {}", mode.label())),
                PlayerEvent::QueueChanged(queue) => {
                    say(&format!("queue rebuilt ({} tracks)", queue.len()));
                }
                PlayerEvent::VolumeChanged(volume) => say(&format!("volume: {}%", volume)),
                PlayerEvent::PlaybackError(message) => say(&format!("! {}", message)),
                // position/duration ticks are too chatty for a line shell
                _ => {}
            }
        }
    }
}

/// Raw mode swallows the usual newline translation, so lines need an
/// explicit carriage return.
fn say(message: &str) {
    print!("{}\r\n", message);
    let _ = std::io::stdout().flush();
}
