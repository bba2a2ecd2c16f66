use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::debug;

/// Notifications the engine surfaces on each poll. Delivered in order, on
/// the caller's thread; the controller processes them one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PositionChanged(u64),
    DurationChanged(u64),
    EndOfMedia,
    Error(String),
}

/// The contract the playback controller drives. Decoding and output live
/// behind this seam; the controller only issues commands and polls for
/// notifications, so tests can substitute a scripted engine.
pub trait MediaEngine {
    /// Prepare a file for playback without starting it. The caller checks
    /// the path exists first; a decode failure is still possible and is
    /// reported through the returned error.
    fn load(&mut self, path: &Path) -> Result<()>;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position_ms: u64);
    fn position_ms(&self) -> u64;
    /// Volume in 0.0..=1.0
    fn set_volume(&mut self, volume: f32);
    /// Drain pending notifications. Called on every controller tick.
    fn poll(&mut self) -> Vec<EngineEvent>;
}

/// rodio-backed engine. rodio has no position or end-of-media callbacks,
/// so position is tracked with a wall clock that only runs while playing,
/// and completion is detected by the sink draining.
pub struct RodioEngine {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Sink>,
    volume: f32,
    playing: bool,
    played: Duration,
    resumed_at: Option<Instant>,
    pending_duration: Option<u64>,
}

impl RodioEngine {
    pub fn new() -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()?;
        Ok(Self {
            _stream: stream,
            stream_handle,
            sink: None,
            volume: 0.5,
            playing: false,
            played: Duration::ZERO,
            resumed_at: None,
            pending_duration: None,
        })
    }

    fn freeze_clock(&mut self) {
        if let Some(at) = self.resumed_at.take() {
            self.played += at.elapsed();
        }
        self.playing = false;
    }
}

impl MediaEngine for RodioEngine {
    fn load(&mut self, path: &Path) -> Result<()> {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }

        let file = File::open(path)?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| {
            anyhow::anyhow!(
                "failed to decode '{}': {} (corrupted or unsupported format)",
                path.display(),
                e
            )
        })?;
        self.pending_duration = source.total_duration().map(|d| d.as_millis() as u64);

        let sink = Sink::try_new(&self.stream_handle)?;
        sink.set_volume(self.volume);
        sink.append(source);
        sink.pause();

        self.sink = Some(sink);
        self.playing = false;
        self.played = Duration::ZERO;
        self.resumed_at = None;
        debug!("loaded {}", path.display());
        Ok(())
    }

    fn play(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
            if !self.playing {
                self.playing = true;
                self.resumed_at = Some(Instant::now());
            }
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.freeze_clock();
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.freeze_clock();
        self.played = Duration::ZERO;
        self.pending_duration = None;
    }

    fn seek(&mut self, position_ms: u64) {
        if let Some(sink) = &self.sink {
            if sink.try_seek(Duration::from_millis(position_ms)).is_ok() {
                self.played = Duration::from_millis(position_ms);
                if self.playing {
                    self.resumed_at = Some(Instant::now());
                }
            }
        }
    }

    fn position_ms(&self) -> u64 {
        let mut elapsed = self.played;
        if let Some(at) = self.resumed_at {
            if self.playing {
                elapsed += at.elapsed();
            }
        }
        elapsed.as_millis() as u64
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }

    fn poll(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        if let Some(duration) = self.pending_duration.take() {
            events.push(EngineEvent::DurationChanged(duration));
        }

        if self.playing {
            let drained = self
                .sink
                .as_ref()
                .map(|sink| sink.empty())
                .unwrap_or(false);
            if drained {
                self.sink = None;
                self.freeze_clock();
                self.played = Duration::ZERO;
                events.push(EngineEvent::EndOfMedia);
            } else {
                events.push(EngineEvent::PositionChanged(self.position_ms()));
            }
        }

        events
    }
}
