use std::sync::Arc;

use tracing::debug;

use crate::common::clock::Clock;

/// The local media element the reconciler steers.
pub trait MediaPlayer: Send {
    fn load(&mut self, source: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: f64);
    fn set_volume(&mut self, volume: f32);
    /// Current position in seconds as the player reports it.
    fn position(&self) -> f64;
    fn is_playing(&self) -> bool;
    /// True while a requested seek has not landed yet.
    fn is_seeking(&self) -> bool;
}

/// Player that advances on a clock at a configurable rate. A rate below 1.0
/// models a client that keeps falling behind (e.g. constant rebuffering).
pub struct SimulatedPlayer {
    clock: Arc<dyn Clock>,
    rate: f64,
    seek_latency_ms: u64,
    source: Option<String>,
    playing: bool,
    base_position: f64,
    base_time: u64,
    seek_done_at: Option<u64>,
    volume: f32,
}

impl SimulatedPlayer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            rate: 1.0,
            seek_latency_ms: 0,
            source: None,
            playing: false,
            base_position: 0.0,
            base_time: now,
            seek_done_at: None,
            volume: 1.0,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate.max(0.0);
        self
    }

    pub fn with_seek_latency(mut self, ms: u64) -> Self {
        self.seek_latency_ms = ms;
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    fn rebase(&mut self) {
        let now = self.clock.now_ms();
        self.base_position = self.position_at(now);
        self.base_time = now;
    }

    fn position_at(&self, now: u64) -> f64 {
        if !self.playing {
            return self.base_position;
        }
        // Playback resumes only once a pending seek lands.
        let start = self.seek_done_at.map_or(self.base_time, |t| t.max(self.base_time));
        let elapsed = now.saturating_sub(start) as f64 / 1000.0;
        self.base_position + elapsed * self.rate
    }
}

impl MediaPlayer for SimulatedPlayer {
    fn load(&mut self, source: &str) {
        debug!("Loading {}", source);
        self.source = Some(source.to_string());
        self.base_position = 0.0;
        self.base_time = self.clock.now_ms();
        self.seek_done_at = None;
    }

    fn play(&mut self) {
        if !self.playing {
            self.rebase();
            self.playing = true;
        }
    }

    fn pause(&mut self) {
        if self.playing {
            self.rebase();
            self.playing = false;
        }
    }

    fn seek(&mut self, position: f64) {
        let now = self.clock.now_ms();
        self.base_position = position.max(0.0);
        self.base_time = now;
        self.seek_done_at = Some(now + self.seek_latency_ms);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn position(&self) -> f64 {
        self.position_at(self.clock.now_ms())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn is_seeking(&self) -> bool {
        self.seek_done_at
            .is_some_and(|done| self.clock.now_ms() < done)
    }
}
