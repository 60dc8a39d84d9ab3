//! Playback anchor arithmetic.
//!
//! A room never stores "the current position". It stores the position at an
//! anchor instant and derives the position at any later instant from the
//! elapsed wall-clock time. Server and client share these functions; only the
//! clock they feed in differs.

use serde::Serialize;

/// Position in seconds after `now_ms - anchor_ms` of playback from `position`.
///
/// Negative elapsed time (clock skew) is treated as zero.
pub fn extrapolate(position: f64, anchor_ms: u64, now_ms: i64) -> f64 {
    let elapsed_ms = (now_ms - anchor_ms as i64).max(0);
    position + elapsed_ms as f64 / 1000.0
}

/// Clamps a position into `[0, duration]`; without a duration only the lower bound applies.
pub fn clamp_position(position: f64, duration: Option<f64>) -> f64 {
    let position = if position.is_finite() { position.max(0.0) } else { 0.0 };
    match duration {
        Some(d) => position.min(d.max(0.0)),
        None => position,
    }
}

/// `server_anchor_time` is `Some` exactly when `is_playing` is true; a paused
/// anchor keeps the frozen position in `position_at_anchor`. All transitions
/// go through the methods below so the pairing cannot be broken.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackAnchor {
    is_playing: bool,
    position_at_anchor: f64,
    server_anchor_time: Option<u64>,
    last_mutation_time: u64,
}

impl PlaybackAnchor {
    pub fn paused_at(position: f64, now_ms: u64) -> Self {
        Self {
            is_playing: false,
            position_at_anchor: clamp_position(position, None),
            server_anchor_time: None,
            last_mutation_time: now_ms,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn position_at_anchor(&self) -> f64 {
        self.position_at_anchor
    }

    pub fn server_anchor_time(&self) -> Option<u64> {
        self.server_anchor_time
    }

    pub fn last_mutation_time(&self) -> u64 {
        self.last_mutation_time
    }

    /// Derived position at `now_ms`, in seconds.
    pub fn position_at(&self, now_ms: u64) -> f64 {
        match (self.is_playing, self.server_anchor_time) {
            (true, Some(anchor)) => extrapolate(self.position_at_anchor, anchor, now_ms as i64),
            _ => self.position_at_anchor,
        }
    }

    /// Starts (or restarts) playback from `from`, or from wherever playback is now.
    pub fn play(&mut self, now_ms: u64, from: Option<f64>) {
        let position = from.unwrap_or_else(|| self.position_at(now_ms));
        self.is_playing = true;
        self.position_at_anchor = clamp_position(position, None);
        self.server_anchor_time = Some(now_ms);
        self.last_mutation_time = now_ms;
    }

    /// Freezes the derived position. Pausing a paused anchor changes nothing but the mutation time.
    pub fn pause(&mut self, now_ms: u64) {
        self.position_at_anchor = self.position_at(now_ms);
        self.is_playing = false;
        self.server_anchor_time = None;
        self.last_mutation_time = now_ms;
    }

    /// Moves to `position`; a playing anchor rebases at the new position.
    pub fn seek(&mut self, now_ms: u64, position: f64) {
        self.position_at_anchor = clamp_position(position, None);
        if self.is_playing {
            self.server_anchor_time = Some(now_ms);
        }
        self.last_mutation_time = now_ms;
    }

    /// Pauses with the position frozen at `position` regardless of prior state.
    pub fn stop_at(&mut self, now_ms: u64, position: f64) {
        self.is_playing = false;
        self.server_anchor_time = None;
        self.position_at_anchor = clamp_position(position, None);
        self.last_mutation_time = now_ms;
    }
}
