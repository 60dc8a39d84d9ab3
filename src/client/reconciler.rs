//! Client-side view of the room clock.
//!
//! One reconciler serves both modes. Connected, it calibrates a clock offset
//! from every timed broadcast. Standalone, the offset stays at zero and drift
//! correction is off, so local controls flow through the same code path.

use tracing::debug;

use crate::{
    protocol::{OutgoingMessage, PlaybackState, Track},
    room::clock::{clamp_position, extrapolate},
};

#[derive(Debug, Clone)]
pub struct Reconciler {
    networked: bool,
    /// `server_time - local_receive_time` of the latest timed sample.
    offset_ms: i64,
    calibrated: bool,
    state: Option<PlaybackState>,
}

impl Reconciler {
    pub fn networked() -> Self {
        Self {
            networked: true,
            offset_ms: 0,
            calibrated: false,
            state: None,
        }
    }

    pub fn local() -> Self {
        Self {
            networked: false,
            ..Self::networked()
        }
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    pub fn state(&self) -> Option<&PlaybackState> {
        self.state.as_ref()
    }

    pub fn current_song(&self) -> Option<&Track> {
        self.state.as_ref().and_then(|s| s.current_song.as_ref())
    }

    pub fn is_playing(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_playing)
    }

    /// Drift correction only makes sense against a calibrated server clock.
    pub fn corrections_enabled(&self) -> bool {
        self.networked && self.calibrated
    }

    /// Feeds one server message. Returns true when the playback state changed.
    ///
    /// The latest sample always replaces the previous offset; there is no averaging.
    pub fn observe(&mut self, msg: &OutgoingMessage, local_receive_ms: u64) -> bool {
        if let Some((state, server_time)) = msg.timed_playback() {
            if self.networked {
                self.offset_ms = server_time as i64 - local_receive_ms as i64;
                self.calibrated = true;
                debug!("Clock offset recalibrated: {} ms", self.offset_ms);
            }
            self.state = Some(state.clone());
            return true;
        }

        if let OutgoingMessage::PlaylistUpdated { playback_state } = msg {
            self.state = Some(playback_state.clone());
            return true;
        }
        false
    }

    /// Installs a state produced locally (standalone mode).
    pub fn apply_local(&mut self, state: PlaybackState) {
        self.state = Some(state);
    }

    /// Synced playback position in seconds at local time `local_now_ms`.
    pub fn synced_position(&self, local_now_ms: u64) -> f64 {
        let Some(state) = &self.state else {
            return 0.0;
        };

        let position = match (state.is_playing, state.server_anchor_time) {
            (true, Some(anchor)) => extrapolate(
                state.position_at_anchor,
                anchor,
                local_now_ms as i64 + self.offset_ms,
            ),
            _ => state.position_at_anchor,
        };
        clamp_position(position, state.duration())
    }

    /// Forgets everything learned from the previous room.
    pub fn reset(&mut self) {
        self.offset_ms = 0;
        self.calibrated = false;
        self.state = None;
    }
}
