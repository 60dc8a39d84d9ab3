//! Glue between server events, the reconciler, the drift controller and the player.

use tracing::{debug, info, warn};

use crate::{
    common::types::{ParticipantId, RoomId},
    protocol::{OutgoingMessage, Participant, PlaybackState},
};

use super::{
    drift::{DriftAction, DriftConfig, DriftController, SyncStatus},
    player::MediaPlayer,
    reconciler::Reconciler,
};

/// The part of a playback state that pins where the player should be.
/// Broadcasts that leave it untouched (volume, playlist edits) never move the player.
#[derive(Debug, Clone, PartialEq)]
struct Timeline {
    track: String,
    playing: bool,
    position_at_anchor: f64,
    anchor: Option<u64>,
}

/// What the connection loop should do after a server event.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue,
    /// The client is no longer in the room.
    Leave { reason: String },
}

pub struct ListenerSession<P: MediaPlayer> {
    reconciler: Reconciler,
    drift: DriftController,
    player: P,
    room: Option<RoomId>,
    me: Option<Participant>,
    loaded_track: Option<String>,
    applied: Option<Timeline>,
    /// A state change arrived while a seek was in flight; apply it once the seek lands.
    pending_apply: bool,
    status: SyncStatus,
}

impl<P: MediaPlayer> ListenerSession<P> {
    pub fn new(player: P, reconciler: Reconciler, drift: DriftConfig) -> Self {
        Self {
            reconciler,
            drift: DriftController::new(drift),
            player,
            room: None,
            me: None,
            loaded_track: None,
            applied: None,
            pending_apply: false,
            status: SyncStatus::Idle,
        }
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn me(&self) -> Option<&Participant> {
        self.me.as_ref()
    }

    /// Identifier to present on the next join so the server reuses our slot.
    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.me.as_ref().map(|p| p.id.clone())
    }

    pub fn on_message(&mut self, msg: &OutgoingMessage, local_now_ms: u64) -> Flow {
        match msg {
            OutgoingMessage::RoomSnapshot { room, you, .. } => {
                if self.room.as_ref() != Some(&room.id) {
                    self.teardown();
                    self.room = Some(room.id.clone());
                }
                info!(
                    "Joined room {} as {}{}",
                    room.id,
                    you.name,
                    if you.is_admin { " (admin)" } else { "" }
                );
                self.me = Some(you.clone());
                self.reconciler.observe(msg, local_now_ms);
                self.apply_state(local_now_ms);
            }
            OutgoingMessage::PlaybackStateChanged { .. } | OutgoingMessage::PlaylistUpdated { .. } => {
                self.reconciler.observe(msg, local_now_ms);
                if self.drift.seek_in_flight(local_now_ms) {
                    self.pending_apply = true;
                } else {
                    self.apply_state(local_now_ms);
                }
            }
            OutgoingMessage::SyncUpdate { .. } => {
                // Only recalibrates; the next drift poll acts on it.
                self.reconciler.observe(msg, local_now_ms);
            }
            OutgoingMessage::ParticipantJoined { participants, .. }
            | OutgoingMessage::ParticipantLeft { participants, .. }
            | OutgoingMessage::AdminTransferred { participants, .. } => {
                if let Some(me) = &self.me {
                    if let Some(updated) = participants.iter().find(|p| p.id == me.id) {
                        self.me = Some(updated.clone());
                    }
                }
            }
            OutgoingMessage::NewMessage { message } => {
                info!("<{}> {}", message.author, message.text);
            }
            OutgoingMessage::SettingsUpdated { settings } => {
                debug!("Room settings: {:?}", settings);
            }
            OutgoingMessage::PermissionDenied { reason } => {
                warn!("Permission denied: {}", reason);
            }
            OutgoingMessage::RoomError { reason, .. } if !msg.ends_membership() => {
                warn!("Room error: {}", reason);
            }
            OutgoingMessage::Kicked { reason }
            | OutgoingMessage::RoomClosed { reason }
            | OutgoingMessage::RoomError { reason, .. } => {
                self.teardown();
                return Flow::Leave {
                    reason: reason.clone(),
                };
            }
        }
        Flow::Continue
    }

    /// One drift-controller poll against the player.
    pub fn poll(&mut self, local_now_ms: u64) -> DriftAction {
        if !self.player.is_seeking() {
            self.drift.seek_completed();
        }
        if self.pending_apply && !self.drift.seek_in_flight(local_now_ms) {
            self.pending_apply = false;
            self.apply_state(local_now_ms);
        }

        let synced = self.reconciler.synced_position(local_now_ms);
        let action = self.drift.evaluate(
            local_now_ms,
            synced,
            self.player.position(),
            self.reconciler.is_playing() && self.player.is_playing(),
            self.reconciler.corrections_enabled(),
        );

        match action {
            DriftAction::Seek { position } => {
                info!(
                    "Correcting drift: seeking {:.2}s -> {:.2}s",
                    self.player.position(),
                    position
                );
                self.player.seek(position);
            }
            DriftAction::Syncing { drift } if self.status != SyncStatus::Syncing => {
                debug!("Syncing, {:.2}s off", drift);
            }
            _ => {}
        }
        self.status = action.status();
        action
    }

    /// Installs a state computed without a server and steers the player to it.
    pub fn apply_local(&mut self, state: PlaybackState, local_now_ms: u64) {
        self.reconciler.apply_local(state);
        if self.drift.seek_in_flight(local_now_ms) {
            self.pending_apply = true;
        } else {
            self.apply_state(local_now_ms);
        }
    }

    /// A seek the local user made. Drops all correction history.
    pub fn user_seek(&mut self, position: f64, local_now_ms: u64) {
        self.drift.reset();
        self.player.seek(position);
        self.drift.begin_seek(local_now_ms);
    }

    /// Forgets the current room: bookkeeping, pending work and offset.
    pub fn teardown(&mut self) {
        self.drift.reset();
        self.reconciler.reset();
        self.pending_apply = false;
        self.loaded_track = None;
        self.applied = None;
        self.room = None;
        self.status = SyncStatus::Idle;
        self.player.pause();
    }

    fn apply_state(&mut self, local_now_ms: u64) {
        let Some(state) = self.reconciler.state() else {
            return;
        };
        let Some(song) = state.current_song.clone() else {
            self.player.pause();
            self.loaded_track = None;
            self.applied = None;
            return;
        };
        let (playing, volume) = (state.is_playing, state.volume);
        let timeline = Timeline {
            track: song.id.clone(),
            playing,
            position_at_anchor: state.position_at_anchor,
            anchor: state.server_anchor_time,
        };

        if self.loaded_track.as_deref() != Some(song.id.as_str()) {
            info!("Now playing: {} - {}", song.artist, song.title);
            self.player.load(&song.source);
            self.loaded_track = Some(song.id);
        }

        self.player.set_volume(volume);
        // Small drift on an unchanged timeline is left to the drift controller.
        if self.applied.as_ref() != Some(&timeline) {
            let position = self.reconciler.synced_position(local_now_ms);
            if (self.player.position() - position).abs() > f64::EPSILON {
                self.player.seek(position);
                self.drift.begin_seek(local_now_ms);
            }
            self.applied = Some(timeline);
        }
        if playing {
            self.player.play();
        } else {
            self.player.pause();
        }
    }
}
