//! The per-room state machine.
//!
//! Every mutation follows the same shape: validate, mutate, then describe the
//! resulting broadcast as [`Effects`]. The room never touches a socket; the
//! gateway turns effects into writes while it still holds the room lock, which
//! keeps per-room delivery order identical to mutation order.

use tracing::{debug, info};

use crate::{
    common::{
        errors::RoomError,
        types::{ConnectionId, ParticipantId, RoomId},
    },
    configs::RoomsConfig,
    protocol::{
        ChatMessage, ControlPayload, OutgoingMessage, Participant, PlaybackAction,
        PlaybackState, RoomInfo, RoomSettings, RoomSummary, SettingsPatch, Track, TrackRequest,
    },
    room::clock::{PlaybackAnchor, clamp_position},
};

/// Per-room limits taken from the `[rooms]` config section at creation time.
#[derive(Debug, Clone)]
pub struct RoomDefaults {
    pub max_participants: u32,
    pub max_message_length: usize,
    pub system_author: String,
}

impl From<&RoomsConfig> for RoomDefaults {
    fn from(config: &RoomsConfig) -> Self {
        Self {
            max_participants: config.default_max_participants,
            max_message_length: config.max_message_length,
            system_author: config.system_author.clone(),
        }
    }
}

/// One outbound message and the connections it goes to.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub recipients: Vec<ConnectionId>,
    pub message: OutgoingMessage,
}

/// What the gateway must do after a successful mutation.
#[derive(Debug, Default)]
pub struct Effects {
    pub deliveries: Vec<Delivery>,
    /// Connections that no longer belong to the room and must be terminated.
    pub evicted: Vec<ConnectionId>,
    /// The room lost its last participant (or was closed) and must leave the registry.
    pub emptied: bool,
}

impl Effects {
    fn send(&mut self, recipients: Vec<ConnectionId>, message: OutgoingMessage) {
        if !recipients.is_empty() {
            self.deliveries.push(Delivery {
                recipients,
                message,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.evicted.is_empty() && !self.emptied
    }

    /// Every message addressed to `connection`, in delivery order.
    pub fn messages_for(&self, connection: &ConnectionId) -> Vec<&OutgoingMessage> {
        self.deliveries
            .iter()
            .filter(|d| d.recipients.contains(connection))
            .map(|d| &d.message)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    participant: Participant,
    connection: ConnectionId,
}

pub struct Room {
    id: RoomId,
    name: String,
    creator: String,
    created_at: u64,
    settings: RoomSettings,
    slots: Vec<Slot>,
    playlist: Vec<Track>,
    current_index: Option<usize>,
    anchor: PlaybackAnchor,
    volume: f32,
    messages: Vec<ChatMessage>,
    max_message_length: usize,
    system_author: String,
    closed: bool,
}

impl Room {
    pub fn new(
        id: RoomId,
        name: Option<String>,
        creator: &str,
        defaults: &RoomDefaults,
        now: u64,
    ) -> Self {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| id.to_string());

        Self {
            id,
            name,
            creator: creator.to_string(),
            created_at: now,
            settings: RoomSettings::with_capacity(defaults.max_participants),
            slots: Vec::new(),
            playlist: Vec::new(),
            current_index: None,
            anchor: PlaybackAnchor::paused_at(0.0, now),
            volume: 1.0,
            messages: Vec::new(),
            max_message_length: defaults.max_message_length,
            system_author: defaults.system_author.clone(),
            closed: false,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_playing(&self) -> bool {
        self.anchor.is_playing()
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn participant_count(&self) -> usize {
        self.slots.len()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.slots.iter().map(|s| s.participant.clone()).collect()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn admin_count(&self) -> usize {
        self.slots.iter().filter(|s| s.participant.is_admin).count()
    }

    pub fn participant_for(&self, connection: &ConnectionId) -> Option<&Participant> {
        self.slot_by_connection(connection).map(|s| &s.participant)
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.slots.iter().map(|s| s.connection.clone()).collect()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            creator: self.creator.clone(),
            created_at: self.created_at,
            settings: self.settings.clone(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            creator: self.creator.clone(),
            participants: self.slots.len(),
            max_participants: self.settings.max_participants,
            is_playing: self.anchor.is_playing(),
            current_song: self.current_song().map(|t| t.title.clone()),
            created_at: self.created_at,
        }
    }

    fn current_song(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.playlist.get(i))
    }

    /// Duration of the current track; `None` when there is none or its length is unknown (0).
    fn current_duration(&self) -> Option<f64> {
        self.current_song()
            .filter(|t| t.duration > 0)
            .map(|t| t.duration as f64)
    }

    pub fn playback_state(&self, now: u64) -> PlaybackState {
        PlaybackState {
            is_playing: self.anchor.is_playing(),
            current_time: clamp_position(self.anchor.position_at(now), self.current_duration()),
            position_at_anchor: self.anchor.position_at_anchor(),
            server_anchor_time: self.anchor.server_anchor_time(),
            last_mutation_time: self.anchor.last_mutation_time(),
            current_index: self.current_index.map(|i| i as i64).unwrap_or(-1),
            current_song: self.current_song().cloned(),
            playlist: self.playlist.clone(),
            volume: self.volume,
        }
    }

    fn slot_by_connection(&self, connection: &ConnectionId) -> Option<&Slot> {
        self.slots.iter().find(|s| &s.connection == connection)
    }

    fn slot_index(&self, id: &ParticipantId) -> Option<usize> {
        self.slots.iter().position(|s| &s.participant.id == id)
    }

    fn everyone(&self) -> Vec<ConnectionId> {
        self.connections()
    }

    fn everyone_except(&self, connection: &ConnectionId) -> Vec<ConnectionId> {
        self.slots
            .iter()
            .filter(|s| &s.connection != connection)
            .map(|s| s.connection.clone())
            .collect()
    }

    fn requester(&self, connection: &ConnectionId) -> Result<&Slot, RoomError> {
        if self.closed {
            return Err(RoomError::RoomClosed);
        }
        self.slot_by_connection(connection)
            .ok_or_else(|| RoomError::not_found("you are not a participant of this room"))
    }

    fn require_admin(&self, connection: &ConnectionId, action: &str) -> Result<&Slot, RoomError> {
        let slot = self.requester(connection)?;
        if !slot.participant.is_admin {
            return Err(RoomError::denied(format!("only the room admin can {}", action)));
        }
        Ok(slot)
    }

    fn system_message(&mut self, text: String, now: u64) -> ChatMessage {
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            author: self.system_author.clone(),
            text,
            timestamp: now,
            room_id: self.id.clone(),
        };
        self.messages.push(message.clone());
        message
    }

    fn playback_changed(&self, effects: &mut Effects, now: u64) {
        effects.send(
            self.everyone(),
            OutgoingMessage::PlaybackStateChanged {
                playback_state: self.playback_state(now),
                server_time: now,
            },
        );
    }

    /// Admits a participant, or rebinds their slot when the identifier is already present.
    ///
    /// Returns the participant as stored, with its issued identifier.
    pub fn join(
        &mut self,
        connection: ConnectionId,
        requested_id: Option<ParticipantId>,
        name: &str,
        now: u64,
    ) -> Result<(Participant, Effects), RoomError> {
        if self.closed {
            return Err(RoomError::RoomClosed);
        }

        let mut effects = Effects::default();

        let existing = requested_id.as_ref().and_then(|id| self.slot_index(id));
        let mut announce = true;
        let participant = if let Some(index) = existing {
            let slot = &mut self.slots[index];
            let previous = std::mem::replace(&mut slot.connection, connection.clone());
            slot.participant.name = name.to_string();
            slot.participant.is_online = true;
            let participant = slot.participant.clone();

            if previous != connection {
                effects.send(
                    vec![previous.clone()],
                    OutgoingMessage::RoomError {
                        reason: "session replaced by a newer connection".to_string(),
                        fatal: true,
                    },
                );
                effects.evicted.push(previous);
            } else {
                // Same connection joining again: the room already knows about it.
                announce = false;
            }
            info!(
                "Participant {} ({}) reconnected to room {}",
                participant.name, participant.id, self.id
            );
            participant
        } else {
            let max = self.settings.max_participants;
            if self.slots.len() >= max as usize {
                return Err(RoomError::RoomFull { max });
            }

            let first = self.slots.is_empty();
            let participant = Participant {
                id: requested_id.unwrap_or_else(ParticipantId::generate),
                name: name.to_string(),
                is_admin: first,
                joined_at: now,
                is_online: true,
            };
            if first {
                self.creator = participant.name.clone();
            }
            self.slots.push(Slot {
                participant: participant.clone(),
                connection: connection.clone(),
            });
            info!(
                "Participant {} ({}) joined room {} [{}/{}]",
                participant.name,
                participant.id,
                self.id,
                self.slots.len(),
                max
            );
            participant
        };

        if announce {
            let notice =
                self.system_message(format!("{} joined the room", participant.name), now);
            let others = self.everyone_except(&connection);
            effects.send(
                others.clone(),
                OutgoingMessage::ParticipantJoined {
                    name: participant.name.clone(),
                    participants: self.participants(),
                },
            );
            effects.send(others, OutgoingMessage::NewMessage { message: notice });
        }
        effects.send(
            vec![connection],
            OutgoingMessage::RoomSnapshot {
                room: self.info(),
                you: participant.clone(),
                participants: self.participants(),
                messages: self.messages.clone(),
                playback_state: self.playback_state(now),
                server_time: now,
            },
        );

        Ok((participant, effects))
    }

    /// Removes the slot bound to `connection`. Explicit leave and disconnect share this path.
    ///
    /// A connection that no longer owns a slot (superseded or already removed) is a no-op.
    pub fn leave(&mut self, connection: &ConnectionId, now: u64) -> Effects {
        let mut effects = Effects::default();
        let Some(index) = self.slots.iter().position(|s| &s.connection == connection) else {
            return effects;
        };

        let removed = self.slots.remove(index);
        info!(
            "Participant {} ({}) left room {} [{} remaining]",
            removed.participant.name,
            removed.participant.id,
            self.id,
            self.slots.len()
        );

        if self.slots.is_empty() {
            self.closed = true;
            effects.emptied = true;
            return effects;
        }

        let promoted = if removed.participant.is_admin {
            self.promote_successor()
        } else {
            None
        };

        let notice = self.system_message(format!("{} left the room", removed.participant.name), now);
        effects.send(
            self.everyone(),
            OutgoingMessage::ParticipantLeft {
                name: removed.participant.name,
                participants: self.participants(),
            },
        );
        effects.send(self.everyone(), OutgoingMessage::NewMessage { message: notice });

        if let Some(new_admin) = promoted {
            self.announce_admin(&mut effects, new_admin, now);
        }
        effects
    }

    /// Hands admin to the longest-present participant.
    fn promote_successor(&mut self) -> Option<String> {
        let successor = self.slots.first_mut()?;
        successor.participant.is_admin = true;
        self.creator = successor.participant.name.clone();
        info!(
            "Admin of room {} passed to {} ({})",
            self.id, successor.participant.name, successor.participant.id
        );
        Some(self.creator.clone())
    }

    fn announce_admin(&mut self, effects: &mut Effects, new_admin: String, now: u64) {
        let notice = self.system_message(format!("{} is now the room admin", new_admin), now);
        effects.send(
            self.everyone(),
            OutgoingMessage::AdminTransferred {
                new_admin_name: new_admin,
                participants: self.participants(),
            },
        );
        effects.send(self.everyone(), OutgoingMessage::NewMessage { message: notice });
    }

    pub fn request_sync(&self, connection: &ConnectionId, now: u64) -> Result<Effects, RoomError> {
        self.requester(connection)?;
        let mut effects = Effects::default();
        effects.send(
            vec![connection.clone()],
            OutgoingMessage::SyncUpdate {
                playback_state: self.playback_state(now),
                server_time: now,
            },
        );
        Ok(effects)
    }

    pub fn send_message(
        &mut self,
        connection: &ConnectionId,
        text: &str,
        now: u64,
    ) -> Result<Effects, RoomError> {
        let author = self.requester(connection)?.participant.name.clone();

        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::invalid("message text is empty"));
        }
        if text.chars().count() > self.max_message_length {
            return Err(RoomError::invalid(format!(
                "message exceeds {} characters",
                self.max_message_length
            )));
        }

        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            author,
            text: text.to_string(),
            timestamp: now,
            room_id: self.id.clone(),
        };
        self.messages.push(message.clone());

        let mut effects = Effects::default();
        effects.send(self.everyone(), OutgoingMessage::NewMessage { message });
        Ok(effects)
    }

    /// Appends a track. The first track of an empty playlist becomes current at position 0.
    pub fn add_song(
        &mut self,
        connection: &ConnectionId,
        request: TrackRequest,
        now: u64,
    ) -> Result<Effects, RoomError> {
        let added_by = self.requester(connection)?.participant.name.clone();

        let title = request.title.trim();
        let source = request.source.trim();
        if title.is_empty() {
            return Err(RoomError::invalid("track title is empty"));
        }
        if source.is_empty() {
            return Err(RoomError::invalid("track source is empty"));
        }

        let track = Track {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            artist: request.artist.trim().to_string(),
            duration: request.duration,
            source: source.to_string(),
            added_by,
            added_at: now,
        };
        debug!("Room {}: {} added '{}'", self.id, track.added_by, track.title);
        self.playlist.push(track);

        if self.current_index.is_none() {
            self.current_index = Some(0);
            self.anchor.seek(now, 0.0);
        }

        let mut effects = Effects::default();
        effects.send(
            self.everyone(),
            OutgoingMessage::PlaylistUpdated {
                playback_state: self.playback_state(now),
            },
        );
        Ok(effects)
    }

    pub fn control_playback(
        &mut self,
        connection: &ConnectionId,
        action: PlaybackAction,
        payload: &ControlPayload,
        now: u64,
    ) -> Result<Effects, RoomError> {
        let slot = self.requester(connection)?;
        if !slot.participant.is_admin && !self.settings.allow_guest_control {
            return Err(RoomError::denied(
                "only the room admin can control playback in this room",
            ));
        }

        let duration = self.current_duration();
        match action {
            PlaybackAction::Play => {
                let from = payload
                    .current_time
                    .map(|t| validate_time(t).map(|t| clamp_position(t, duration)))
                    .transpose()?;
                self.anchor.play(now, from);
            }
            PlaybackAction::Pause => self.anchor.pause(now),
            PlaybackAction::Seek => {
                let target = payload
                    .current_time
                    .ok_or_else(|| RoomError::invalid("seek requires currentTime"))?;
                let target = clamp_position(validate_time(target)?, duration);
                self.anchor.seek(now, target);
            }
            PlaybackAction::Next => match self.current_index {
                Some(i) if i + 1 < self.playlist.len() => {
                    self.current_index = Some(i + 1);
                    self.anchor.seek(now, 0.0);
                }
                _ => return Ok(Effects::default()),
            },
            PlaybackAction::Previous => match self.current_index {
                Some(i) if i > 0 => {
                    self.current_index = Some(i - 1);
                    self.anchor.seek(now, 0.0);
                }
                _ => return Ok(Effects::default()),
            },
            PlaybackAction::Volume => {
                let volume = payload
                    .volume
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| RoomError::invalid("volume requires a numeric volume"))?;
                self.volume = volume.clamp(0.0, 1.0);
            }
        }

        debug!(
            "Room {}: {:?} -> playing={} position={:.2}",
            self.id,
            action,
            self.anchor.is_playing(),
            self.anchor.position_at(now)
        );

        let mut effects = Effects::default();
        self.playback_changed(&mut effects, now);
        Ok(effects)
    }

    pub fn kick(
        &mut self,
        connection: &ConnectionId,
        target: &ParticipantId,
        reason: Option<String>,
        now: u64,
    ) -> Result<Effects, RoomError> {
        let admin = self.require_admin(connection, "kick participants")?;
        if &admin.participant.id == target {
            return Err(RoomError::invalid("you cannot kick yourself"));
        }
        let index = self
            .slot_index(target)
            .ok_or_else(|| RoomError::not_found(format!("participant {} is not in the room", target)))?;

        let removed = self.slots.remove(index);
        info!(
            "Participant {} ({}) was kicked from room {}",
            removed.participant.name, removed.participant.id, self.id
        );

        let mut effects = Effects::default();
        effects.send(
            vec![removed.connection.clone()],
            OutgoingMessage::Kicked {
                reason: reason.unwrap_or_else(|| "You were removed by the room admin".to_string()),
            },
        );
        effects.evicted.push(removed.connection);

        let notice = self.system_message(
            format!("{} was removed from the room", removed.participant.name),
            now,
        );
        effects.send(
            self.everyone(),
            OutgoingMessage::ParticipantLeft {
                name: removed.participant.name,
                participants: self.participants(),
            },
        );
        effects.send(self.everyone(), OutgoingMessage::NewMessage { message: notice });
        Ok(effects)
    }

    /// Moves admin rights to `target`. Both flags flip under the same `&mut self`,
    /// so no observer can see zero or two admins.
    pub fn transfer_admin(
        &mut self,
        connection: &ConnectionId,
        target: &ParticipantId,
        now: u64,
    ) -> Result<Effects, RoomError> {
        let admin_id = self
            .require_admin(connection, "transfer admin rights")?
            .participant
            .id
            .clone();
        if &admin_id == target {
            return Err(RoomError::invalid("you are already the room admin"));
        }
        let to = self
            .slot_index(target)
            .ok_or_else(|| RoomError::not_found(format!("participant {} is not in the room", target)))?;
        let from = self
            .slot_index(&admin_id)
            .ok_or_else(|| RoomError::not_found("admin slot vanished"))?;

        self.slots[from].participant.is_admin = false;
        self.slots[to].participant.is_admin = true;
        self.creator = self.slots[to].participant.name.clone();
        info!(
            "Admin of room {} transferred from {} to {}",
            self.id, self.slots[from].participant.name, self.creator
        );

        let mut effects = Effects::default();
        self.announce_admin(&mut effects, self.creator.clone(), now);
        Ok(effects)
    }

    /// Merges `patch` into the settings. Lowering the capacity never evicts anyone.
    pub fn update_settings(
        &mut self,
        connection: &ConnectionId,
        patch: SettingsPatch,
    ) -> Result<Effects, RoomError> {
        self.require_admin(connection, "change room settings")?;
        if patch.max_participants == Some(0) {
            return Err(RoomError::invalid("maxParticipants must be at least 1"));
        }

        if let Some(v) = patch.allow_guest_control {
            self.settings.allow_guest_control = v;
        }
        if let Some(v) = patch.max_participants {
            self.settings.max_participants = v;
        }
        if let Some(v) = patch.is_public {
            self.settings.is_public = v;
        }
        if let Some(v) = patch.require_approval {
            self.settings.require_approval = v;
        }
        info!("Room {} settings updated: {:?}", self.id, self.settings);

        let mut effects = Effects::default();
        effects.send(
            self.everyone(),
            OutgoingMessage::SettingsUpdated {
                settings: self.settings.clone(),
            },
        );
        Ok(effects)
    }

    /// Closes the room for everyone. The caller removes it from the registry.
    pub fn close(&mut self, connection: &ConnectionId) -> Result<Effects, RoomError> {
        let admin = self.require_admin(connection, "close the room")?;
        let reason = format!("Room was closed by {}", admin.participant.name);
        info!("Room {} closed by {}", self.id, admin.participant.name);

        let mut effects = Effects::default();
        effects.send(self.everyone(), OutgoingMessage::RoomClosed { reason });
        effects.evicted = self.connections();
        effects.emptied = true;
        self.slots.clear();
        self.closed = true;
        Ok(effects)
    }

    /// Milliseconds until the current track plays out; `None` unless playing a track of known length.
    pub fn remaining_ms(&self, now: u64) -> Option<u64> {
        if self.closed || !self.anchor.is_playing() {
            return None;
        }
        let duration = self.current_duration()?;
        let left = (duration - self.anchor.position_at(now)).max(0.0);
        Some((left * 1000.0).ceil() as u64)
    }

    /// Moves past the current track once it has played out. Empty while it still has time left.
    pub fn finish_track(&mut self, now: u64) -> Effects {
        let mut effects = Effects::default();
        if self.closed || !self.anchor.is_playing() {
            return effects;
        }

        if let (Some(index), Some(duration)) = (self.current_index, self.current_duration()) {
            if self.anchor.position_at(now) >= duration {
                if index + 1 < self.playlist.len() {
                    self.current_index = Some(index + 1);
                    self.anchor.play(now, Some(0.0));
                } else {
                    self.anchor.stop_at(now, duration);
                }
                debug!("Room {}: track {} finished", self.id, index);
                self.playback_changed(&mut effects, now);
            }
        }
        effects
    }

    /// Periodic work while playing: advance past a finished track, otherwise publish a sync sample.
    pub fn tick(&mut self, now: u64) -> Effects {
        if self.closed || !self.anchor.is_playing() {
            return Effects::default();
        }

        let effects = self.finish_track(now);
        if !effects.is_empty() {
            return effects;
        }

        let mut effects = Effects::default();
        effects.send(
            self.everyone(),
            OutgoingMessage::SyncUpdate {
                playback_state: self.playback_state(now),
                server_time: now,
            },
        );
        effects
    }
}

fn validate_time(seconds: f64) -> Result<f64, RoomError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(RoomError::invalid("currentTime must be a non-negative number"));
    }
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn defaults() -> RoomDefaults {
        RoomDefaults {
            max_participants: 3,
            max_message_length: 20,
            system_author: "System".to_string(),
        }
    }

    fn conn(name: &str) -> ConnectionId {
        ConnectionId::from(name)
    }

    fn room_with(names: &[&str]) -> (Room, Vec<Participant>) {
        let mut room = Room::new(RoomId::from("ABC123"), None, names[0], &defaults(), T0);
        let joined = names
            .iter()
            .map(|n| room.join(conn(n), None, n, T0).unwrap().0)
            .collect();
        (room, joined)
    }

    fn track(title: &str, duration: u32) -> TrackRequest {
        TrackRequest {
            title: title.to_string(),
            artist: "Artist".to_string(),
            duration,
            source: format!("https://media.example/{}.mp3", title),
        }
    }

    fn at(seconds: f64) -> ControlPayload {
        ControlPayload {
            current_time: Some(seconds),
            volume: None,
        }
    }

    #[test]
    fn first_participant_becomes_admin_and_creator() {
        let (room, joined) = room_with(&["ana"]);
        assert!(joined[0].is_admin);
        assert_eq!(room.info().creator, "ana");
        assert_eq!(room.admin_count(), 1);
        assert_eq!(room.info().name, "ABC123");
    }

    #[test]
    fn later_participants_are_never_admin() {
        let (room, joined) = room_with(&["ana", "bo"]);
        assert!(!joined[1].is_admin);
        assert_eq!(room.admin_count(), 1);
    }

    #[test]
    fn join_sends_snapshot_to_joiner_and_roster_to_others() {
        let (mut room, _) = room_with(&["ana"]);
        let (_, effects) = room.join(conn("bo"), None, "bo", T0 + 10).unwrap();

        let to_bo = effects.messages_for(&conn("bo"));
        assert_eq!(to_bo.len(), 1);
        match to_bo[0] {
            OutgoingMessage::RoomSnapshot {
                participants,
                server_time,
                you,
                ..
            } => {
                assert_eq!(participants.len(), 2);
                assert_eq!(*server_time, T0 + 10);
                assert_eq!(you.name, "bo");
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let to_ana = effects.messages_for(&conn("ana"));
        match to_ana[0] {
            OutgoingMessage::ParticipantJoined { name, participants } => {
                assert_eq!(name, "bo");
                let names: Vec<_> = participants.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["ana", "bo"]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(matches!(to_ana[1], OutgoingMessage::NewMessage { message } if message.author == "System"));
    }

    #[test]
    fn join_rejects_when_full() {
        let (mut room, _) = room_with(&["a", "b", "c"]);
        let err = room.join(conn("d"), None, "d", T0).unwrap_err();
        assert_eq!(err, RoomError::RoomFull { max: 3 });
        assert_eq!(room.participant_count(), 3);
    }

    #[test]
    fn reconnect_replaces_slot_and_keeps_admin() {
        let (mut room, joined) = room_with(&["a", "b", "c"]);
        let admin_id = joined[0].id.clone();

        let (again, effects) = room
            .join(conn("a-2"), Some(admin_id.clone()), "a", T0 + 5)
            .unwrap();

        assert_eq!(again.id, admin_id);
        assert!(again.is_admin);
        assert_eq!(room.participant_count(), 3);
        assert_eq!(effects.evicted, vec![conn("a")]);
        assert!(matches!(
            effects.messages_for(&conn("a"))[0],
            OutgoingMessage::RoomError { .. }
        ));

        // The superseded connection's disconnect must not remove the slot.
        let stale = room.leave(&conn("a"), T0 + 6);
        assert!(stale.is_empty());
        assert_eq!(room.participant_count(), 3);
    }

    #[test]
    fn last_leave_empties_and_closes_room() {
        let (mut room, _) = room_with(&["ana"]);
        let effects = room.leave(&conn("ana"), T0 + 1);
        assert!(effects.emptied);
        assert!(effects.deliveries.is_empty());
        assert!(room.is_closed());
        assert_eq!(
            room.join(conn("bo"), None, "bo", T0 + 2).unwrap_err(),
            RoomError::RoomClosed
        );
    }

    #[test]
    fn admin_leaving_promotes_longest_present() {
        let (mut room, _) = room_with(&["a", "b", "c"]);
        let effects = room.leave(&conn("a"), T0 + 1);

        assert!(!effects.emptied);
        assert_eq!(room.admin_count(), 1);
        assert!(room.participant_for(&conn("b")).unwrap().is_admin);
        assert_eq!(room.info().creator, "b");

        let to_c = effects.messages_for(&conn("c"));
        assert!(matches!(to_c[0], OutgoingMessage::ParticipantLeft { name, .. } if name == "a"));
        assert!(to_c
            .iter()
            .any(|m| matches!(m, OutgoingMessage::AdminTransferred { new_admin_name, .. } if new_admin_name == "b")));
    }

    #[test]
    fn guests_cannot_control_playback_unless_allowed() {
        let (mut room, _) = room_with(&["a", "b"]);
        let err = room
            .control_playback(&conn("b"), PlaybackAction::Play, &at(0.0), T0)
            .unwrap_err();
        assert!(matches!(err, RoomError::PermissionDenied(_)));

        room.update_settings(
            &conn("a"),
            SettingsPatch {
                allow_guest_control: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(room
            .control_playback(&conn("b"), PlaybackAction::Play, &at(0.0), T0)
            .is_ok());
    }

    #[test]
    fn play_on_empty_playlist_arms_playback_and_first_track_starts_at_zero() {
        let (mut room, _) = room_with(&["a"]);
        let effects = room
            .control_playback(&conn("a"), PlaybackAction::Play, &at(0.0), T0)
            .unwrap();
        let state = room.playback_state(T0);
        assert!(state.is_playing);
        assert!(state.current_song.is_none());
        assert_eq!(state.current_index, -1);
        assert_eq!(effects.deliveries.len(), 1);

        room.add_song(&conn("a"), track("song", 180), T0 + 4_000).unwrap();
        let state = room.playback_state(T0 + 4_000);
        assert_eq!(state.current_index, 0);
        assert_eq!(state.current_time, 0.0);
        assert_eq!(state.server_anchor_time, Some(T0 + 4_000));

        let later = room.playback_state(T0 + 34_000);
        assert!((later.current_time - 30.0).abs() < 1e-9);
    }

    #[test]
    fn next_and_previous_at_boundaries_are_silent_noops() {
        let (mut room, _) = room_with(&["a"]);
        room.add_song(&conn("a"), track("one", 100), T0).unwrap();
        room.add_song(&conn("a"), track("two", 100), T0).unwrap();

        let before = room.playback_state(T0 + 1);
        let effects = room
            .control_playback(&conn("a"), PlaybackAction::Previous, &ControlPayload::default(), T0 + 1)
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(room.playback_state(T0 + 1), before);

        room.control_playback(&conn("a"), PlaybackAction::Next, &ControlPayload::default(), T0 + 2)
            .unwrap();
        assert_eq!(room.playback_state(T0 + 2).current_index, 1);

        let effects = room
            .control_playback(&conn("a"), PlaybackAction::Next, &ControlPayload::default(), T0 + 3)
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(room.playback_state(T0 + 3).current_index, 1);
    }

    #[test]
    fn next_while_playing_rebases_at_zero() {
        let (mut room, _) = room_with(&["a"]);
        room.add_song(&conn("a"), track("one", 100), T0).unwrap();
        room.add_song(&conn("a"), track("two", 100), T0).unwrap();
        room.control_playback(&conn("a"), PlaybackAction::Play, &at(50.0), T0)
            .unwrap();
        room.control_playback(&conn("a"), PlaybackAction::Next, &ControlPayload::default(), T0 + 10_000)
            .unwrap();

        let state = room.playback_state(T0 + 12_000);
        assert!(state.is_playing);
        assert_eq!(state.position_at_anchor, 0.0);
        assert!((state.current_time - 2.0).abs() < 1e-9);
    }

    #[test]
    fn seek_validates_and_clamps_to_duration() {
        let (mut room, _) = room_with(&["a"]);
        room.add_song(&conn("a"), track("one", 100), T0).unwrap();

        let missing = room
            .control_playback(&conn("a"), PlaybackAction::Seek, &ControlPayload::default(), T0)
            .unwrap_err();
        assert!(matches!(missing, RoomError::InvalidInput(_)));
        let negative = room
            .control_playback(&conn("a"), PlaybackAction::Seek, &at(-1.0), T0)
            .unwrap_err();
        assert!(matches!(negative, RoomError::InvalidInput(_)));

        room.control_playback(&conn("a"), PlaybackAction::Seek, &at(500.0), T0)
            .unwrap();
        assert_eq!(room.playback_state(T0).position_at_anchor, 100.0);
    }

    #[test]
    fn volume_is_clamped_and_broadcast() {
        let (mut room, _) = room_with(&["a", "b"]);
        let payload = ControlPayload {
            current_time: None,
            volume: Some(3.5),
        };
        let effects = room
            .control_playback(&conn("a"), PlaybackAction::Volume, &payload, T0)
            .unwrap();
        assert_eq!(room.playback_state(T0).volume, 1.0);
        assert_eq!(effects.messages_for(&conn("b")).len(), 1);
    }

    #[test]
    fn kick_requires_admin_and_existing_target() {
        let (mut room, joined) = room_with(&["a", "b", "c"]);

        let denied = room.kick(&conn("b"), &joined[2].id, None, T0).unwrap_err();
        assert!(matches!(denied, RoomError::PermissionDenied(_)));

        let missing = room
            .kick(&conn("a"), &ParticipantId::from("ghost"), None, T0)
            .unwrap_err();
        assert!(matches!(missing, RoomError::NotFound(_)));

        let effects = room.kick(&conn("a"), &joined[1].id, None, T0).unwrap();
        assert_eq!(effects.evicted, vec![conn("b")]);
        assert!(matches!(
            effects.messages_for(&conn("b"))[0],
            OutgoingMessage::Kicked { .. }
        ));
        assert!(matches!(
            effects.messages_for(&conn("c"))[0],
            OutgoingMessage::ParticipantLeft { .. }
        ));
        assert_eq!(room.participant_count(), 2);
    }

    #[test]
    fn transfer_admin_flips_both_flags() {
        let (mut room, joined) = room_with(&["a", "b"]);
        let effects = room.transfer_admin(&conn("a"), &joined[1].id, T0).unwrap();

        assert_eq!(room.admin_count(), 1);
        assert!(room.participant_for(&conn("b")).unwrap().is_admin);
        assert!(!room.participant_for(&conn("a")).unwrap().is_admin);
        assert_eq!(room.info().creator, "b");
        match effects.messages_for(&conn("a"))[0] {
            OutgoingMessage::AdminTransferred { participants, .. } => {
                assert_eq!(participants.iter().filter(|p| p.is_admin).count(), 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let denied = room.transfer_admin(&conn("a"), &joined[0].id, T0).unwrap_err();
        assert!(matches!(denied, RoomError::PermissionDenied(_)));
    }

    #[test]
    fn lowering_capacity_keeps_existing_participants() {
        let (mut room, _) = room_with(&["a", "b", "c"]);
        room.update_settings(
            &conn("a"),
            SettingsPatch {
                max_participants: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(room.participant_count(), 3);
        assert_eq!(room.settings().max_participants, 1);

        room.leave(&conn("c"), T0);
        assert!(matches!(
            room.join(conn("d"), None, "d", T0).unwrap_err(),
            RoomError::RoomFull { max: 1 }
        ));
    }

    #[test]
    fn close_evicts_everyone() {
        let (mut room, _) = room_with(&["a", "b"]);
        assert!(matches!(
            room.close(&conn("b")).unwrap_err(),
            RoomError::PermissionDenied(_)
        ));

        let effects = room.close(&conn("a")).unwrap();
        assert!(effects.emptied);
        assert_eq!(effects.evicted.len(), 2);
        assert!(matches!(
            effects.messages_for(&conn("b"))[0],
            OutgoingMessage::RoomClosed { .. }
        ));
        assert!(room.is_closed());
        assert_eq!(room.participant_count(), 0);
    }

    #[test]
    fn chat_messages_are_validated_and_broadcast() {
        let (mut room, _) = room_with(&["a", "b"]);
        assert!(matches!(
            room.send_message(&conn("a"), "   ", T0).unwrap_err(),
            RoomError::InvalidInput(_)
        ));
        assert!(matches!(
            room.send_message(&conn("a"), &"x".repeat(21), T0).unwrap_err(),
            RoomError::InvalidInput(_)
        ));

        let effects = room.send_message(&conn("b"), " hello ", T0).unwrap();
        match effects.messages_for(&conn("a"))[0] {
            OutgoingMessage::NewMessage { message } => {
                assert_eq!(message.author, "b");
                assert_eq!(message.text, "hello");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(room.messages().last().unwrap().text, "hello");
    }

    #[test]
    fn tick_advances_finished_track_and_pauses_at_end() {
        let (mut room, _) = room_with(&["a"]);
        room.add_song(&conn("a"), track("one", 10), T0).unwrap();
        room.add_song(&conn("a"), track("two", 10), T0).unwrap();
        room.control_playback(&conn("a"), PlaybackAction::Play, &at(0.0), T0)
            .unwrap();

        let sample = room.tick(T0 + 5_000);
        assert!(matches!(
            sample.messages_for(&conn("a"))[0],
            OutgoingMessage::SyncUpdate { .. }
        ));

        room.tick(T0 + 10_500);
        let state = room.playback_state(T0 + 10_500);
        assert_eq!(state.current_index, 1);
        assert!(state.is_playing);
        assert_eq!(state.current_time, 0.0);

        room.tick(T0 + 21_000);
        let state = room.playback_state(T0 + 21_000);
        assert!(!state.is_playing);
        assert_eq!(state.current_time, 10.0);
        assert!(room.tick(T0 + 30_000).is_empty());
    }

    #[test]
    fn non_members_are_rejected() {
        let (mut room, _) = room_with(&["a"]);
        let err = room.request_sync(&conn("stranger"), T0).unwrap_err();
        assert!(matches!(err, RoomError::NotFound(_)));
        let err = room.add_song(&conn("stranger"), track("x", 1), T0).unwrap_err();
        assert!(matches!(err, RoomError::NotFound(_)));
    }

    #[test]
    fn unknown_duration_track_plays_without_bound() {
        let (mut room, _) = room_with(&["a"]);
        room.add_song(&conn("a"), track("live", 0), T0).unwrap();
        room.control_playback(&conn("a"), PlaybackAction::Play, &at(42.0), T0)
            .unwrap();

        let state = room.playback_state(T0 + 20_000);
        assert!((state.current_time - 62.0).abs() < 1e-9);
        assert_eq!(state.duration(), None);
        assert_eq!(room.remaining_ms(T0 + 20_000), None);

        // Nothing to finish, so ticks keep sampling the same track.
        let effects = room.tick(T0 + 600_000);
        assert!(matches!(
            effects.messages_for(&conn("a"))[0],
            OutgoingMessage::SyncUpdate { .. }
        ));
        assert_eq!(room.playback_state(T0 + 600_000).current_index, 0);

        room.control_playback(&conn("a"), PlaybackAction::Seek, &at(5_000.0), T0 + 600_001)
            .unwrap();
        assert_eq!(room.playback_state(T0 + 600_001).current_time, 5_000.0);
    }

    #[test]
    fn remaining_time_counts_down_and_finish_waits_for_the_end() {
        let (mut room, _) = room_with(&["a"]);
        room.add_song(&conn("a"), track("one", 10), T0).unwrap();
        room.add_song(&conn("a"), track("two", 10), T0).unwrap();
        assert_eq!(room.remaining_ms(T0), None);

        room.control_playback(&conn("a"), PlaybackAction::Play, &at(4.0), T0)
            .unwrap();
        assert_eq!(room.remaining_ms(T0 + 1_500), Some(4_500));

        assert!(room.finish_track(T0 + 5_999).is_empty());
        let effects = room.finish_track(T0 + 6_000);
        assert!(matches!(
            effects.messages_for(&conn("a"))[0],
            OutgoingMessage::PlaybackStateChanged { .. }
        ));
        assert_eq!(room.playback_state(T0 + 6_000).current_index, 1);
        assert_eq!(room.remaining_ms(T0 + 6_000), Some(10_000));
    }

    #[test]
    fn rejoin_on_same_connection_is_not_announced_twice() {
        let (mut room, joined) = room_with(&["a", "b"]);
        let history = room.messages().len();

        let (again, effects) = room
            .join(conn("b"), Some(joined[1].id.clone()), "b", T0 + 10)
            .unwrap();

        assert_eq!(again.id, joined[1].id);
        assert_eq!(room.participant_count(), 2);
        assert_eq!(room.messages().len(), history);
        assert!(effects.evicted.is_empty());
        assert!(effects.messages_for(&conn("a")).is_empty());
        let to_joiner = effects.messages_for(&conn("b"));
        assert_eq!(to_joiner.len(), 1);
        assert!(matches!(to_joiner[0], OutgoingMessage::RoomSnapshot { .. }));
    }
}
