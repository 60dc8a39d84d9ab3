//! Standalone playback: the same room state machine and session, with no server.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    common::{
        clock::Clock,
        errors::RoomError,
        types::{ConnectionId, RoomId},
    },
    configs::RoomsConfig,
    protocol::{OutgoingMessage, PlaybackAction},
    room::{Effects, Room, RoomDefaults},
};

use super::{
    connection::ClientCommand,
    drift::{DriftAction, DriftConfig},
    player::MediaPlayer,
    reconciler::Reconciler,
    session::ListenerSession,
};

pub struct LocalRoom<P: MediaPlayer> {
    room: Room,
    connection: ConnectionId,
    session: ListenerSession<P>,
    clock: Arc<dyn Clock>,
}

impl<P: MediaPlayer> LocalRoom<P> {
    pub fn new(name: &str, player: P, clock: Arc<dyn Clock>) -> Result<Self, RoomError> {
        let now = clock.now_ms();
        let defaults = RoomDefaults::from(&RoomsConfig::default());
        let mut room = Room::new(RoomId::from("local"), None, name, &defaults, now);
        let connection = ConnectionId::from("local");
        room.join(connection.clone(), None, name, now)?;

        let mut session = ListenerSession::new(player, Reconciler::local(), DriftConfig::default());
        session.apply_local(room.playback_state(now), now);

        Ok(Self {
            room,
            connection,
            session,
            clock,
        })
    }

    pub fn session(&self) -> &ListenerSession<P> {
        &self.session
    }

    /// Runs one command. Returns false once the user asked to leave.
    pub fn handle(&mut self, command: ClientCommand) -> bool {
        let now = self.clock.now_ms();
        let result = match command {
            ClientCommand::Chat(text) => self.room.send_message(&self.connection, &text, now),
            ClientCommand::AddSong(track) => self.room.add_song(&self.connection, track, now),
            ClientCommand::Control { action, payload } => {
                if let (PlaybackAction::Seek, Some(position)) = (action, payload.current_time) {
                    self.session.user_seek(position, now);
                }
                self.room
                    .control_playback(&self.connection, action, &payload, now)
            }
            ClientCommand::RequestSync => Ok(Effects::default()),
            ClientCommand::Leave => return false,
        };

        match result {
            Ok(effects) => self.absorb(&effects, now),
            Err(e) => warn!("{}", e),
        }
        true
    }

    /// Advances track bookkeeping and polls the player, like one server sync plus one drift tick.
    pub fn tick(&mut self) -> DriftAction {
        let now = self.clock.now_ms();
        let effects = self.room.tick(now);
        self.absorb(&effects, now);
        self.session.poll(now)
    }

    fn absorb(&mut self, effects: &Effects, now: u64) {
        for message in effects.messages_for(&self.connection) {
            if let OutgoingMessage::NewMessage { message } = message {
                info!("<{}> {}", message.author, message.text);
            }
        }
        if effects.deliveries.iter().any(|d| d.message.timed_playback().is_some()
            || matches!(d.message, OutgoingMessage::PlaylistUpdated { .. }))
        {
            self.session.apply_local(self.room.playback_state(now), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::player::SimulatedPlayer,
        common::clock::ManualClock,
        protocol::{ControlPayload, TrackRequest},
    };

    fn song(title: &str, duration: u32) -> ClientCommand {
        ClientCommand::AddSong(TrackRequest {
            title: title.into(),
            artist: "Band".into(),
            duration,
            source: format!("file:///music/{}.mp3", title),
        })
    }

    fn control(action: PlaybackAction) -> ClientCommand {
        ClientCommand::Control {
            action,
            payload: ControlPayload::default(),
        }
    }

    #[test]
    fn local_controls_drive_the_player() {
        let clock = Arc::new(ManualClock::new(1_000));
        let player = SimulatedPlayer::new(clock.clone());
        let mut local = LocalRoom::new("solo", player, clock.clone()).unwrap();

        assert!(local.handle(song("a", 120)));
        assert!(local.handle(control(PlaybackAction::Play)));
        assert!(local.session().player().is_playing());
        assert_eq!(local.session().player().source(), Some("file:///music/a.mp3"));

        clock.advance(5_000);
        assert_eq!(local.tick(), DriftAction::Skip);
        assert!((local.session().player().position() - 5.0).abs() < 1e-9);

        local.handle(control(PlaybackAction::Pause));
        assert!(!local.session().player().is_playing());
        assert!(!local.session().reconciler().corrections_enabled());
        assert_eq!(local.session().reconciler().offset_ms(), 0);
    }

    #[test]
    fn finished_track_advances_locally() {
        let clock = Arc::new(ManualClock::new(0));
        let player = SimulatedPlayer::new(clock.clone());
        let mut local = LocalRoom::new("solo", player, clock.clone()).unwrap();
        local.handle(song("a", 10));
        local.handle(song("b", 10));
        local.handle(control(PlaybackAction::Play));

        clock.advance(10_000);
        local.tick();
        assert_eq!(local.session().player().source(), Some("file:///music/b.mp3"));
        assert!(local.session().player().is_playing());
    }

    #[test]
    fn leave_stops_the_loop() {
        let clock = Arc::new(ManualClock::new(0));
        let player = SimulatedPlayer::new(clock.clone());
        let mut local = LocalRoom::new("solo", player, clock).unwrap();
        assert!(!local.handle(ClientCommand::Leave));
    }
}
