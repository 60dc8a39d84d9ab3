use serde::{Deserialize, Serialize};

use crate::protocol::models::{
    ChatMessage, Participant, PlaybackState, RoomInfo, RoomSettings,
};

/// Messages sent from server to client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    /// Sent once, to the joining connection only.
    #[serde(rename_all = "camelCase")]
    RoomSnapshot {
        room: RoomInfo,
        /// The joining participant's own slot, including its issued identifier.
        you: Participant,
        participants: Vec<Participant>,
        messages: Vec<ChatMessage>,
        playback_state: PlaybackState,
        server_time: u64,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        name: String,
        participants: Vec<Participant>,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        name: String,
        participants: Vec<Participant>,
    },
    #[serde(rename_all = "camelCase")]
    NewMessage { message: ChatMessage },
    #[serde(rename_all = "camelCase")]
    PlaylistUpdated { playback_state: PlaybackState },
    #[serde(rename_all = "camelCase")]
    PlaybackStateChanged {
        playback_state: PlaybackState,
        server_time: u64,
    },
    #[serde(rename_all = "camelCase")]
    SyncUpdate {
        playback_state: PlaybackState,
        server_time: u64,
    },
    #[serde(rename_all = "camelCase")]
    AdminTransferred {
        new_admin_name: String,
        participants: Vec<Participant>,
    },
    #[serde(rename_all = "camelCase")]
    SettingsUpdated { settings: RoomSettings },
    #[serde(rename_all = "camelCase")]
    Kicked { reason: String },
    #[serde(rename_all = "camelCase")]
    RoomClosed { reason: String },
    #[serde(rename_all = "camelCase")]
    PermissionDenied { reason: String },
    /// `fatal` is set when the receiving connection is no longer part of the room.
    #[serde(rename_all = "camelCase")]
    RoomError {
        reason: String,
        #[serde(default)]
        fatal: bool,
    },
}

impl OutgoingMessage {
    /// Playback payload and server timestamp, for messages that carry both.
    pub fn timed_playback(&self) -> Option<(&PlaybackState, u64)> {
        match self {
            Self::RoomSnapshot {
                playback_state,
                server_time,
                ..
            }
            | Self::PlaybackStateChanged {
                playback_state,
                server_time,
            }
            | Self::SyncUpdate {
                playback_state,
                server_time,
            } => Some((playback_state, *server_time)),
            _ => None,
        }
    }

    /// Messages after which the receiving client is no longer in the room.
    pub fn ends_membership(&self) -> bool {
        matches!(
            self,
            Self::Kicked { .. } | Self::RoomClosed { .. } | Self::RoomError { fatal: true, .. }
        )
    }
}
