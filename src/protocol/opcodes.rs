use serde::{Deserialize, Serialize};

use crate::{
    common::types::{ParticipantId, RoomId},
    protocol::models::{JoinParticipant, TrackRequest},
};

/// Messages sent from client to server over WebSocket.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IncomingMessage {
    #[serde(rename_all = "camelCase")]
    Join {
        room_id: RoomId,
        participant: JoinParticipant,
        /// Display name used only when this join creates the room.
        #[serde(default)]
        room_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RequestSync { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    SendMessage { room_id: RoomId, text: String },
    #[serde(rename_all = "camelCase")]
    AddSong { room_id: RoomId, track: TrackRequest },
    #[serde(rename_all = "camelCase")]
    ControlPlayback {
        room_id: RoomId,
        action: PlaybackAction,
        #[serde(default)]
        payload: ControlPayload,
    },
    #[serde(rename_all = "camelCase")]
    UserAction {
        room_id: RoomId,
        action: UserActionKind,
        #[serde(default)]
        target_id: Option<ParticipantId>,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    CloseRoom { room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId },
}

impl IncomingMessage {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Join { room_id, .. }
            | Self::RequestSync { room_id }
            | Self::SendMessage { room_id, .. }
            | Self::AddSong { room_id, .. }
            | Self::ControlPlayback { room_id, .. }
            | Self::UserAction { room_id, .. }
            | Self::CloseRoom { room_id }
            | Self::LeaveRoom { room_id } => room_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::RequestSync { .. } => "requestSync",
            Self::SendMessage { .. } => "sendMessage",
            Self::AddSong { .. } => "addSong",
            Self::ControlPlayback { .. } => "controlPlayback",
            Self::UserAction { .. } => "userAction",
            Self::CloseRoom { .. } => "closeRoom",
            Self::LeaveRoom { .. } => "leaveRoom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackAction {
    Play,
    Pause,
    Seek,
    Next,
    Previous,
    Volume,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPayload {
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    /// 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UserActionKind {
    Kick,
    TransferAdmin,
    UpdateSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_with_optional_fields_missing() {
        let raw = r#"{"type":"join","roomId":"ABC123","participant":{"name":"Ana"}}"#;
        let msg: IncomingMessage = serde_json::from_str(raw).unwrap();
        match msg {
            IncomingMessage::Join {
                room_id,
                participant,
                room_name,
            } => {
                assert_eq!(room_id, RoomId::from("ABC123"));
                assert_eq!(participant.name, "Ana");
                assert!(participant.id.is_none());
                assert!(!participant.is_admin);
                assert!(room_name.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parses_control_playback_without_payload() {
        let raw = r#"{"type":"controlPlayback","roomId":"R","action":"next"}"#;
        let msg: IncomingMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind(), "controlPlayback");
        match msg {
            IncomingMessage::ControlPlayback { action, payload, .. } => {
                assert_eq!(action, PlaybackAction::Next);
                assert_eq!(payload, ControlPayload::default());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parses_user_action_with_target() {
        let raw = r#"{"type":"userAction","roomId":"R","action":"transferAdmin","targetId":"p2"}"#;
        let msg: IncomingMessage = serde_json::from_str(raw).unwrap();
        match msg {
            IncomingMessage::UserAction {
                action, target_id, ..
            } => {
                assert_eq!(action, UserActionKind::TransferAdmin);
                assert_eq!(target_id, Some(ParticipantId::from("p2")));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_playback_action() {
        let raw = r#"{"type":"controlPlayback","roomId":"R","action":"rewind"}"#;
        assert!(serde_json::from_str::<IncomingMessage>(raw).is_err());
    }
}
