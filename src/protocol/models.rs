use serde::{Deserialize, Serialize};

use crate::common::types::{ParticipantId, RoomId};

/// One occupied slot in a room, as seen by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub is_admin: bool,
    /// Unix timestamp in milliseconds.
    pub joined_at: u64,
    pub is_online: bool,
}

/// Identity supplied by the client-side bootstrap at join time.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParticipant {
    /// Identifier issued by a previous join. Omit on first join.
    #[serde(default)]
    pub id: Option<ParticipantId>,
    pub name: String,
    /// Advisory only; the server decides who is admin.
    #[serde(default)]
    pub is_admin: bool,
}

/// A playlist entry. Immutable once added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Length in whole seconds.
    pub duration: u32,
    /// Where clients fetch the media from.
    pub source: String,
    pub added_by: String,
    /// Unix timestamp in milliseconds.
    pub added_at: u64,
}

/// Track as submitted by `addSong`; the server fills in the rest.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub duration: u32,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub text: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub allow_guest_control: bool,
    pub max_participants: u32,
    pub is_public: bool,
    pub require_approval: bool,
}

impl RoomSettings {
    pub fn with_capacity(max_participants: u32) -> Self {
        Self {
            allow_guest_control: false,
            max_participants,
            is_public: true,
            require_approval: false,
        }
    }
}

/// Partial settings update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub allow_guest_control: Option<bool>,
    #[serde(default)]
    pub max_participants: Option<u32>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub require_approval: Option<bool>,
}

/// Room metadata sent in the join snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub creator: String,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
    pub settings: RoomSettings,
}

/// Full playback payload carried by every playback broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Position in seconds at the moment the payload was built.
    pub current_time: f64,
    /// Position in seconds at `server_anchor_time`, or the frozen position when paused.
    pub position_at_anchor: f64,
    /// Unix milliseconds; present iff `is_playing`.
    pub server_anchor_time: Option<u64>,
    pub last_mutation_time: u64,
    /// -1 when the playlist is empty.
    pub current_index: i64,
    pub current_song: Option<Track>,
    pub playlist: Vec<Track>,
    pub volume: f32,
}

impl PlaybackState {
    /// Duration of the current song in seconds. A zero duration means unknown and yields `None`.
    pub fn duration(&self) -> Option<f64> {
        self.current_song
            .as_ref()
            .filter(|t| t.duration > 0)
            .map(|t| t.duration as f64)
    }
}
