use serde::{Deserialize, Serialize};

use crate::common::{banner::BuildInfo, types::RoomId};

/// Response for `GET /v1/info`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: &'static str,
    pub build: BuildInfo,
    pub uptime: u64,
}

/// Response for `GET /v1/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub rooms: usize,
    pub playing_rooms: usize,
    pub participants: usize,
    pub connections: usize,
    /// Milliseconds since startup.
    pub uptime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u64>,
}

/// Public listing entry for `GET /v1/rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub creator: String,
    pub participants: usize,
    pub max_participants: u32,
    pub is_playing: bool,
    pub current_song: Option<String>,
    pub created_at: u64,
}

/// One candidate from a track lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCandidate {
    pub title: String,
    pub artist: String,
    pub duration_seconds: u32,
    pub source_locator: String,
}

/// Response for `GET /v1/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub source: Option<String>,
    pub candidates: Vec<TrackCandidate>,
}
