use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoomsConfig {
    /// Capacity given to newly created rooms; admins may change it later.
    #[serde(default = "default_max_participants")]
    pub default_max_participants: u32,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_max_room_id_length")]
    pub max_room_id_length: usize,
    /// Period of `syncUpdate` broadcasts while a room is playing.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// Author name used for server-generated chat entries.
    #[serde(default = "default_system_author")]
    pub system_author: String,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            default_max_participants: default_max_participants(),
            max_message_length: default_max_message_length(),
            max_name_length: default_max_name_length(),
            max_room_id_length: default_max_room_id_length(),
            sync_interval_ms: default_sync_interval_ms(),
            system_author: default_system_author(),
        }
    }
}

fn default_max_participants() -> u32 {
    50
}

fn default_max_message_length() -> usize {
    500
}

fn default_max_name_length() -> usize {
    32
}

fn default_max_room_id_length() -> usize {
    32
}

fn default_sync_interval_ms() -> u64 {
    5_000
}

fn default_system_author() -> String {
    "System".to_string()
}
