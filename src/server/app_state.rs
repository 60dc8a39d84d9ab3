use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;

use crate::{
    common::{
        clock::Clock,
        errors::RoomError,
        logger::resident_memory_kb,
        types::{AnyResult, ConnectionId, RoomId},
    },
    configs::Config,
    protocol::Stats,
    room::{RoomDefaults, RoomRegistry},
    server::connection::Connection,
    sources::SourceManager,
};

/// Top-level application state.
pub struct AppState {
    pub config: Config,
    pub registry: RoomRegistry,
    pub connections: DashMap<ConnectionId, Arc<Connection>>,
    pub source_manager: Arc<SourceManager>,
    pub clock: Arc<dyn Clock>,
    pub started_at: u64,
    room_code: Regex,
}

impl AppState {
    pub fn new(
        config: Config,
        source_manager: Arc<SourceManager>,
        clock: Arc<dyn Clock>,
    ) -> AnyResult<Self> {
        let room_code = Regex::new(&format!(
            "^[A-Za-z0-9_-]{{1,{}}}$",
            config.rooms.max_room_id_length
        ))?;

        Ok(Self {
            registry: RoomRegistry::new(RoomDefaults::from(&config.rooms)),
            connections: DashMap::new(),
            source_manager,
            started_at: clock.now_ms(),
            clock,
            config,
            room_code,
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn uptime_ms(&self) -> u64 {
        self.now_ms().saturating_sub(self.started_at)
    }

    pub fn validate_room_id(&self, room_id: &RoomId) -> Result<(), RoomError> {
        if self.room_code.is_match(room_id) {
            Ok(())
        } else {
            Err(RoomError::invalid(format!(
                "room code must be 1-{} letters, digits, '-' or '_'",
                self.config.rooms.max_room_id_length
            )))
        }
    }

    /// Trims a display name and checks it against the configured length.
    pub fn validate_name(&self, name: &str) -> Result<String, RoomError> {
        let name = name.trim();
        let max = self.config.rooms.max_name_length;
        if name.is_empty() {
            return Err(RoomError::invalid("display name is empty"));
        }
        if name.chars().count() > max {
            return Err(RoomError::invalid(format!(
                "display name exceeds {} characters",
                max
            )));
        }
        Ok(name.to_string())
    }

    pub fn stats(&self) -> Stats {
        Stats {
            rooms: self.registry.len(),
            playing_rooms: self.registry.playing_count(),
            participants: self.registry.participant_count(),
            connections: self.connections.len(),
            uptime: self.uptime_ms(),
            memory_kb: resident_memory_kb(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::ManualClock;

    fn state() -> AppState {
        let config = Config::default();
        let sources = Arc::new(SourceManager::new(&config));
        AppState::new(config, sources, Arc::new(ManualClock::new(10_000))).unwrap()
    }

    #[test]
    fn room_codes_follow_the_configured_pattern() {
        let state = state();
        assert!(state.validate_room_id(&RoomId::from("ABC123")).is_ok());
        assert!(state.validate_room_id(&RoomId::from("late-night_mix")).is_ok());
        assert!(state.validate_room_id(&RoomId::from("")).is_err());
        assert!(state.validate_room_id(&RoomId::from("has space")).is_err());
        assert!(state.validate_room_id(&RoomId::from("x".repeat(33))).is_err());
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        let state = state();
        assert_eq!(state.validate_name("  Ana ").unwrap(), "Ana");
        assert!(state.validate_name("   ").is_err());
        assert!(state.validate_name(&"n".repeat(33)).is_err());
    }

    #[test]
    fn fresh_state_reports_empty_stats() {
        let stats = state().stats();
        assert_eq!(stats.rooms, 0);
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.uptime, 0);
    }
}
