use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rooms: RoomsConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn load() -> AnyResult<Self> {
        let config_path = if std::path::Path::new("config.toml").exists() {
            "config.toml"
        } else if std::path::Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        crate::log_println!("Loading configuration from: {}", config_path);

        let config_str = std::fs::read_to_string(config_path)?;
        Self::parse(&config_str).map_err(|e| format!("{}: {}", config_path, e).into())
    }

    pub fn parse(source: &str) -> AnyResult<Self> {
        if source.trim().is_empty() {
            return Err("configuration is empty".into());
        }
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AnyResult<()> {
        if self.rooms.default_max_participants == 0 {
            return Err("rooms.default_max_participants must be at least 1".into());
        }
        if self.rooms.sync_interval_ms == 0 {
            return Err("rooms.sync_interval_ms must be greater than 0".into());
        }
        if self.rooms.max_room_id_length == 0 || self.rooms.max_name_length == 0 {
            return Err("rooms length limits must be greater than 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = Config::parse("[server]\nport = 4000\n").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.server.password.is_none());
        assert_eq!(config.rooms.default_max_participants, 50);
        assert_eq!(config.rooms.sync_interval_ms, 5_000);
        assert_eq!(config.rooms.system_author, "System");
        assert!(config.sources.http);
        assert!(config.logging.is_none());
    }

    #[test]
    fn logging_file_section_parses() {
        let config = Config::parse(
            r#"
            [logging]
            level = "debug"

            [logging.file]
            path = "./logs/listenroom.log"
            "#,
        )
        .unwrap();
        let file = config.logging.unwrap().file.unwrap();
        assert_eq!(file.path, "./logs/listenroom.log");
        assert_eq!(file.max_lines, 10_000);
    }

    #[test]
    fn rejects_zero_capacity_and_empty_source() {
        assert!(Config::parse("").is_err());
        assert!(Config::parse("[rooms]\ndefault_max_participants = 0\n").is_err());
    }
}
