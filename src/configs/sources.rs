use serde::{Deserialize, Serialize};

/// Which track-lookup providers are registered at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    #[serde(default = "default_true")]
    pub http: bool,
    /// Timeout applied to every lookup request.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            http: true,
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lookup_timeout_ms() -> u64 {
    5_000
}
