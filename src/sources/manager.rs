use std::time::Duration;

use tracing::warn;

use super::{
    http::HttpSource,
    plugin::{BoxedLookup, LookupError},
};
use crate::protocol::SearchResult;

/// Source Manager
pub struct SourceManager {
    pub sources: Vec<BoxedLookup>,
    timeout: Duration,
}

impl SourceManager {
    /// Create a new SourceManager with every source enabled in the config
    pub fn new(config: &crate::configs::Config) -> Self {
        let mut sources: Vec<BoxedLookup> = Vec::new();
        let timeout = Duration::from_millis(config.sources.lookup_timeout_ms);

        macro_rules! register_source {
            ($enabled:expr, $name:literal, $ctor:expr) => {
                if $enabled {
                    match $ctor {
                        Ok(src) => {
                            tracing::info!("Loaded source: {}", $name);
                            sources.push(Box::new(src));
                        }
                        Err(e) => {
                            tracing::error!("{} source failed to initialize: {}", $name, e);
                        }
                    }
                }
            };
        }

        register_source!(config.sources.http, "http", HttpSource::new(timeout));

        Self { sources, timeout }
    }

    pub fn with_sources(sources: Vec<BoxedLookup>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Runs `query` against the first source that accepts it.
    pub async fn search(&self, query: &str) -> Result<SearchResult, LookupError> {
        let Some(source) = self.sources.iter().find(|s| s.can_handle(query)) else {
            return Err(LookupError::Unsupported(query.to_string()));
        };

        let candidates = match tokio::time::timeout(self.timeout, source.search(query)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("{} lookup for '{}' timed out", source.name(), query);
                return Err(LookupError::Timeout(self.timeout.as_millis() as u64));
            }
        };

        Ok(SearchResult {
            source: Some(source.name().to_string()),
            candidates,
        })
    }
}
