use async_trait::async_trait;

use crate::protocol::TrackCandidate;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("No source can handle '{0}'")]
    Unsupported(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Source responded with status {0}")]
    Status(u16),

    #[error("Lookup timed out after {0} ms")]
    Timeout(u64),
}

/// Trait that every track-lookup provider implements.
///
/// Providers turn a free-form query (a search string or a URL) into zero or
/// more track candidates that a client can submit with `addSong`.
#[async_trait]
pub trait TrackLookup: Send + Sync {
    /// Unique identifier for this source (e.g., "http")
    fn name(&self) -> &str;

    /// Check if this source can handle the given query.
    fn can_handle(&self, query: &str) -> bool;

    async fn search(&self, query: &str) -> Result<Vec<TrackCandidate>, LookupError>;
}

pub type BoxedLookup = Box<dyn TrackLookup>;
