pub mod http;
pub mod manager;
pub mod plugin;

pub use manager::SourceManager;
pub use plugin::{BoxedLookup, LookupError, TrackLookup};
