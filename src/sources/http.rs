use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use tracing::debug;

use crate::{
    common::types::AnyResult,
    protocol::TrackCandidate,
    sources::plugin::{LookupError, TrackLookup},
};

/// HTTP/HTTPS Source
///
/// Resolves direct media URLs. Metadata comes from the response headers of a
/// `HEAD` request; the duration is unknown and reported as 0.
pub struct HttpSource {
    url_regex: Regex,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> AnyResult<Self> {
        Ok(Self {
            // Matches http:// or https:// URLs
            url_regex: Regex::new(r"^https?://")?,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("listenroom/", env!("CARGO_PKG_VERSION")))
                .build()?,
        })
    }

    fn is_valid_content_type(content_type: &str) -> bool {
        content_type.starts_with("audio/")
            || content_type.starts_with("video/")
            || content_type == "application/octet-stream"
            || content_type.is_empty()
    }

    fn extract_metadata(url: &str, headers: &HeaderMap) -> TrackCandidate {
        let title = headers
            .get("icy-name")
            .and_then(|h| h.to_str().ok())
            .or_else(|| {
                headers
                    .get("content-disposition")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.split("filename=\"").nth(1))
                    .and_then(|s| s.split('"').next())
            })
            .unwrap_or_else(|| {
                url.split('?')
                    .next()
                    .and_then(|s| s.rsplit('/').next())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Audio Stream")
            })
            .to_string();

        let artist = headers
            .get("icy-description")
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        TrackCandidate {
            title,
            artist,
            duration_seconds: 0,
            source_locator: url.to_string(),
        }
    }
}

#[async_trait]
impl TrackLookup for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, query: &str) -> bool {
        self.url_regex.is_match(query)
    }

    async fn search(&self, query: &str) -> Result<Vec<TrackCandidate>, LookupError> {
        let url = query.trim().trim_start_matches('<').trim_end_matches('>');
        debug!("Probing HTTP source: {}", url);

        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !Self::is_valid_content_type(content_type) {
            debug!("Ignoring {} with content type {}", url, content_type);
            return Ok(Vec::new());
        }

        Ok(vec![Self::extract_metadata(url, headers)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn handles_only_http_urls() {
        let source = HttpSource::new(Duration::from_secs(1)).unwrap();
        assert!(source.can_handle("https://media.example/a.mp3"));
        assert!(source.can_handle("http://radio.example/stream"));
        assert!(!source.can_handle("never gonna give you up"));
    }

    #[test]
    fn title_prefers_icy_name_then_filename_then_path() {
        let url = "https://media.example/music/track01.mp3?sig=abc";

        let mut headers = HeaderMap::new();
        assert_eq!(HttpSource::extract_metadata(url, &headers).title, "track01.mp3");

        headers.insert(
            "content-disposition",
            HeaderValue::from_static("attachment; filename=\"Song.flac\""),
        );
        assert_eq!(HttpSource::extract_metadata(url, &headers).title, "Song.flac");

        headers.insert("icy-name", HeaderValue::from_static("Night Radio"));
        headers.insert("icy-description", HeaderValue::from_static("DJ Someone"));
        let candidate = HttpSource::extract_metadata(url, &headers);
        assert_eq!(candidate.title, "Night Radio");
        assert_eq!(candidate.artist, "DJ Someone");
        assert_eq!(candidate.duration_seconds, 0);
        assert_eq!(candidate.source_locator, url);
    }

    #[test]
    fn content_type_filter() {
        assert!(HttpSource::is_valid_content_type("audio/mpeg"));
        assert!(HttpSource::is_valid_content_type(""));
        assert!(!HttpSource::is_valid_content_type("text/html"));
    }
}
