use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use crate::{
    common::errors::ErrorResponse,
    protocol::SearchResult,
    server::AppState,
    sources::LookupError,
};

#[derive(Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

/// GET /v1/search?query=
///
/// A query no source accepts yields an empty result; provider failures are 500s.
pub async fn search_tracks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResult>, (StatusCode, Json<ErrorResponse>)> {
    tracing::debug!("GET /v1/search: query={}", params.query);
    let path = "/v1/search";

    let query = params.query.trim();
    if query.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request("query must not be empty", path)),
        ));
    }

    match state.source_manager.search(query).await {
        Ok(result) => Ok(Json(result)),
        Err(LookupError::Unsupported(_)) => Ok(Json(SearchResult {
            source: None,
            candidates: Vec::new(),
        })),
        Err(e) => {
            tracing::warn!("Track lookup failed for '{}': {}", query, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal(e.to_string(), path)),
            ))
        }
    }
}
