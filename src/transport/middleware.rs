use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::server::AppState;

/// Checks the `Authorization` header against `server.password`; open when no password is set.
pub fn authorized(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(password) = state.config.server.password.as_deref() else {
        return Ok(());
    };

    match headers.get("authorization").and_then(|h| h.to_str().ok()) {
        Some(auth) if auth == password => Ok(()),
        Some(_) => {
            warn!("Authorization failed: Invalid password provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("Authorization failed: Missing Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn check_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    authorized(&state, req.headers())?;
    Ok(next.run(req).await)
}

pub async fn add_response_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Listenroom-Api-Version", HeaderValue::from_static("1"));
    response
}
