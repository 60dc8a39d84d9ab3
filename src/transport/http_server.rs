use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes,
        websocket_server::websocket_handler,
    },
};

const API_V1: &str = "/v1";

/// REST routes, guarded by the optional password.
pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/info", get(routes::get_info))
        .route("/stats", get(routes::get_stats))
        .route("/rooms", get(routes::list_rooms))
        .route("/rooms/{room_id}", get(routes::get_room))
        .route("/search", get(routes::search_tracks));

    Router::new()
        .nest(API_V1, v1_routes)
        .route("/version", get(routes::get_version))
        .layer(middleware::from_fn_with_state(state.clone(), check_auth))
        .layer(middleware::from_fn(add_response_headers))
        .with_state(state)
}

/// The full application: WebSocket endpoint plus REST.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/websocket", get(websocket_handler))
        .with_state(state.clone())
        .merge(router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
